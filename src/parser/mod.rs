//! Recursive-descent parser.
//!
//! The parser owns the scanner, the symbol table and the code generator and
//! drives all three: it pulls symbols, enforces the type rules, allocates
//! storage and calls the generator operation by operation. There is no
//! syntax tree; the only intermediate representation is the
//! [`Item`](crate::generator::Item) describing the operand under
//! translation. Expressions, statements and declarations live in the
//! submodules.

use std::path::PathBuf;
use std::rc::Rc;

use log::info;

use crate::base::{Base, Class, Form, ObjId, Object, TypId};
use crate::error::HostError;
use crate::generator::{Generator, Item, Loc};
use crate::scanner::{Diag, DiagRef, Note, Scanner, Token};

mod declaration;
mod expression;
mod statement;

#[cfg(test)]
pub mod test;

/// Compilation options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Allow overwriting a symbol file whose key changed.
    pub new_sym_file: bool,
    /// Directory holding the symbol files of imports; output files are
    /// written here too.
    pub dir: PathBuf,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            new_sym_file: false,
            dir: PathBuf::from("."),
        }
    }
}

/// Result of one module compilation. Output files are only written when
/// `err_cnt` is zero.
#[derive(Debug)]
pub struct Outcome {
    pub err_cnt: u32,
    pub notes: Vec<Note>,
    pub pc: i32,
    pub dc: i32,
    pub key: i32,
    pub sym_file_written: bool,
}

/// A pointer type whose base record was not yet declared.
struct PtrBase {
    name: String,
    typ: TypId,
}

pub struct Parser<'s> {
    scan: Scanner<'s>,
    base: Base,
    gen: Generator,
    diag: DiagRef,

    sym: Token,
    dc: i32, // data counter
    level: i32,
    exno: i32,
    version: i32,
    new_sf: bool,
    mod_id: String,
    pbs_list: Vec<PtrBase>,
    dummy: ObjId,
    dir: PathBuf,
    key: i32,
}

/// Compiles one module from in-memory source. Compile errors are recorded
/// in the outcome; only host failures (I/O and the like) surface as `Err`.
pub fn compile(src: &str, opts: &Options) -> Result<Outcome, HostError> {
    let diag = Diag::new();
    let scan = Scanner::new(src, Rc::clone(&diag));
    let mut base = Base::new(Rc::clone(&diag), opts.dir.clone());
    let gen = Generator::new(Rc::clone(&diag), &base);
    let int_typ = base.int_typ;
    let dummy = base.alloc_obj(Object::new("", Class::Var, int_typ));
    let mut p = Parser {
        scan,
        base,
        gen,
        diag: Rc::clone(&diag),
        sym: Token::Eot,
        dc: 0,
        level: 0,
        exno: 1,
        version: 1,
        new_sf: opts.new_sym_file,
        mod_id: String::new(),
        pbs_list: Vec::new(),
        dummy,
        dir: opts.dir.clone(),
        key: 0,
    };
    let sym_file_written = p.module()?;
    let d = diag.borrow();
    Ok(Outcome {
        err_cnt: d.err_cnt(),
        notes: d.notes().to_vec(),
        pc: p.gen.pc,
        dc: p.dc,
        key: p.key,
        sym_file_written,
    })
}

impl<'s> Parser<'s> {
    fn next(&mut self) {
        self.sym = self.scan.get();
    }

    fn mark(&self, msg: &str) {
        self.scan.mark(msg);
    }

    fn check_sym(&mut self, s: Token, msg: &str) {
        if self.sym == s {
            self.next();
        } else {
            self.mark(msg);
        }
    }

    fn new_item(&self) -> Item {
        Item::new(self.base.no_typ)
    }

    fn ident_name(&self) -> String {
        match &self.sym {
            Token::Ident(s) => s.clone(),
            _ => String::new(),
        }
    }

    /// `ident` or `Module.ident`. Undefined names yield the dummy object so
    /// parsing can continue.
    fn qual_ident(&mut self) -> ObjId {
        let name = self.ident_name();
        let found = self.base.this_obj(&name);
        self.next();
        let mut obj = match found {
            Some(o) => o,
            None => {
                self.mark("undef");
                self.dummy
            }
        };
        if self.sym == Token::Period && self.base.obj(obj).class == Class::Mod {
            self.next();
            if matches!(self.sym, Token::Ident(_)) {
                let id = self.ident_name();
                let found = self.base.this_import(obj, &id);
                self.next();
                obj = match found {
                    Some(o) => o,
                    None => {
                        self.mark("undef");
                        self.dummy
                    }
                };
            } else {
                self.mark("identifier expected");
                obj = self.dummy;
            }
        }
        obj
    }

    // type-rule helpers

    fn check_bool(&mut self, x: &mut Item) {
        if self.base.typ(x.typ).form != Form::Bool {
            self.mark("not Boolean");
            x.typ = self.base.bool_typ;
        }
    }

    fn check_int(&mut self, x: &mut Item) {
        if self.base.typ(x.typ).form != Form::Int {
            self.mark("not integer");
            x.typ = self.base.int_typ;
        }
    }

    fn check_real(&mut self, x: &mut Item) {
        if self.base.typ(x.typ).form != Form::Real {
            self.mark("not Real");
            x.typ = self.base.real_typ;
        }
    }

    fn check_set(&mut self, x: &mut Item) {
        if self.base.typ(x.typ).form != Form::Set {
            self.mark("not Set");
            x.typ = self.base.set_typ;
        }
    }

    fn check_set_val(&mut self, x: &mut Item) {
        if self.base.typ(x.typ).form != Form::Int {
            self.mark("not Int");
            x.typ = self.base.set_typ;
        } else if let Loc::Const { val } = x.loc {
            if !(0..32).contains(&val) {
                self.mark("invalid set");
            }
        }
    }

    fn check_const(&mut self, x: &mut Item) {
        if !matches!(x.loc, Loc::Const { .. } | Loc::Proc { .. } | Loc::Str { .. }) {
            self.mark("not a constant");
            x.loc = Loc::Const { val: 0 };
        }
    }

    fn check_read_only(&mut self, x: &Item) {
        if x.rdo {
            self.mark("read-only");
        }
    }

    fn check_export(&mut self) -> bool {
        if self.sym == Token::Times {
            self.next();
            if self.level != 0 {
                self.mark("remove asterisk");
            }
            true
        } else {
            false
        }
    }

    /// `t1` is `t0` itself or one of its extensions.
    fn is_extension(&self, t0: TypId, t1: TypId) -> bool {
        t0 == t1
            || match self.base.typ(t1).base {
                Some(b) => self.is_extension(t0, b),
                None => false,
            }
    }

    fn ptr_base_extension(&self, t0: TypId, t1: TypId) -> bool {
        match (self.base.typ(t0).base, self.base.typ(t1).base) {
            (Some(b0), Some(b1)) => self.is_extension(b0, b1),
            _ => false,
        }
    }

    fn char_array(&self, t: TypId) -> bool {
        let tt = self.base.typ(t);
        tt.form == Form::Array
            && tt
                .base
                .map(|b| self.base.typ(b).form == Form::Char)
                .unwrap_or(false)
    }

    /// Positional equality of procedure signatures: identical result,
    /// parameter count, and per-parameter class, read-only flag and type.
    fn equal_signatures(&self, t0: TypId, t1: TypId) -> bool {
        {
            let a = self.base.typ(t0);
            let b = self.base.typ(t1);
            if a.base != b.base || a.nof_par != b.nof_par {
                return false;
            }
        }
        let mut p0 = self.base.typ(t0).dsc;
        let mut p1 = self.base.typ(t1).dsc;
        while let (Some(o0), Some(o1)) = (p0, p1) {
            let x = self.base.obj(o0);
            let y = self.base.obj(o1);
            let tx = self.base.typ(x.typ);
            let ty = self.base.typ(y.typ);
            let same_type = x.typ == y.typ
                || (tx.form == Form::Array
                    && ty.form == Form::Array
                    && tx.len == ty.len
                    && tx.base == ty.base)
                || (tx.form == Form::Proc
                    && ty.form == Form::Proc
                    && self.equal_signatures(x.typ, y.typ));
            if x.class == y.class && x.rdo == y.rdo && same_type {
                p0 = x.next;
                p1 = y.next;
            } else {
                return false;
            }
        }
        p0.is_none()
    }

    /// Assignment compatibility of `t1` to a designator of type `t0`.
    fn comp_types(&self, t0: TypId, t1: TypId, var_par: bool) -> bool {
        if t0 == t1 {
            return true;
        }
        let f0 = self.base.typ(t0).form;
        let f1 = self.base.typ(t1).form;
        (f0 == Form::Array
            && f1 == Form::Array
            && self.base.typ(t0).base == self.base.typ(t1).base
            && self.base.typ(t0).len == self.base.typ(t1).len)
            || (f0 == Form::Record && f1 == Form::Record && self.is_extension(t0, t1))
            || (!var_par
                && ((f0 == Form::Pointer
                    && f1 == Form::Pointer
                    && self.ptr_base_extension(t0, t1))
                    || (f0 == Form::Proc && f1 == Form::Proc && self.equal_signatures(t0, t1))
                    || ((f0 == Form::Pointer || f0 == Form::Proc) && f1 == Form::NilTyp)))
    }

    // module structure

    fn import_mod(&mut self) -> Result<(), HostError> {
        if matches!(self.sym, Token::Ident(_)) {
            let imp_id = self.ident_name();
            self.next();
            let imp_id1 = if self.sym == Token::Becomes {
                self.next();
                if matches!(self.sym, Token::Ident(_)) {
                    let id = self.ident_name();
                    self.next();
                    id
                } else {
                    self.mark("id expected");
                    imp_id.clone()
                }
            } else {
                imp_id.clone()
            };
            self.base.import(&imp_id, &imp_id1)?;
        } else {
            self.mark("id expected");
        }
        Ok(())
    }

    /// Parses one complete module and, on a clean compile, writes the
    /// symbol and object files. Returns whether a symbol file was written.
    fn module(&mut self) -> Result<bool, HostError> {
        let mut sym_file_written = false;
        self.next();
        if self.sym == Token::Module {
            self.next();
            if self.sym == Token::Times {
                // RISC-0 target: fixed data origin, no symbol file
                self.version = 0;
                self.dc = 8;
                self.next();
            } else {
                self.dc = 0;
                self.version = 1;
            }
            self.base.open_scope();
            if matches!(self.sym, Token::Ident(_)) {
                self.mod_id = self.ident_name();
                self.next();
                info!("compiling {}", self.mod_id);
            } else {
                self.mark("identifier expected");
            }
            self.check_sym(Token::Semicolon, "no ;");
            self.level = 0;
            self.exno = 1;
            if self.sym == Token::Import {
                self.next();
                self.import_mod()?;
                while self.sym == Token::Comma {
                    self.next();
                    self.import_mod()?;
                }
                self.check_sym(Token::Semicolon, "; missing");
            }
            self.gen.open(self.version);
            let mut dc = self.dc;
            self.declarations(&mut dc);
            self.dc = dc;
            self.gen.set_data_size((self.dc + 3) / 4 * 4);
            while self.sym == Token::Procedure {
                self.procedure_decl();
                self.check_sym(Token::Semicolon, "no ;");
            }
            self.gen.header();
            if self.sym == Token::Begin {
                self.next();
                self.stat_sequence();
            }
            self.check_sym(Token::End, "no END");
            if matches!(self.sym, Token::Ident(_)) {
                if self.ident_name() != self.mod_id {
                    self.mark("no match");
                }
                self.next();
            } else {
                self.mark("identifier missing");
            }
            if self.sym != Token::Period {
                self.mark("period missing");
            }
            let mut key = 0;
            if self.diag.borrow().err_cnt() == 0 && self.version != 0 {
                let (k, wrote) = self.base.export(&self.mod_id, self.new_sf)?;
                key = k;
                sym_file_written = wrote;
                if wrote {
                    info!("new symbol file");
                }
            }
            if self.diag.borrow().err_cnt() == 0 {
                self.gen
                    .close(&self.base, &self.mod_id, key, self.exno, &self.dir)?;
                info!("{} {} {:X}", self.gen.pc, self.dc, key as u32);
            } else {
                info!("compilation FAILED");
            }
            self.key = key;
            self.base.close_scope();
            self.pbs_list.clear();
        } else {
            self.mark("must start with MODULE");
        }
        Ok(sym_file_written)
    }
}
