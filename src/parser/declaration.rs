//! Declarations: constants, types, variables, formal parameters and
//! procedure bodies. Declarations also allocate storage: fields and
//! variables get their offsets here, and record type declarations build
//! their run-time descriptors.

use crate::base::{Class, Form, Object, Type, TypId};
use crate::generator::{Loc, WORD_SIZE};
use crate::scanner::{rank, Token};

use super::{Parser, PtrBase};

impl Parser<'_> {
    /// `ident {"," ident} ":"`, all entered with the given class. Returns
    /// the first of the new objects.
    fn ident_list(&mut self, class: Class) -> Option<crate::base::ObjId> {
        if !matches!(self.sym, Token::Ident(_)) {
            return None;
        }
        let name = self.ident_name();
        let first = self.base.new_obj(&name, class);
        self.next();
        let expo = self.check_export();
        self.base.obj_mut(first).expo = expo;
        while self.sym == Token::Comma {
            self.next();
            if matches!(self.sym, Token::Ident(_)) {
                let name = self.ident_name();
                let obj = self.base.new_obj(&name, class);
                self.next();
                let expo = self.check_export();
                self.base.obj_mut(obj).expo = expo;
            } else {
                self.mark("ident?");
            }
        }
        if self.sym == Token::Colon {
            self.next();
        } else {
            self.mark(":?");
        }
        Some(first)
    }

    fn array_type(&mut self) -> TypId {
        let mut x = self.new_item();
        self.expression(&mut x);
        let mut length = 1;
        match x.loc {
            Loc::Const { val } if self.base.typ(x.typ).form == Form::Int && val >= 0 => {
                length = val;
            }
            _ => self.mark("not a valid length"),
        }
        let base;
        if self.sym == Token::Of {
            self.next();
            base = self.parse_type();
            if self.base.typ(base).form == Form::Array && self.base.typ(base).len < 0 {
                self.mark("dyn array not allowed");
            }
        } else if self.sym == Token::Comma {
            // ARRAY n, m OF t
            self.next();
            base = self.array_type();
        } else {
            self.mark("missing OF");
            base = self.base.int_typ;
        }
        let size = (length.wrapping_mul(self.base.typ(base).size) + 3) / 4 * 4;
        self.base.alloc_typ(Type {
            form: Form::Array,
            base: Some(base),
            len: length,
            size,
            ..Type::default()
        })
    }

    fn record_type(&mut self) -> TypId {
        let t = self.base.alloc_typ(Type {
            form: Form::NoTyp,
            mno: -self.level,
            ..Type::default()
        });
        let mut offset = 0;
        let mut bot = None;
        if self.sym == Token::Lparen {
            // record extension
            self.next();
            if self.level != 0 {
                self.mark("extension of local types not implemented");
            }
            if matches!(self.sym, Token::Ident(_)) {
                let base_obj = self.qual_ident();
                if self.base.obj(base_obj).class == Class::Typ {
                    let base_t = if self.base.typ(self.base.obj(base_obj).typ).form
                        == Form::Record
                    {
                        self.base.obj(base_obj).typ
                    } else {
                        self.mark("invalid extension");
                        self.base.int_typ
                    };
                    let ext = self.base.typ(base_t).nof_par + 1;
                    bot = self.base.typ(base_t).dsc;
                    offset = self.base.typ(base_t).size;
                    let tm = self.base.typ_mut(t);
                    tm.base = Some(base_t);
                    tm.nof_par = ext; // extension level
                } else {
                    self.mark("type expected");
                }
            } else {
                self.mark("ident expected");
            }
            self.check_sym(Token::Rparen, "no )");
        }
        while matches!(self.sym, Token::Ident(_)) {
            // field list
            let mut n = 0;
            let mut obj = bot;
            while matches!(self.sym, Token::Ident(_)) {
                let name = self.ident_name();
                let mut o0 = obj;
                while let Some(o) = o0 {
                    if self.base.obj(o).name == name {
                        break;
                    }
                    o0 = self.base.obj(o).next;
                }
                if o0.is_some() {
                    self.mark("mult def");
                }
                let mut f = Object::new(&name, Class::Fld, self.base.no_typ);
                f.next = obj;
                let fid = self.base.alloc_obj(f);
                obj = Some(fid);
                n += 1;
                self.next();
                let expo = self.check_export();
                self.base.obj_mut(fid).expo = expo;
                if self.sym != Token::Comma && self.sym != Token::Colon {
                    self.mark("comma expected");
                } else if self.sym == Token::Comma {
                    self.next();
                }
            }
            self.check_sym(Token::Colon, "colon expected");
            let tp = self.parse_type();
            if self.base.typ(tp).form == Form::Array && self.base.typ(tp).len < 0 {
                self.mark("dyn array not allowed");
            }
            let size = self.base.typ(tp).size;
            if size > 1 {
                offset = (offset + 3) / 4 * 4;
            }
            offset += n * size;
            let mut off = offset;
            let mut o0 = obj;
            while o0 != bot {
                let Some(o) = o0 else { break };
                off -= size;
                let oo = self.base.obj_mut(o);
                oo.typ = tp;
                oo.lev = 0;
                oo.val = off;
                o0 = self.base.obj(o).next;
            }
            bot = obj;
            if self.sym == Token::Semicolon {
                self.next();
            } else if self.sym != Token::End {
                self.mark(" ; or END");
            }
        }
        let tm = self.base.typ_mut(t);
        tm.form = Form::Record;
        tm.dsc = bot;
        tm.size = (offset + 3) / 4 * 4;
        t
    }

    fn fp_section(&mut self, adr: &mut i32, nof_par: &mut i32) {
        let mut cl = if self.sym == Token::Var {
            self.next();
            Class::Par
        } else {
            Class::Var
        };
        let first = self.ident_list(cl);
        let tp = self.formal_type(0);
        let mut rdo = false;
        if cl == Class::Var && self.base.typ(tp).form >= Form::Array {
            // structured value parameters are passed by reference
            cl = Class::Par;
            rdo = true;
        }
        let par_size = if (self.base.typ(tp).form == Form::Array && self.base.typ(tp).len < 0)
            || self.base.typ(tp).form == Form::Record
        {
            // second word for the length or the type tag
            2 * WORD_SIZE
        } else {
            WORD_SIZE
        };
        let mut obj = first;
        while let Some(o) = obj {
            *nof_par += 1;
            let lev = self.level;
            let oo = self.base.obj_mut(o);
            oo.class = cl;
            oo.typ = tp;
            oo.rdo = rdo;
            oo.lev = lev;
            oo.val = *adr;
            *adr += par_size;
            obj = self.base.obj(o).next;
        }
        if *adr >= 52 {
            self.mark("too many parameters");
        }
    }

    fn procedure_type(&mut self, p_type: TypId, par_blk_size: &mut i32) {
        {
            let no = self.base.no_typ;
            let tm = self.base.typ_mut(p_type);
            tm.base = Some(no);
            tm.dsc = None;
        }
        let mut size = *par_blk_size;
        let mut nof_par = 0;
        if self.sym == Token::Lparen {
            self.next();
            if self.sym == Token::Rparen {
                self.next();
            } else {
                self.fp_section(&mut size, &mut nof_par);
                while self.sym == Token::Semicolon {
                    self.next();
                    self.fp_section(&mut size, &mut nof_par);
                }
                self.check_sym(Token::Rparen, "no )");
            }
            if self.sym == Token::Colon {
                // function result
                self.next();
                if matches!(self.sym, Token::Ident(_)) {
                    let obj = self.qual_ident();
                    let rt = self.base.obj(obj).typ;
                    self.base.typ_mut(p_type).base = Some(rt);
                    let rf = self.base.typ(rt).form;
                    let ok = self.base.obj(obj).class == Class::Typ
                        && ((rf >= Form::Byte && rf <= Form::Pointer) || rf == Form::Proc);
                    if !ok {
                        self.mark("illegal function type");
                    }
                } else {
                    self.mark("type identifier expected");
                }
            }
        }
        self.base.typ_mut(p_type).nof_par = nof_par;
        *par_blk_size = size;
    }

    fn formal_type(&mut self, dim: i32) -> TypId {
        if matches!(self.sym, Token::Ident(_)) {
            let obj = self.qual_ident();
            if self.base.obj(obj).class == Class::Typ {
                self.base.obj(obj).typ
            } else {
                self.mark("not a type");
                self.base.int_typ
            }
        } else if self.sym == Token::Array {
            self.next();
            self.check_sym(Token::Of, "OF ?");
            if dim >= 1 {
                self.mark("multi-dimensional open arrays not implemented");
            }
            let base = self.formal_type(dim + 1);
            self.base.alloc_typ(Type {
                form: Form::Array,
                len: -1,
                size: 2 * WORD_SIZE,
                base: Some(base),
                ..Type::default()
            })
        } else if self.sym == Token::Procedure {
            self.next();
            self.base.open_scope();
            let t = self.base.alloc_typ(Type {
                form: Form::Proc,
                size: WORD_SIZE,
                ..Type::default()
            });
            let mut dmy = 0;
            self.procedure_type(t, &mut dmy);
            let dsc = self.base.obj(self.base.top_scope()).next;
            self.base.typ_mut(t).dsc = dsc;
            self.base.close_scope();
            t
        } else {
            self.mark("identifier expected");
            self.base.no_typ
        }
    }

    fn check_rec_level(&mut self, lev: i32) {
        if lev != 0 {
            self.mark("ptr base must be global");
        }
    }

    fn parse_type(&mut self) -> TypId {
        let mut typ = self.base.int_typ; // sync
        if !matches!(self.sym, Token::Ident(_)) && self.sym.rank() < rank::ARRAY {
            self.mark("not a type");
            loop {
                self.next();
                if matches!(self.sym, Token::Ident(_)) || self.sym.rank() >= rank::ARRAY {
                    break;
                }
            }
        }
        if matches!(self.sym, Token::Ident(_)) {
            let obj = self.qual_ident();
            if self.base.obj(obj).class == Class::Typ {
                let t = self.base.obj(obj).typ;
                if self.base.typ(t).form != Form::NoTyp {
                    typ = t;
                }
            } else {
                self.mark("not a type or undefined");
            }
        } else if self.sym == Token::Array {
            self.next();
            typ = self.array_type();
        } else if self.sym == Token::Record {
            self.next();
            typ = self.record_type();
            self.check_sym(Token::End, "no END");
        } else if self.sym == Token::Pointer {
            self.next();
            self.check_sym(Token::To, "no TO");
            let it = self.base.int_typ;
            typ = self.base.alloc_typ(Type {
                form: Form::Pointer,
                size: WORD_SIZE,
                base: Some(it),
                ..Type::default()
            });
            if matches!(self.sym, Token::Ident(_)) {
                let name = self.ident_name();
                match self.base.this_obj(&name) {
                    Some(obj) => {
                        let cls = self.base.obj(obj).class;
                        let ot = self.base.obj(obj).typ;
                        if cls == Class::Typ
                            && matches!(self.base.typ(ot).form, Form::Record | Form::NoTyp)
                        {
                            let lev = self.base.obj(obj).lev;
                            self.check_rec_level(lev);
                            self.base.typ_mut(typ).base = Some(ot);
                        } else if cls == Class::Mod {
                            self.mark("external base type not implemented");
                        } else {
                            self.mark("no valid base type");
                        }
                    }
                    None => {
                        let lev = self.level;
                        self.check_rec_level(lev);
                        // forward reference, fixed up at the end of the
                        // declarations
                        self.pbs_list.push(PtrBase { name, typ });
                    }
                }
                self.next();
            } else {
                let bt = self.parse_type();
                self.base.typ_mut(typ).base = Some(bt);
                if self.base.typ(bt).form != Form::Record
                    || self.base.typ(bt).typ_obj.is_none()
                {
                    self.mark("must point to named record");
                }
                let lev = self.level;
                self.check_rec_level(lev);
            }
        } else if self.sym == Token::Procedure {
            self.next();
            self.base.open_scope();
            let t = self.base.alloc_typ(Type {
                form: Form::Proc,
                size: WORD_SIZE,
                ..Type::default()
            });
            let mut dmy = 0;
            self.procedure_type(t, &mut dmy);
            let dsc = self.base.obj(self.base.top_scope()).next;
            self.base.typ_mut(t).dsc = dsc;
            self.base.close_scope();
            typ = t;
        } else {
            self.mark("illegal type");
        }
        typ
    }

    /// CONST, TYPE, VAR sections, in that order. Violations of the order
    /// are reported but parsing proceeds.
    pub(super) fn declarations(&mut self, var_size: &mut i32) {
        self.pbs_list.clear();
        if self.sym.rank() < rank::CONST && self.sym != Token::End && self.sym != Token::Return {
            self.mark("declaration?");
            loop {
                self.next();
                if self.sym.rank() >= rank::CONST
                    || self.sym == Token::End
                    || self.sym == Token::Return
                {
                    break;
                }
            }
        }
        if self.sym == Token::Const {
            self.next();
            while matches!(self.sym, Token::Ident(_)) {
                let id = self.ident_name();
                self.next();
                let expo = self.check_export();
                if self.sym == Token::Eql {
                    self.next();
                } else {
                    self.mark("= ?");
                }
                let mut x = self.new_item();
                self.expression(&mut x);
                if matches!(x.loc, Loc::Str { len: 2, .. }) {
                    self.gen.str_to_char(&mut x);
                }
                let obj = self.base.new_obj(&id, Class::Const);
                self.base.obj_mut(obj).expo = expo;
                match x.loc {
                    Loc::Const { val } => {
                        let o = self.base.obj_mut(obj);
                        o.val = val;
                        o.lev = 0;
                        o.typ = x.typ;
                    }
                    Loc::Str { pool, len } => {
                        // the level field doubles as the length
                        let o = self.base.obj_mut(obj);
                        o.val = pool;
                        o.lev = len;
                        o.typ = x.typ;
                    }
                    Loc::Proc { entry, lev } => {
                        let o = self.base.obj_mut(obj);
                        o.val = entry;
                        o.lev = lev;
                        o.typ = x.typ;
                    }
                    _ => {
                        self.mark("expression not constant");
                        self.base.obj_mut(obj).typ = self.base.int_typ;
                    }
                }
                self.check_sym(Token::Semicolon, "; missing");
            }
        }
        if self.sym == Token::Type {
            self.next();
            while matches!(self.sym, Token::Ident(_)) {
                let id = self.ident_name();
                self.next();
                let expo = self.check_export();
                if self.sym == Token::Eql {
                    self.next();
                } else {
                    self.mark("=?");
                }
                let tp = self.parse_type();
                let obj = self.base.new_obj(&id, Class::Typ);
                {
                    let lev = self.level;
                    let o = self.base.obj_mut(obj);
                    o.typ = tp;
                    o.expo = expo;
                    o.lev = lev;
                }
                if self.base.typ(tp).typ_obj.is_none() {
                    self.base.typ_mut(tp).typ_obj = Some(obj);
                }
                if expo && self.base.typ(tp).form == Form::Record {
                    self.base.obj_mut(obj).exno = self.exno as u8;
                    self.exno += 1;
                } else {
                    self.base.obj_mut(obj).exno = 0;
                }
                if self.base.typ(tp).form == Form::Record {
                    // patch pointer types waiting for this record
                    for i in 0..self.pbs_list.len() {
                        if self.pbs_list[i].name == id {
                            let pt = self.pbs_list[i].typ;
                            self.base.typ_mut(pt).base = Some(tp);
                        }
                    }
                    if self.level == 0 {
                        self.gen.build_td(&mut self.base, tp, var_size);
                    }
                }
                self.check_sym(Token::Semicolon, "; missing");
            }
        }
        if self.sym == Token::Var {
            self.next();
            while matches!(self.sym, Token::Ident(_)) {
                let first = self.ident_list(Class::Var);
                let tp = self.parse_type();
                let mut obj = first;
                while let Some(o) = obj {
                    let size = self.base.typ(tp).size;
                    let lev = self.level;
                    {
                        let oo = self.base.obj_mut(o);
                        oo.typ = tp;
                        oo.lev = lev;
                    }
                    if size > 1 {
                        *var_size = (*var_size + 3) / 4 * 4;
                    }
                    self.base.obj_mut(o).val = *var_size;
                    *var_size += size;
                    if self.base.obj(o).expo {
                        self.base.obj_mut(o).exno = self.exno as u8;
                        self.exno += 1;
                    }
                    obj = self.base.obj(o).next;
                }
                self.check_sym(Token::Semicolon, "; missing");
            }
        }
        *var_size = (*var_size + 3) / 4 * 4;
        for pb in &self.pbs_list {
            let unresolved = self
                .base
                .typ(pb.typ)
                .base
                .map(|b| self.base.typ(b).form == Form::Int)
                .unwrap_or(false);
            if unresolved {
                self.mark("undefined pointer base");
            }
        }
        if self.sym.rank() > rank::CONST && self.sym.rank() <= rank::VAR {
            self.mark("declaration in bad order");
        }
    }

    pub(super) fn procedure_decl(&mut self) {
        self.next();
        let mut interrupt = false;
        if self.sym == Token::Times {
            self.next();
            interrupt = true;
        }
        if matches!(self.sym, Token::Ident(_)) {
            let proc_id = self.ident_name();
            self.next();
            let proc = self.base.new_obj(&proc_id, Class::Const);
            let mut par_blk_size = if interrupt { 12 } else { 4 };
            let typ = self.base.alloc_typ(Type {
                form: Form::Proc,
                size: WORD_SIZE,
                ..Type::default()
            });
            {
                let lev = self.level;
                let o = self.base.obj_mut(proc);
                o.typ = typ;
                o.val = -1;
                o.lev = lev;
            }
            let expo = self.check_export();
            self.base.obj_mut(proc).expo = expo;
            if expo {
                self.base.obj_mut(proc).exno = self.exno as u8;
                self.exno += 1;
            }
            self.base.open_scope();
            self.level += 1;
            {
                let no = self.base.no_typ;
                self.base.typ_mut(typ).base = Some(no);
            }
            self.procedure_type(typ, &mut par_blk_size); // formal parameter list
            self.check_sym(Token::Semicolon, "no ;");
            let mut loc_blk_size = par_blk_size;
            self.declarations(&mut loc_blk_size);
            self.base.obj_mut(proc).val = self.gen.here() * 4;
            {
                let dsc = self.base.obj(self.base.top_scope()).next;
                self.base.typ_mut(typ).dsc = dsc;
            }
            if self.sym == Token::Procedure {
                // nested procedures are emitted first; jump over them
                let mut l = 0;
                self.gen.fjump(&mut l);
                loop {
                    self.procedure_decl();
                    self.check_sym(Token::Semicolon, "no ;");
                    if self.sym != Token::Procedure {
                        break;
                    }
                }
                self.gen.fix_one(l);
                self.base.obj_mut(proc).val = self.gen.here() * 4;
                let dsc = self.base.obj(self.base.top_scope()).next;
                self.base.typ_mut(typ).dsc = dsc;
            }
            self.gen.enter_proc(par_blk_size, loc_blk_size, interrupt);
            if self.sym == Token::Begin {
                self.next();
                self.stat_sequence();
            }
            let mut x = self.new_item();
            if self.sym == Token::Return {
                self.next();
                self.expression(&mut x);
                let rt = self.base.typ(typ).base.unwrap_or(self.base.no_typ);
                if rt == self.base.no_typ {
                    self.mark("this is not a function");
                } else if !self.comp_types(rt, x.typ, false) {
                    self.mark("wrong result type");
                }
            } else {
                let rt = self.base.typ(typ).base.unwrap_or(self.base.no_typ);
                if self.base.typ(rt).form != Form::NoTyp {
                    self.mark("function without result");
                    let no = self.base.no_typ;
                    self.base.typ_mut(typ).base = Some(no);
                }
            }
            let rf = {
                let rt = self.base.typ(typ).base.unwrap_or(self.base.no_typ);
                self.base.typ(rt).form
            };
            self.gen
                .return_proc(rf, &mut x, loc_blk_size, interrupt, &self.base);
            self.base.close_scope();
            self.level -= 1;
            self.check_sym(Token::End, "no END");
            if matches!(self.sym, Token::Ident(_)) {
                if self.ident_name() != proc_id {
                    self.mark("no match");
                }
                self.next();
            } else {
                self.mark("no proc id");
            }
        } else {
            self.mark("proc id expected");
        }
    }
}
