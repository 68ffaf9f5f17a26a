//! Expressions: designators, factors, terms, relations, set constructors,
//! the standard functions, and parameter passing.

use crate::base::{Class, Form, ObjId};
use crate::generator::{Item, Loc};
use crate::scanner::{rank, Token};

use super::Parser;

impl Parser<'_> {
    /// `x IS t` / type guard `x(t)`. Checks the static admissibility and
    /// hands the dynamic part to the generator.
    pub(super) fn type_test(&mut self, x: &mut Item, t: crate::base::TypId, guard: bool) {
        let tf = self.base.typ(t).form;
        let xf = self.base.typ(x.typ).form;
        if tf == xf
            && (tf == Form::Pointer
                || (tf == Form::Record && matches!(x.loc, Loc::Par { .. })))
        {
            // is t the static type or an ancestor of it?
            let mut cur = Some(x.typ);
            while let Some(c) = cur {
                if c == t {
                    break;
                }
                cur = self.base.typ(c).base;
            }
            if cur.is_none() {
                if xf == Form::Pointer {
                    if self.ptr_base_extension(x.typ, t) {
                        let tb = self.base.typ(t).base;
                        self.gen.type_test(x, tb, &self.base, false, guard);
                        x.typ = t;
                    } else {
                        self.mark("not an extension");
                    }
                } else if xf == Form::Record && matches!(x.loc, Loc::Par { .. }) {
                    if self.is_extension(x.typ, t) {
                        self.gen.type_test(x, Some(t), &self.base, true, guard);
                        x.typ = t;
                    } else {
                        self.mark("not an extension");
                    }
                } else {
                    self.mark("incompatible types");
                }
            } else if !guard {
                self.gen.type_test(x, None, &self.base, false, false);
            }
        } else {
            self.mark("type mismatch");
        }
        if !guard {
            x.typ = self.base.bool_typ;
        }
    }

    pub(super) fn selector(&mut self, x: &mut Item) {
        loop {
            let guard_paren = self.sym == Token::Lparen
                && matches!(self.base.typ(x.typ).form, Form::Record | Form::Pointer);
            if !(self.sym == Token::Lbrak
                || self.sym == Token::Period
                || self.sym == Token::Arrow
                || guard_paren)
            {
                break;
            }
            if self.sym == Token::Lbrak {
                loop {
                    self.next();
                    let mut y = self.new_item();
                    self.expression(&mut y);
                    if self.base.typ(x.typ).form == Form::Array {
                        self.check_int(&mut y);
                        self.gen.index(x, &mut y, &self.base);
                        x.typ = self.base.typ(x.typ).base.unwrap_or(self.base.int_typ);
                    } else {
                        self.mark("not an array");
                    }
                    if self.sym != Token::Comma {
                        break;
                    }
                }
                self.check_sym(Token::Rbrak, "no ]");
            } else if self.sym == Token::Period {
                self.next();
                if matches!(self.sym, Token::Ident(_)) {
                    if self.base.typ(x.typ).form == Form::Pointer {
                        self.gen.deref(x);
                        x.typ = self.base.typ(x.typ).base.unwrap_or(self.base.int_typ);
                    }
                    if self.base.typ(x.typ).form == Form::Record {
                        let name = self.ident_name();
                        let fld = self.base.this_field(x.typ, &name);
                        self.next();
                        match fld {
                            Some(f) => {
                                let off = self.base.obj(f).val;
                                self.gen.field(x, off);
                                x.typ = self.base.obj(f).typ;
                            }
                            None => self.mark("undef"),
                        }
                    } else {
                        self.mark("not a record");
                    }
                } else {
                    self.mark("ident?");
                }
            } else if self.sym == Token::Arrow {
                self.next();
                if self.base.typ(x.typ).form == Form::Pointer {
                    self.gen.deref(x);
                    x.typ = self.base.typ(x.typ).base.unwrap_or(self.base.int_typ);
                } else {
                    self.mark("not a pointer");
                }
            } else {
                // type guard
                self.next();
                if matches!(self.sym, Token::Ident(_)) {
                    let obj = self.qual_ident();
                    if self.base.obj(obj).class == Class::Typ {
                        let t = self.base.obj(obj).typ;
                        self.type_test(x, t, true);
                    } else {
                        self.mark("guard type expected");
                    }
                } else {
                    self.mark("not an identifier");
                }
                self.check_sym(Token::Rparen, " ) missing");
            }
        }
    }

    fn parameter(&mut self, par: Option<ObjId>) {
        let mut x = self.new_item();
        self.expression(&mut x);
        let Some(par) = par else { return };
        let var_par = self.base.obj(par).class == Class::Par;
        let p_typ = self.base.obj(par).typ;
        let p_rdo = self.base.obj(par).rdo;
        let pf = self.base.typ(p_typ).form;
        let xf = self.base.typ(x.typ).form;
        if self.comp_types(p_typ, x.typ, var_par) {
            if !var_par {
                self.gen.value_param(&mut x, &self.base);
            } else {
                if !p_rdo {
                    self.check_read_only(&x);
                }
                self.gen.var_param(&mut x, p_typ, &self.base);
            }
        } else if xf == Form::Array
            && pf == Form::Array
            && self.base.typ(x.typ).base == self.base.typ(p_typ).base
            && self.base.typ(p_typ).len < 0
        {
            if !p_rdo {
                self.check_read_only(&x);
            }
            self.gen.open_array_param(&mut x, &self.base);
        } else if xf == Form::String
            && var_par
            && p_rdo
            && self.char_array(p_typ)
            && self.base.typ(p_typ).len < 0
        {
            self.gen.string_param(&mut x);
        } else if !var_par && pf == Form::Int && xf == Form::Int {
            self.gen.value_param(&mut x, &self.base); // BYTE
        } else if xf == Form::String
            && matches!(x.loc, Loc::Str { len: 2, .. })
            && self.base.obj(par).class == Class::Var
            && pf == Form::Char
        {
            self.gen.str_to_char(&mut x);
            self.gen.value_param(&mut x, &self.base);
        } else if pf == Form::Array
            && self.base.typ(p_typ).base == Some(self.base.byte_typ)
            && self.base.typ(p_typ).len >= 0
            && self.base.typ(p_typ).size == self.base.typ(x.typ).size
        {
            self.gen.var_param(&mut x, p_typ, &self.base);
        } else {
            self.mark("incompatible parameters");
        }
    }

    pub(super) fn param_list(&mut self, x: &mut Item) {
        let mut par = self.base.typ(x.typ).dsc;
        let mut n = 0;
        if self.sym != Token::Rparen {
            self.parameter(par);
            n = 1;
            while self.sym.rank() <= rank::COMMA {
                self.check_sym(Token::Comma, "comma?");
                if let Some(p) = par {
                    par = self.base.obj(p).next;
                }
                n += 1;
                self.parameter(par);
            }
            self.check_sym(Token::Rparen, ") missing");
        } else {
            self.next();
        }
        let want = self.base.typ(x.typ).nof_par;
        if n < want {
            self.mark("too few params");
        } else if n > want {
            self.mark("too many params");
        }
    }

    fn stand_func(&mut self, x: &mut Item, fct: i32, res: crate::base::TypId) {
        let mut res = res;
        self.check_sym(Token::Lparen, "no (");
        let n_par = fct % 10;
        let fct = fct / 10;
        self.expression(x);
        let mut y = self.new_item();
        let mut n = 1;
        while self.sym == Token::Comma {
            self.next();
            self.expression(&mut y);
            n += 1;
        }
        self.check_sym(Token::Rparen, "no )");
        if n == n_par {
            match fct {
                0 => {
                    // ABS
                    if matches!(self.base.typ(x.typ).form, Form::Int | Form::Real) {
                        self.gen.abs_op(x, &self.base);
                        res = x.typ;
                    } else {
                        self.mark("bad type");
                    }
                }
                1 => {
                    // ODD
                    self.check_int(x);
                    self.gen.odd(x, &self.base);
                }
                2 => {
                    // FLOOR
                    self.check_real(x);
                    self.gen.floor(x, &self.base);
                }
                3 => {
                    // FLT
                    self.check_int(x);
                    self.gen.flt(x, &self.base);
                }
                4 => {
                    // ORD
                    if self.base.typ(x.typ).form <= Form::Proc {
                        self.gen.ord(x, &self.base);
                    } else if matches!(x.loc, Loc::Str { len: 2, .. }) {
                        self.gen.str_to_char(x);
                    } else {
                        self.mark("bad type");
                    }
                }
                5 => {
                    // CHR; no range check, same as ORD
                    self.check_int(x);
                    self.gen.ord(x, &self.base);
                }
                6 => {
                    // LEN
                    if self.base.typ(x.typ).form == Form::Array {
                        self.gen.len(x, &self.base);
                    } else {
                        self.mark("not an array");
                    }
                }
                7 | 8 | 9 => {
                    // LSL, ASR, ROR
                    self.check_int(&mut y);
                    if matches!(self.base.typ(x.typ).form, Form::Int | Form::Set) {
                        self.gen.shift(fct - 7, x, &mut y, &self.base);
                        res = x.typ;
                    } else {
                        self.mark("bad type");
                    }
                }
                11 => self.gen.adc(x, &mut y, &self.base),
                12 => self.gen.sbc(x, &mut y, &self.base),
                13 => self.gen.uml(x, &mut y, &self.base),
                14 => {
                    // BIT
                    self.check_int(x);
                    self.check_int(&mut y);
                    self.gen.bit(x, &mut y, &self.base);
                }
                15 => {
                    // REG
                    self.check_const(x);
                    self.check_int(x);
                    self.gen.register(x);
                }
                16 => {
                    // VAL
                    if matches!(x.loc, Loc::TypeRef)
                        && self.base.typ(x.typ).size <= self.base.typ(y.typ).size
                    {
                        res = x.typ;
                        *x = y;
                    } else {
                        self.mark("casting not allowed");
                    }
                }
                17 => self.gen.adr_op(x, &self.base),
                18 => {
                    // SIZE
                    if matches!(x.loc, Loc::TypeRef) {
                        let s = self.base.typ(x.typ).size;
                        let it = self.base.int_typ;
                        self.gen.make_const_item(x, it, s);
                    } else {
                        self.mark("must be a type");
                    }
                }
                19 => {
                    // COND
                    self.check_const(x);
                    self.check_int(x);
                    self.gen.condition(x);
                }
                20 => {
                    // H
                    self.check_const(x);
                    self.check_int(x);
                    self.gen.h(x);
                }
                _ => {}
            }
            x.typ = res;
        } else {
            self.mark("wrong nof params");
        }
    }

    fn element(&mut self, x: &mut Item) {
        self.expression(x);
        self.check_set_val(x);
        if self.sym == Token::Upto {
            self.next();
            let mut y = self.new_item();
            self.expression(&mut y);
            self.check_set_val(&mut y);
            self.gen.set_range(x, &mut y, &self.base);
        } else {
            self.gen.singleton(x, &self.base);
        }
        x.typ = self.base.set_typ;
    }

    pub(super) fn set(&mut self, x: &mut Item) {
        if self.sym.rank() >= rank::IF {
            if self.sym != Token::Rbrace {
                self.mark(" } missing");
            }
            let st = self.base.set_typ;
            self.gen.make_const_item(x, st, 0); // empty set
        } else {
            self.element(x);
            while (self.sym.rank() < rank::RPAREN || self.sym.rank() > rank::RBRACE)
                && self.sym != Token::Eot
            {
                if self.sym == Token::Comma {
                    self.next();
                } else if self.sym != Token::Rbrace {
                    self.mark("missing comma");
                }
                let mut y = self.new_item();
                self.element(&mut y);
                self.gen.set_op(&Token::Plus, x, &mut y, &self.base);
            }
        }
    }

    pub(super) fn factor(&mut self, x: &mut Item) {
        if !(rank::CHAR..=rank::IDENT).contains(&self.sym.rank()) {
            self.mark("expression expected");
            loop {
                self.next();
                let r = self.sym.rank();
                if (rank::CHAR..=rank::FOR).contains(&r) || r >= rank::THEN {
                    break;
                }
            }
        }
        match self.sym.clone() {
            Token::Ident(_) => {
                let obj = self.qual_ident();
                if self.base.obj(obj).class == Class::SFunc {
                    let fct = self.base.obj(obj).val;
                    let res = self.base.obj(obj).typ;
                    self.stand_func(x, fct, res);
                } else {
                    self.gen.make_item(x, obj, &self.base, self.level);
                    self.selector(x);
                    if self.sym == Token::Lparen {
                        self.next();
                        let is_func = self.base.typ(x.typ).form == Form::Proc && {
                            let base = self.base.typ(x.typ).base.unwrap_or(self.base.no_typ);
                            self.base.typ(base).form != Form::NoTyp
                        };
                        if is_func {
                            let rx = self.gen.prep_call(x, &self.base);
                            self.param_list(x);
                            self.gen.call(x, rx, &self.base);
                            x.typ = self.base.typ(x.typ).base.unwrap_or(self.base.int_typ);
                        } else {
                            self.mark("not a function");
                            self.param_list(x);
                        }
                    }
                }
            }
            Token::Int(v) => {
                let it = self.base.int_typ;
                self.gen.make_const_item(x, it, v);
                self.next();
            }
            Token::Real(v) => {
                self.gen.make_real_item(x, v);
                self.next();
            }
            Token::Char(c) => {
                let ct = self.base.char_typ;
                self.gen.make_const_item(x, ct, c as i32);
                self.next();
            }
            Token::Nil => {
                self.next();
                let nt = self.base.nil_typ;
                self.gen.make_const_item(x, nt, 0);
            }
            Token::Str(s) => {
                self.gen.make_string_item(x, &s);
                self.next();
            }
            Token::Lparen => {
                self.next();
                self.expression(x);
                self.check_sym(Token::Rparen, "no )");
            }
            Token::Lbrace => {
                self.next();
                self.set(x);
                self.check_sym(Token::Rbrace, "no }");
            }
            Token::Not => {
                self.next();
                self.factor(x);
                self.check_bool(x);
                self.gen.not_op(x, &self.base);
            }
            Token::False => {
                self.next();
                let bt = self.base.bool_typ;
                self.gen.make_const_item(x, bt, 0);
            }
            Token::True => {
                self.next();
                let bt = self.base.bool_typ;
                self.gen.make_const_item(x, bt, 1);
            }
            _ => {
                self.mark("not a factor");
                let it = self.base.int_typ;
                self.gen.make_const_item(x, it, 0);
            }
        }
    }

    pub(super) fn term(&mut self, x: &mut Item) {
        self.factor(x);
        let f = self.base.typ(x.typ).form;
        while self.sym.is_mul_op() {
            let op = self.sym.clone();
            self.next();
            let mut y = self.new_item();
            match op {
                Token::Times => match f {
                    Form::Int => {
                        self.factor(&mut y);
                        self.check_int(&mut y);
                        self.gen.mul_op(x, &mut y, &self.base);
                    }
                    Form::Real => {
                        self.factor(&mut y);
                        self.check_real(&mut y);
                        self.gen.real_op(&op, x, &mut y, &self.base);
                    }
                    Form::Set => {
                        self.factor(&mut y);
                        self.check_set(&mut y);
                        self.gen.set_op(&op, x, &mut y, &self.base);
                    }
                    _ => self.mark("bad type"),
                },
                Token::Div | Token::Mod => {
                    self.check_int(x);
                    self.factor(&mut y);
                    self.check_int(&mut y);
                    self.gen.div_op(&op, x, &mut y, &self.base);
                }
                Token::Rdiv => match f {
                    Form::Real => {
                        self.factor(&mut y);
                        self.check_real(&mut y);
                        self.gen.real_op(&op, x, &mut y, &self.base);
                    }
                    Form::Set => {
                        self.factor(&mut y);
                        self.check_set(&mut y);
                        self.gen.set_op(&op, x, &mut y, &self.base);
                    }
                    _ => self.mark("bad type"),
                },
                _ => {
                    // &
                    self.check_bool(x);
                    self.gen.and1(x, &self.base);
                    self.factor(&mut y);
                    self.check_bool(&mut y);
                    self.gen.and2(x, &mut y, &self.base);
                }
            }
        }
    }

    pub(super) fn simple_expression(&mut self, x: &mut Item) {
        if self.sym == Token::Minus {
            self.next();
            self.term(x);
            if matches!(
                self.base.typ(x.typ).form,
                Form::Int | Form::Real | Form::Set
            ) {
                self.gen.neg(x, &self.base);
            } else {
                self.check_int(x);
            }
        } else if self.sym == Token::Plus {
            self.next();
            self.term(x);
        } else {
            self.term(x);
        }
        while self.sym.is_add_op() {
            let op = self.sym.clone();
            self.next();
            let mut y = self.new_item();
            if op == Token::Or {
                self.gen.or1(x, &self.base);
                self.check_bool(x);
                self.term(&mut y);
                self.check_bool(&mut y);
                self.gen.or2(x, &mut y, &self.base);
            } else if self.base.typ(x.typ).form == Form::Int {
                self.term(&mut y);
                self.check_int(&mut y);
                self.gen.add_op(&op, x, &mut y, &self.base);
            } else if self.base.typ(x.typ).form == Form::Real {
                self.term(&mut y);
                self.check_real(&mut y);
                self.gen.real_op(&op, x, &mut y, &self.base);
            } else {
                self.check_set(x);
                self.term(&mut y);
                self.check_set(&mut y);
                self.gen.set_op(&op, x, &mut y, &self.base);
            }
        }
    }

    pub(super) fn expression(&mut self, x: &mut Item) {
        self.simple_expression(x);
        if self.sym.is_relation() {
            let rel = self.sym.clone();
            self.next();
            let mut y = self.new_item();
            self.simple_expression(&mut y);
            let xf = self.base.typ(x.typ).form;
            let yf = self.base.typ(y.typ).form;
            let eq_only = matches!(rel, Token::Eql | Token::Neq);
            if x.typ == y.typ {
                if matches!(xf, Form::Char | Form::Int) {
                    self.gen.int_relation(&rel, x, &mut y, &self.base);
                } else if xf == Form::Real {
                    self.gen.real_relation(&rel, x, &mut y, &self.base);
                } else if matches!(
                    xf,
                    Form::Set | Form::Pointer | Form::Proc | Form::NilTyp | Form::Bool
                ) {
                    if eq_only {
                        self.gen.int_relation(&rel, x, &mut y, &self.base);
                    } else {
                        self.mark("only = or #");
                    }
                } else if self.char_array(x.typ) || xf == Form::String {
                    self.gen.string_relation(&rel, x, &mut y, &self.base);
                } else {
                    self.mark("illegal comparison");
                }
            } else if ((xf == Form::Pointer || xf == Form::Proc) && yf == Form::NilTyp)
                || ((yf == Form::Pointer || yf == Form::Proc) && xf == Form::NilTyp)
            {
                if eq_only {
                    self.gen.int_relation(&rel, x, &mut y, &self.base);
                } else {
                    self.mark("only = or #");
                }
            } else if (xf == Form::Pointer
                && yf == Form::Pointer
                && (self.ptr_base_extension(x.typ, y.typ)
                    || self.ptr_base_extension(y.typ, x.typ)))
                || (xf == Form::Proc
                    && yf == Form::Proc
                    && self.equal_signatures(x.typ, y.typ))
            {
                if eq_only {
                    self.gen.int_relation(&rel, x, &mut y, &self.base);
                } else {
                    self.mark("only = or #");
                }
            } else if (self.char_array(x.typ)
                && (yf == Form::String || self.char_array(y.typ)))
                || (self.char_array(y.typ) && xf == Form::String)
            {
                self.gen.string_relation(&rel, x, &mut y, &self.base);
            } else if xf == Form::Char
                && yf == Form::String
                && matches!(y.loc, Loc::Str { len: 2, .. })
            {
                self.gen.str_to_char(&mut y);
                self.gen.int_relation(&rel, x, &mut y, &self.base);
            } else if yf == Form::Char
                && xf == Form::String
                && matches!(x.loc, Loc::Str { len: 2, .. })
            {
                self.gen.str_to_char(x);
                self.gen.int_relation(&rel, x, &mut y, &self.base);
            } else if xf == Form::Int && yf == Form::Int {
                self.gen.int_relation(&rel, x, &mut y, &self.base); // BYTE
            } else {
                self.mark("illegal comparison");
            }
            x.typ = self.base.bool_typ;
        } else if self.sym == Token::In {
            self.next();
            self.check_int(x);
            let mut y = self.new_item();
            self.simple_expression(&mut y);
            self.check_set(&mut y);
            self.gen.in_op(x, &mut y, &self.base);
            x.typ = self.base.bool_typ;
        } else if self.sym == Token::Is {
            self.next();
            let obj = self.qual_ident();
            let t = self.base.obj(obj).typ;
            self.type_test(x, t, false);
            x.typ = self.base.bool_typ;
        }
    }
}
