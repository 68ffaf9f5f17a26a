//! Statements: assignment, procedure calls, the structured statements, and
//! the in-line standard procedures.

use crate::base::{Class, Form, ObjId};
use crate::generator::Loc;
use crate::scanner::{rank, Token};

use super::Parser;

impl Parser<'_> {
    fn stand_proc(&mut self, pno: i32) {
        self.check_sym(Token::Lparen, "no (");
        let n_par = pno % 10;
        let pno = pno / 10;
        let mut x = self.new_item();
        let mut y = self.new_item();
        let mut z = self.new_item();
        self.expression(&mut x);
        let mut nap = 1;
        if self.sym == Token::Comma {
            self.next();
            self.expression(&mut y);
            nap = 2;
            z.typ = self.base.no_typ;
            while self.sym == Token::Comma {
                self.next();
                self.expression(&mut z);
                nap += 1;
            }
        } else {
            y.typ = self.base.no_typ;
        }
        self.check_sym(Token::Rparen, "no )");
        if n_par == nap || pno == 0 || pno == 1 {
            match pno {
                0 | 1 => {
                    // INC, DEC
                    self.check_int(&mut x);
                    self.check_read_only(&x);
                    if y.typ != self.base.no_typ {
                        self.check_int(&mut y);
                    }
                    self.gen.increment(pno == 1, &mut x, &mut y, &self.base);
                }
                2 | 3 => {
                    // INCL, EXCL
                    self.check_set(&mut x);
                    self.check_read_only(&x);
                    self.check_int(&mut y);
                    self.gen.include(pno == 3, &mut x, &mut y, &self.base);
                }
                4 => {
                    self.check_bool(&mut x);
                    self.gen.assert(&mut x, &self.base);
                }
                5 => {
                    // NEW
                    self.check_read_only(&x);
                    let ok = self.base.typ(x.typ).form == Form::Pointer && {
                        let bt = self.base.typ(x.typ).base.unwrap_or(self.base.no_typ);
                        self.base.typ(bt).form == Form::Record
                    };
                    if ok {
                        self.gen.new_ptr(&mut x, &self.base);
                    } else {
                        self.mark("not a pointer to record");
                    }
                }
                6 => {
                    // PACK
                    self.check_real(&mut x);
                    self.check_int(&mut y);
                    self.check_read_only(&x);
                    self.gen.pack(&mut x, &mut y, &self.base);
                }
                7 => {
                    // UNPK
                    self.check_real(&mut x);
                    self.check_int(&mut y);
                    self.check_read_only(&x);
                    self.gen.unpk(&mut x, &mut y, &self.base);
                }
                8 => {
                    // LED
                    if self.base.typ(x.typ).form <= Form::Set {
                        self.gen.led(&mut x, &self.base);
                    } else {
                        self.mark("bad type");
                    }
                }
                10 => {
                    self.check_int(&mut x);
                    self.gen.sys_get(&mut x, &mut y, &self.base);
                }
                11 => {
                    self.check_int(&mut x);
                    self.gen.sys_put(&mut x, &mut y, &self.base);
                }
                12 => {
                    self.check_int(&mut x);
                    self.check_int(&mut y);
                    self.check_int(&mut z);
                    self.gen.sys_copy(&mut x, &mut y, &mut z, &self.base);
                }
                13 => {
                    self.check_const(&mut x);
                    self.check_int(&mut x);
                    self.gen.ldpsr(&x);
                }
                14 => {
                    self.check_int(&mut x);
                    self.gen.ldreg(&x, &mut y, &self.base);
                }
                _ => {}
            }
        } else {
            self.mark("wrong nof parameters");
        }
    }

    fn assignment_or_call(&mut self, obj: ObjId) {
        let mut x = self.new_item();
        self.gen.make_item(&mut x, obj, &self.base, self.level);
        if let Loc::StdProc { num } = x.loc {
            self.stand_proc(num);
            return;
        }
        self.selector(&mut x);
        if self.sym == Token::Becomes {
            self.next();
            self.check_read_only(&x);
            let mut y = self.new_item();
            self.expression(&mut y);
            let xf = self.base.typ(x.typ).form;
            let yf = self.base.typ(y.typ).form;
            if self.comp_types(x.typ, y.typ, false) {
                if xf <= Form::Pointer || xf == Form::Proc {
                    self.gen.store(&mut x, &mut y, &self.base);
                } else {
                    self.gen.store_struct(&mut x, &mut y, &self.base);
                }
            } else if xf == Form::Array
                && yf == Form::Array
                && self.base.typ(x.typ).base == self.base.typ(y.typ).base
                && self.base.typ(y.typ).len < 0
            {
                self.gen.store_struct(&mut x, &mut y, &self.base);
            } else if self.char_array(x.typ) && yf == Form::String {
                self.gen.copy_string(&mut x, &mut y, &self.base);
            } else if xf == Form::Int && yf == Form::Int {
                self.gen.store(&mut x, &mut y, &self.base); // BYTE
            } else if xf == Form::Char
                && yf == Form::String
                && matches!(y.loc, Loc::Str { len: 2, .. })
            {
                self.gen.str_to_char(&mut y);
                self.gen.store(&mut x, &mut y, &self.base);
            } else {
                self.mark("illegal assignment");
            }
        } else if self.sym == Token::Eql {
            self.mark("should be :=");
            self.next();
            let mut y = self.new_item();
            self.expression(&mut y);
        } else if self.sym == Token::Lparen {
            // procedure call with parameters
            self.next();
            let proper = self.base.typ(x.typ).form == Form::Proc && {
                let bt = self.base.typ(x.typ).base.unwrap_or(self.base.no_typ);
                self.base.typ(bt).form == Form::NoTyp
            };
            if proper {
                let rx = self.gen.prep_call(&mut x, &self.base);
                self.param_list(&mut x);
                self.gen.call(&mut x, rx, &self.base);
            } else {
                self.mark("not a procedure");
                self.param_list(&mut x);
            }
        } else if self.base.typ(x.typ).form == Form::Proc {
            // parameterless call
            if self.base.typ(x.typ).nof_par > 0 {
                self.mark("missing parameters");
            }
            let bt = self.base.typ(x.typ).base.unwrap_or(self.base.no_typ);
            if self.base.typ(bt).form == Form::NoTyp {
                let rx = self.gen.prep_call(&mut x, &self.base);
                self.gen.call(&mut x, rx, &self.base);
            } else {
                self.mark("not a procedure");
            }
        } else if matches!(x.loc, Loc::TypeRef) {
            self.mark("illegal assignment");
        } else {
            self.mark("not a procedure");
        }
    }

    fn type_case(&mut self, obj: ObjId, x: &mut crate::generator::Item) {
        if matches!(self.sym, Token::Ident(_)) {
            let typ_obj = self.qual_ident();
            self.gen.make_item(x, obj, &self.base, self.level);
            if self.base.obj(typ_obj).class != Class::Typ {
                self.mark("not a type");
            }
            let t = self.base.obj(typ_obj).typ;
            self.type_test(x, t, false);
            self.base.obj_mut(obj).typ = t;
            self.gen.cfjump(x, &self.base);
            self.check_sym(Token::Colon, ": expected");
            self.stat_sequence();
        } else {
            self.gen.cfjump(x, &self.base);
            self.mark("type id expected");
        }
    }

    fn skip_case(&mut self) {
        while self.sym != Token::Colon && self.sym != Token::Eot {
            self.next();
        }
        self.next();
        self.stat_sequence();
    }

    pub(super) fn stat_sequence(&mut self) {
        loop {
            let r = self.sym.rank();
            if !((rank::IDENT..=rank::FOR).contains(&r) || r >= rank::SEMICOLON) {
                self.mark("statement expected");
                loop {
                    self.next();
                    if self.sym.rank() >= rank::IDENT {
                        break;
                    }
                }
            }
            match self.sym.clone() {
                Token::Ident(_) => {
                    let obj = self.qual_ident();
                    self.assignment_or_call(obj);
                }
                Token::If => {
                    self.next();
                    let mut x = self.new_item();
                    self.expression(&mut x);
                    self.check_bool(&mut x);
                    self.gen.cfjump(&mut x, &self.base);
                    self.check_sym(Token::Then, "no THEN");
                    self.stat_sequence();
                    let mut l0 = 0;
                    while self.sym == Token::Elsif {
                        self.next();
                        self.gen.fjump(&mut l0);
                        self.gen.fixup(&x);
                        self.expression(&mut x);
                        self.check_bool(&mut x);
                        self.gen.cfjump(&mut x, &self.base);
                        self.check_sym(Token::Then, "no THEN");
                        self.stat_sequence();
                    }
                    if self.sym == Token::Else {
                        self.next();
                        self.gen.fjump(&mut l0);
                        self.gen.fixup(&x);
                        self.stat_sequence();
                    } else {
                        self.gen.fixup(&x);
                    }
                    self.gen.fix_link(l0);
                    self.check_sym(Token::End, "no END");
                }
                Token::While => {
                    self.next();
                    let l0 = self.gen.here();
                    let mut x = self.new_item();
                    self.expression(&mut x);
                    self.check_bool(&mut x);
                    self.gen.cfjump(&mut x, &self.base);
                    self.check_sym(Token::Do, "no DO");
                    self.stat_sequence();
                    self.gen.bjump(l0);
                    while self.sym == Token::Elsif {
                        self.next();
                        self.gen.fixup(&x);
                        self.expression(&mut x);
                        self.check_bool(&mut x);
                        self.gen.cfjump(&mut x, &self.base);
                        self.check_sym(Token::Do, "no DO");
                        self.stat_sequence();
                        self.gen.bjump(l0);
                    }
                    self.gen.fixup(&x);
                    self.check_sym(Token::End, "no END");
                }
                Token::Repeat => {
                    self.next();
                    let l0 = self.gen.here();
                    self.stat_sequence();
                    if self.sym == Token::Until {
                        self.next();
                        let mut x = self.new_item();
                        self.expression(&mut x);
                        self.check_bool(&mut x);
                        self.gen.cbjump(&mut x, l0, &self.base);
                    } else {
                        self.mark("missing UNTIL");
                    }
                }
                Token::For => {
                    self.next();
                    if matches!(self.sym, Token::Ident(_)) {
                        let obj = self.qual_ident();
                        let mut x = self.new_item();
                        self.gen.make_item(&mut x, obj, &self.base, self.level);
                        self.check_int(&mut x);
                        self.check_read_only(&x);
                        if self.sym == Token::Becomes {
                            self.next();
                            let mut y = self.new_item();
                            self.expression(&mut y);
                            self.check_int(&mut y);
                            self.gen.for0(&mut y, &self.base);
                            let l0 = self.gen.here();
                            self.check_sym(Token::To, "no TO");
                            let mut z = self.new_item();
                            self.expression(&mut z);
                            self.check_int(&mut z);
                            self.base.obj_mut(obj).rdo = true;
                            let mut w = self.new_item();
                            if self.sym == Token::By {
                                self.next();
                                self.expression(&mut w);
                                self.check_const(&mut w);
                                self.check_int(&mut w);
                            } else {
                                let it = self.base.int_typ;
                                self.gen.make_const_item(&mut w, it, 1);
                            }
                            self.check_sym(Token::Do, "no DO");
                            let l1 = self.gen.for1(&mut x, &mut y, &mut z, &w, &self.base);
                            self.stat_sequence();
                            self.check_sym(Token::End, "no END");
                            self.gen.for2(&mut x, &w, &self.base);
                            self.gen.bjump(l0);
                            self.gen.fix_link(l1);
                            self.base.obj_mut(obj).rdo = false;
                        } else {
                            self.mark(":= expected");
                        }
                    } else {
                        self.mark("identifier expected");
                    }
                }
                Token::Case => {
                    self.next();
                    if matches!(self.sym, Token::Ident(_)) {
                        let obj = self.qual_ident();
                        let org_type = self.base.obj(obj).typ;
                        let of = self.base.typ(org_type).form;
                        if of == Form::Pointer
                            || (of == Form::Record && self.base.obj(obj).class == Class::Par)
                        {
                            self.check_sym(Token::Of, "OF expected");
                            let mut x = self.new_item();
                            self.type_case(obj, &mut x);
                            let mut l0 = 0;
                            while self.sym == Token::Bar {
                                self.next();
                                self.gen.fjump(&mut l0);
                                self.gen.fixup(&x);
                                self.base.obj_mut(obj).typ = org_type;
                                self.type_case(obj, &mut x);
                            }
                            self.gen.fixup(&x);
                            self.gen.fix_link(l0);
                            self.base.obj_mut(obj).typ = org_type;
                        } else {
                            self.mark("numeric case not implemented");
                            self.check_sym(Token::Of, "OF expected");
                            self.skip_case();
                            while self.sym == Token::Bar {
                                self.skip_case();
                            }
                        }
                    } else {
                        self.mark("ident expected");
                    }
                    self.check_sym(Token::End, "no END");
                }
                _ => {}
            }
            self.gen.check_regs();
            if self.sym == Token::Semicolon {
                self.next();
            } else if self.sym.rank() < rank::SEMICOLON {
                self.mark("missing semicolon?");
            }
            if self.sym.rank() > rank::SEMICOLON {
                break;
            }
        }
    }
}
