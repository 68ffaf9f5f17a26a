use std::path::PathBuf;

use pretty_assertions::assert_eq;

use super::*;
use crate::base::{Object, Type};
use crate::scanner::Diag;

fn setup() -> (Base, Generator) {
    let diag = Diag::new();
    let base = Base::new(std::rc::Rc::clone(&diag), PathBuf::from("."));
    let gen = Generator::new(diag, &base);
    (base, gen)
}

fn int_const(b: &Base, val: i32) -> Item {
    let mut x = Item::new(b.int_typ);
    x.loc = Loc::Const { val };
    x
}

fn local_int(b: &Base, off: i32) -> Item {
    let mut x = Item::new(b.int_typ);
    x.loc = Loc::Var { base: 1, off };
    x
}

#[test]
fn div_and_mod_are_floored() {
    let (b, mut g) = setup();
    let mut x = int_const(&b, -15);
    let mut y = int_const(&b, 4);
    g.div_op(&Token::Div, &mut x, &mut y, &b);
    assert_eq!(x.loc, Loc::Const { val: -4 });

    let mut x = int_const(&b, -15);
    let mut y = int_const(&b, 4);
    g.div_op(&Token::Mod, &mut x, &mut y, &b);
    assert_eq!(x.loc, Loc::Const { val: 1 });
}

#[test]
fn division_by_nonpositive_constant_is_reported() {
    let diag = Diag::new();
    let b = Base::new(std::rc::Rc::clone(&diag), PathBuf::from("."));
    let mut g = Generator::new(std::rc::Rc::clone(&diag), &b);
    let mut x = int_const(&b, 1);
    let mut y = int_const(&b, 0);
    g.div_op(&Token::Div, &mut x, &mut y, &b);
    assert_eq!(diag.borrow().notes()[0].msg, "bad divisor");
}

#[test]
fn power_of_two_division_becomes_a_shift() {
    let (b, mut g) = setup();
    let mut x = local_int(&b, 4);
    let mut y = int_const(&b, 4);
    g.div_op(&Token::Div, &mut x, &mut y, &b);
    // LDR R0, SP, 4 then ASR R0, R0, 2
    assert_eq!(
        g.code_words(),
        &[risc::f2(risc::LDR, 0, risc::SP, 4), risc::f1(risc::ASR, 0, 0, 2)]
    );
}

#[test]
fn wide_power_of_two_modulus_uses_rotation() {
    let (b, mut g) = setup();
    let mut x = local_int(&b, 0);
    let mut y = int_const(&b, 1 << 20);
    g.div_op(&Token::Mod, &mut x, &mut y, &b);
    // the mask does not fit 16 bits: LSL 12 then ROR 12
    assert_eq!(
        g.code_words(),
        &[
            risc::f2(risc::LDR, 0, risc::SP, 0),
            risc::f1(risc::LSL, 0, 0, 12),
            risc::f1(risc::ROR, 0, 0, 12),
        ]
    );
}

#[test]
fn wide_immediates_promote_to_two_instructions() {
    let (b, mut g) = setup();
    let mut x = int_const(&b, 0x12345);
    g.load(&mut x, &b);
    assert_eq!(
        g.code_words(),
        &[
            risc::f1(risc::MOV + risc::U, 0, 0, 1),
            risc::f1(risc::IOR, 0, 0, 0x2345),
        ]
    );
    assert_eq!(x.loc, Loc::Reg(0));
}

#[test]
fn multiplication_by_power_of_two_shifts() {
    let (b, mut g) = setup();
    let mut x = local_int(&b, 0);
    let mut y = int_const(&b, 8);
    g.mul_op(&mut x, &mut y, &b);
    assert_eq!(
        g.code_words(),
        &[risc::f2(risc::LDR, 0, risc::SP, 0), risc::f1(risc::LSL, 0, 0, 3)]
    );
}

#[test]
fn constant_folding_wraps_like_the_target() {
    let (b, mut g) = setup();
    let mut x = int_const(&b, i32::MAX);
    let mut y = int_const(&b, 1);
    g.add_op(&Token::Plus, &mut x, &mut y, &b);
    assert_eq!(x.loc, Loc::Const { val: i32::MIN });
}

#[test]
fn register_stack_must_drain_per_statement() {
    let diag = Diag::new();
    let b = Base::new(std::rc::Rc::clone(&diag), PathBuf::from("."));
    let mut g = Generator::new(std::rc::Rc::clone(&diag), &b);
    let mut x = local_int(&b, 0);
    g.load(&mut x, &b);
    g.check_regs();
    assert_eq!(diag.borrow().notes()[0].msg, "Reg Stack");
    // and the stack is reset for the next statement
    g.check_regs();
    assert_eq!(diag.borrow().err_cnt(), 1);
}

#[test]
fn string_pool_pads_to_words() {
    let (b, mut g) = setup();
    let mut x = Item::new(b.str_typ);
    g.make_string_item(&mut x, b"ab\0");
    assert_eq!(x.loc, Loc::Str { pool: 0, len: 3 });
    let mut y = Item::new(b.str_typ);
    g.make_string_item(&mut y, b"c\0");
    // the second literal lands on the next word boundary
    assert_eq!(y.loc, Loc::Str { pool: 4, len: 2 });
}

#[test]
fn single_char_strings_demote_to_char() {
    let (b, mut g) = setup();
    let mut x = Item::new(b.str_typ);
    g.make_string_item(&mut x, b"a\0");
    g.str_to_char(&mut x);
    assert_eq!(x.loc, Loc::Const { val: b'a' as i32 });
    assert_eq!(x.typ, b.char_typ);
}

#[test]
fn plain_record_descriptor() {
    let diag = Diag::new();
    let mut b = Base::new(std::rc::Rc::clone(&diag), PathBuf::from("."));
    let mut g = Generator::new(diag, &b);
    let rec = b.alloc_typ(Type {
        form: Form::Record,
        size: 8,
        ..Type::default()
    });
    let mut dc = 0;
    g.build_td(&mut b, rec, &mut dc);
    // size rounds up to 32; empty extension chain; no pointer fields
    assert_eq!(g.td_words(), &[32, -1, -1, -1, -1]);
    assert_eq!(dc, 20);
    assert_eq!(b.typ(rec).len, 0);
}

#[test]
fn descriptor_lists_pointer_offsets() {
    let diag = Diag::new();
    let mut b = Base::new(std::rc::Rc::clone(&diag), PathBuf::from("."));
    let mut g = Generator::new(diag, &b);
    let ptr = b.alloc_typ(Type {
        form: Form::Pointer,
        size: 4,
        ..Type::default()
    });
    let mut fld = Object::new("p", Class::Fld, ptr);
    fld.val = 4;
    let fld = b.alloc_obj(fld);
    let rec = b.alloc_typ(Type {
        form: Form::Record,
        size: 8,
        dsc: Some(fld),
        ..Type::default()
    });
    let mut dc = 0;
    g.build_td(&mut b, rec, &mut dc);
    assert_eq!(g.td_words(), &[32, -1, -1, -1, 4, -1]);
}

#[test]
fn descriptor_size_rounding() {
    for (record_size, rounded) in [(4, 32), (24, 32), (28, 64), (56, 64), (100, 128), (200, 256)] {
        let diag = Diag::new();
        let mut b = Base::new(std::rc::Rc::clone(&diag), PathBuf::from("."));
        let mut g = Generator::new(diag, &b);
        let rec = b.alloc_typ(Type {
            form: Form::Record,
            size: record_size,
            ..Type::default()
        });
        let mut dc = 0;
        g.build_td(&mut b, rec, &mut dc);
        assert_eq!(g.td_words()[0], rounded, "record size {}", record_size);
    }
}

#[test]
fn deep_extension_is_rejected() {
    let diag = Diag::new();
    let mut b = Base::new(std::rc::Rc::clone(&diag), PathBuf::from("."));
    let mut g = Generator::new(std::rc::Rc::clone(&diag), &b);
    let rec = b.alloc_typ(Type {
        form: Form::Record,
        size: 4,
        nof_par: 4, // extension depth
        ..Type::default()
    });
    let mut dc = 0;
    g.build_td(&mut b, rec, &mut dc);
    assert_eq!(diag.borrow().notes()[0].msg, "ext level too large");
}

#[test]
fn forward_jumps_chain_and_resolve() {
    let (b, mut g) = setup();
    let _ = b;
    let mut l = 0;
    g.bjump(0); // word 0 is never part of a chain; it terminates them
    g.fjump(&mut l);
    g.fjump(&mut l);
    assert_eq!(l, 2);
    // the second branch links back to the first through its offset field
    assert_eq!(g.code_words()[2] & 0xFF_FFFF, 1);
    g.fix_link(l);
    assert_eq!(g.code_words()[2] & 0xFF_FFFF, 0);
    assert_eq!(g.code_words()[1] & 0xFF_FFFF, 1);
}
