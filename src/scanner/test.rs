use super::*;
use logos::Logos;
use pretty_assertions::assert_eq;

fn tokens(input: &str) -> Vec<Token> {
    let diag = Diag::new();
    let mut scan = Scanner::new(input, diag);
    let mut out = Vec::new();
    loop {
        let tok = scan.get();
        if tok == Token::Eot {
            break;
        }
        out.push(tok);
    }
    out
}

fn scan_with_diag(input: &str) -> (Vec<Token>, DiagRef) {
    let diag = Diag::new();
    let mut scan = Scanner::new(input, Rc::clone(&diag));
    let mut out = Vec::new();
    loop {
        let tok = scan.get();
        if tok == Token::Eot {
            break;
        }
        out.push(tok);
    }
    (out, diag)
}

#[test]
fn basic_symbols() {
    let mut lexer = Token::lexer("MODULE M; BEGIN x := x + 1 END M.");
    assert_eq!(lexer.next(), Some(Ok(Token::Module)));
    assert_eq!(lexer.next(), Some(Ok(Token::Ident("M".to_string()))));
    assert_eq!(lexer.next(), Some(Ok(Token::Semicolon)));
    assert_eq!(lexer.next(), Some(Ok(Token::Begin)));
    assert_eq!(lexer.next(), Some(Ok(Token::Ident("x".to_string()))));
    assert_eq!(lexer.next(), Some(Ok(Token::Becomes)));
    assert_eq!(lexer.next(), Some(Ok(Token::Ident("x".to_string()))));
    assert_eq!(lexer.next(), Some(Ok(Token::Plus)));
    assert_eq!(lexer.next(), Some(Ok(Token::Int(1))));
    assert_eq!(lexer.next(), Some(Ok(Token::End)));
    assert_eq!(lexer.next(), Some(Ok(Token::Ident("M".to_string()))));
    assert_eq!(lexer.next(), Some(Ok(Token::Period)));
    assert_eq!(lexer.next(), None);
}

#[test]
fn keywords_are_case_sensitive() {
    assert_eq!(
        tokens("begin BEGIN"),
        vec![Token::Ident("begin".to_string()), Token::Begin]
    );
}

#[test]
fn numeric_literals() {
    assert_eq!(tokens("42"), vec![Token::Int(42)]);
    assert_eq!(tokens("0FFH"), vec![Token::Int(255)]);
    assert_eq!(tokens("0FFFFFFFFH"), vec![Token::Int(-1)]);
    assert_eq!(tokens("41X"), vec![Token::Char(0x41)]);
    assert_eq!(tokens("2147483647"), vec![Token::Int(i32::MAX)]);
}

#[test]
fn hex_bit_pattern_reals() {
    // 3F800000R is the bit pattern of 1.0
    assert_eq!(tokens("3F800000R"), vec![Token::Real(1.0)]);
    assert_eq!(tokens("40490FDBR"), vec![Token::Real(f32::from_bits(0x40490FDB))]);
}

#[test]
fn real_literals() {
    assert_eq!(tokens("1.5"), vec![Token::Real(1.5)]);
    assert_eq!(tokens("2.0E3"), vec![Token::Real(2000.0)]);
    assert_eq!(tokens("2.0D3"), vec![Token::Real(2000.0)]);
    assert_eq!(tokens("1.0E-2"), vec![Token::Real(0.01)]);
    // |exponent| beyond 38 underflows quietly to zero
    assert_eq!(tokens("1.0E-40"), vec![Token::Real(0.0)]);
}

#[test]
fn real_overflow_is_reported() {
    let (toks, diag) = scan_with_diag("1.0E40");
    assert_eq!(toks, vec![Token::Real(0.0)]);
    assert_eq!(diag.borrow().notes()[0].msg, "too large");
}

#[test]
fn integer_overflow_is_reported() {
    let (toks, diag) = scan_with_diag("2147483648");
    assert_eq!(toks, vec![Token::Int(0)]);
    assert_eq!(diag.borrow().notes()[0].msg, "too large");
}

#[test]
fn hex_digits_in_decimal_are_reported() {
    let (toks, diag) = scan_with_diag("1A");
    assert_eq!(toks.len(), 1);
    assert!(matches!(toks[0], Token::Int(_)));
    assert_eq!(diag.borrow().notes()[0].msg, "bad integer");
}

#[test]
fn char_literal_out_of_range() {
    let (toks, diag) = scan_with_diag("100X");
    assert_eq!(toks, vec![Token::Char(0)]);
    assert_eq!(diag.borrow().notes()[0].msg, "illegal value");
}

#[test]
fn upto_is_one_symbol() {
    assert_eq!(
        tokens("1..2"),
        vec![Token::Int(1), Token::Upto, Token::Int(2)]
    );
    assert_eq!(
        tokens("a.b"),
        vec![
            Token::Ident("a".to_string()),
            Token::Period,
            Token::Ident("b".to_string()),
        ]
    );
}

#[test]
fn identifiers_truncate_at_32() {
    let long = "a".repeat(40);
    let (toks, diag) = scan_with_diag(&long);
    assert_eq!(toks, vec![Token::Ident("a".repeat(32))]);
    assert_eq!(diag.borrow().err_cnt(), 0);
}

#[test]
fn strings_carry_a_nul() {
    assert_eq!(tokens("\"abc\""), vec![Token::Str(b"abc\0".to_vec())]);
    assert_eq!(tokens("\"\""), vec![Token::Str(b"\0".to_vec())]);
}

#[test]
fn overlong_string_is_reported() {
    let src = format!("\"{}\"", "x".repeat(300));
    let (toks, diag) = scan_with_diag(&src);
    match &toks[0] {
        Token::Str(bytes) => assert_eq!(bytes.len(), STRING_BUF_SIZE),
        other => panic!("expected string, got {:?}", other),
    }
    assert_eq!(diag.borrow().notes()[0].msg, "string too long");
}

#[test]
fn hex_strings_have_no_nul() {
    assert_eq!(tokens("$ 41 42 $"), vec![Token::Str(vec![0x41, 0x42])]);
    assert_eq!(tokens("$$"), vec![Token::Str(vec![])]);
}

#[test]
fn comments_nest() {
    assert_eq!(tokens("1 (* (* inner *) still out *) 2"), vec![
        Token::Int(1),
        Token::Int(2),
    ]);
}

#[test]
fn unterminated_comment_is_reported() {
    let (toks, diag) = scan_with_diag("(* never closed");
    assert_eq!(toks, vec![]);
    assert_eq!(diag.borrow().notes()[0].msg, "unterminated comment");
}

#[test]
fn stray_characters_are_skipped() {
    assert_eq!(tokens("a ! b"), vec![
        Token::Ident("a".to_string()),
        Token::Ident("b".to_string()),
    ]);
}

#[test]
fn error_throttle() {
    let diag = Diag::new();
    // forty marks at tightly packed positions
    for pos in 0..40 {
        diag.borrow_mut().mark_at(pos, "synthetic");
    }
    let d = diag.borrow();
    assert_eq!(d.err_cnt(), 25);
    // one message per 4-position window at most
    assert!(d.notes().len() <= 10);
    assert!(d.notes().len() as u32 <= d.err_cnt());
}

#[test]
fn plain_sink_format() {
    let diag = Diag::new();
    diag.borrow_mut().mark_at(17, "undef");
    let mut out = Vec::new();
    diag.borrow().write_plain(&mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "\n  pos 17 undef");
}

#[test]
fn symbol_class_ranges() {
    assert!(Token::Eql.is_relation());
    assert!(Token::Geq.is_relation());
    assert!(!Token::In.is_relation());
    assert!(Token::Plus.is_add_op());
    assert!(Token::Or.is_add_op());
    assert!(Token::Times.is_mul_op());
    assert!(Token::And.is_mul_op());
    assert!(!Token::Plus.is_mul_op());
    // the statement keyword cluster is contiguous
    assert!(Token::If.rank() > Token::Ident(String::new()).rank());
    assert!(Token::For.rank() < Token::Then.rank());
}
