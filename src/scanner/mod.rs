//! Lexical analysis.
//!
//! Input is Oberon-07 text, output is a stream of symbols: identifiers,
//! numbers, strings and the special symbols and keywords of the language.
//! Literal values ride in the token payloads. Comments nest and are
//! discarded here, as is whitespace.
//!
//! The [`Scanner`] is a pull-style adapter over the generated lexer: the
//! parser asks for one symbol at a time with [`Scanner::get`] and reports
//! errors through [`Scanner::mark`], which throttles cascades (one message
//! per 4-position window, 25 at most) into the shared [`Diag`] record.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use logos::{Lexer, Logos, Skip};

#[cfg(test)]
pub mod test;

/// Identifiers longer than this are silently truncated.
pub const ID_LEN: usize = 32;
/// String literals hold at most this many bytes, terminating NUL included.
pub const STRING_BUF_SIZE: usize = 256;
/// Largest admissible scale factor of a real literal.
const MAX_EXP: i32 = 38;
/// Numeric literals keep at most this many digits.
const MAX_DIGITS: usize = 16;

/// Errors found inside literal callbacks, delivered to the [`Diag`] record
/// when the surrounding token is handed out.
#[derive(Default)]
pub struct Pending {
    errs: Vec<(usize, &'static str)>,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(extras = Pending)]
#[logos(skip r"[\x01-\x20]+")]
pub enum Token {
    #[regex(r"[A-Za-z][A-Za-z0-9]*", lex_ident)]
    Ident(String),

    #[regex(r"[0-9][0-9A-F]*", lex_int)]
    #[regex(r"[0-9][0-9A-F]*H", lex_hex)]
    Int(i32),

    // hex character literal, e.g. 41X
    #[regex(r"[0-9][0-9A-F]*X", lex_char)]
    Char(u8),

    #[regex(r"[0-9]+\.[0-9]+([ED][+-]?[0-9]+)?", lex_real)]
    #[regex(r"[0-9][0-9A-F]*R", lex_real_bits)]
    Real(f32),

    // quoted strings carry a terminating NUL, hex strings do not
    #[regex(r#""[^"]*""#, lex_string)]
    #[token("$", lex_hex_string)]
    Str(Vec<u8>),

    // comments nest; the callback consumes the whole bracketed range
    #[token("(*", lex_comment)]
    Comment,

    #[token("*")]
    Times,
    #[token("/")]
    Rdiv,
    #[token("DIV")]
    Div,
    #[token("MOD")]
    Mod,
    #[token("&")]
    And,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("OR")]
    Or,
    #[token("=")]
    Eql,
    #[token("#")]
    Neq,
    #[token("<")]
    Lss,
    #[token("<=")]
    Leq,
    #[token(">")]
    Gtr,
    #[token(">=")]
    Geq,
    #[token("IN")]
    In,
    #[token("IS")]
    Is,
    #[token("^")]
    Arrow,
    #[token(".")]
    Period,
    #[token("..")]
    Upto,
    #[token("FALSE")]
    False,
    #[token("TRUE")]
    True,
    #[token("NIL")]
    Nil,
    #[token("~")]
    Not,
    #[token("(")]
    Lparen,
    #[token("[")]
    Lbrak,
    #[token("{")]
    Lbrace,
    #[token(")")]
    Rparen,
    #[token("]")]
    Rbrak,
    #[token("}")]
    Rbrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(":=")]
    Becomes,
    #[token(";")]
    Semicolon,
    #[token("|")]
    Bar,
    #[token("IF")]
    If,
    #[token("WHILE")]
    While,
    #[token("REPEAT")]
    Repeat,
    #[token("CASE")]
    Case,
    #[token("FOR")]
    For,
    #[token("THEN")]
    Then,
    #[token("OF")]
    Of,
    #[token("DO")]
    Do,
    #[token("TO")]
    To,
    #[token("BY")]
    By,
    #[token("END")]
    End,
    #[token("ELSE")]
    Else,
    #[token("ELSIF")]
    Elsif,
    #[token("UNTIL")]
    Until,
    #[token("RETURN")]
    Return,
    #[token("ARRAY")]
    Array,
    #[token("RECORD")]
    Record,
    #[token("POINTER")]
    Pointer,
    #[token("CONST")]
    Const,
    #[token("TYPE")]
    Type,
    #[token("VAR")]
    Var,
    #[token("PROCEDURE")]
    Procedure,
    #[token("BEGIN")]
    Begin,
    #[token("IMPORT")]
    Import,
    #[token("MODULE")]
    Module,

    // a NUL byte ends the text, as in Oberon texts; the scanner also
    // synthesises this symbol at end of input
    #[token("\x00")]
    Eot,
}

/// Numeric ranks of the lexical symbols. The order is relevant: the parser
/// recognises whole symbol classes with range comparisons (the relations,
/// the operator groups, the `IF … UNTIL` statement cluster, the
/// declaration keywords).
pub mod rank {
    pub const TIMES: u8 = 1;
    pub const RDIV: u8 = 2;
    pub const DIV: u8 = 3;
    pub const MOD: u8 = 4;
    pub const AND: u8 = 5;
    pub const PLUS: u8 = 6;
    pub const MINUS: u8 = 7;
    pub const OR: u8 = 8;
    pub const EQL: u8 = 9;
    pub const NEQ: u8 = 10;
    pub const LSS: u8 = 11;
    pub const LEQ: u8 = 12;
    pub const GTR: u8 = 13;
    pub const GEQ: u8 = 14;
    pub const IN: u8 = 15;
    pub const IS: u8 = 16;
    pub const ARROW: u8 = 17;
    pub const PERIOD: u8 = 18;
    pub const CHAR: u8 = 19;
    pub const INT: u8 = 20;
    pub const REAL: u8 = 21;
    pub const FALSE: u8 = 22;
    pub const TRUE: u8 = 23;
    pub const NIL: u8 = 24;
    pub const STRING: u8 = 25;
    pub const NOT: u8 = 26;
    pub const LPAREN: u8 = 27;
    pub const LBRAK: u8 = 28;
    pub const LBRACE: u8 = 29;
    pub const IDENT: u8 = 30;
    pub const IF: u8 = 31;
    pub const WHILE: u8 = 32;
    pub const REPEAT: u8 = 33;
    pub const CASE: u8 = 34;
    pub const FOR: u8 = 35;
    pub const COMMA: u8 = 36;
    pub const COLON: u8 = 37;
    pub const BECOMES: u8 = 38;
    pub const UPTO: u8 = 39;
    pub const RPAREN: u8 = 40;
    pub const RBRAK: u8 = 41;
    pub const RBRACE: u8 = 42;
    pub const THEN: u8 = 43;
    pub const OF: u8 = 44;
    pub const DO: u8 = 45;
    pub const TO: u8 = 46;
    pub const BY: u8 = 47;
    pub const SEMICOLON: u8 = 48;
    pub const END: u8 = 49;
    pub const BAR: u8 = 50;
    pub const ELSE: u8 = 51;
    pub const ELSIF: u8 = 52;
    pub const UNTIL: u8 = 53;
    pub const RETURN: u8 = 54;
    pub const ARRAY: u8 = 55;
    pub const RECORD: u8 = 56;
    pub const POINTER: u8 = 57;
    pub const CONST: u8 = 58;
    pub const TYPE: u8 = 59;
    pub const VAR: u8 = 60;
    pub const PROCEDURE: u8 = 61;
    pub const BEGIN: u8 = 62;
    pub const IMPORT: u8 = 63;
    pub const MODULE: u8 = 64;
    pub const EOT: u8 = 65;
}

impl Token {
    pub fn rank(&self) -> u8 {
        use Token::*;
        match self {
            Comment => 0,
            Times => rank::TIMES,
            Rdiv => rank::RDIV,
            Div => rank::DIV,
            Mod => rank::MOD,
            And => rank::AND,
            Plus => rank::PLUS,
            Minus => rank::MINUS,
            Or => rank::OR,
            Eql => rank::EQL,
            Neq => rank::NEQ,
            Lss => rank::LSS,
            Leq => rank::LEQ,
            Gtr => rank::GTR,
            Geq => rank::GEQ,
            In => rank::IN,
            Is => rank::IS,
            Arrow => rank::ARROW,
            Period => rank::PERIOD,
            Char(_) => rank::CHAR,
            Int(_) => rank::INT,
            Real(_) => rank::REAL,
            False => rank::FALSE,
            True => rank::TRUE,
            Nil => rank::NIL,
            Str(_) => rank::STRING,
            Not => rank::NOT,
            Lparen => rank::LPAREN,
            Lbrak => rank::LBRAK,
            Lbrace => rank::LBRACE,
            Ident(_) => rank::IDENT,
            If => rank::IF,
            While => rank::WHILE,
            Repeat => rank::REPEAT,
            Case => rank::CASE,
            For => rank::FOR,
            Comma => rank::COMMA,
            Colon => rank::COLON,
            Becomes => rank::BECOMES,
            Upto => rank::UPTO,
            Rparen => rank::RPAREN,
            Rbrak => rank::RBRAK,
            Rbrace => rank::RBRACE,
            Then => rank::THEN,
            Of => rank::OF,
            Do => rank::DO,
            To => rank::TO,
            By => rank::BY,
            Semicolon => rank::SEMICOLON,
            End => rank::END,
            Bar => rank::BAR,
            Else => rank::ELSE,
            Elsif => rank::ELSIF,
            Until => rank::UNTIL,
            Return => rank::RETURN,
            Array => rank::ARRAY,
            Record => rank::RECORD,
            Pointer => rank::POINTER,
            Const => rank::CONST,
            Type => rank::TYPE,
            Var => rank::VAR,
            Procedure => rank::PROCEDURE,
            Begin => rank::BEGIN,
            Import => rank::IMPORT,
            Module => rank::MODULE,
            Eot => rank::EOT,
        }
    }

    pub fn is_mul_op(&self) -> bool {
        (rank::TIMES..=rank::AND).contains(&self.rank())
    }

    pub fn is_add_op(&self) -> bool {
        (rank::PLUS..=rank::OR).contains(&self.rank())
    }

    pub fn is_relation(&self) -> bool {
        (rank::EQL..=rank::GEQ).contains(&self.rank())
    }
}

/// A recorded compile error.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub pos: usize,
    pub msg: String,
}

/// Per-compilation error record shared by scanner, symbol table, parser and
/// code generator. Counts every error; records a message only when it falls
/// outside the 4-position window of the previous one and fewer than 25 have
/// been seen.
pub struct Diag {
    notes: Vec<Note>,
    err_cnt: u32,
    err_pos: i64,
    pos: usize,
}

pub type DiagRef = Rc<RefCell<Diag>>;

impl Diag {
    pub fn new() -> DiagRef {
        Rc::new(RefCell::new(Diag {
            notes: Vec::new(),
            err_cnt: 0,
            err_pos: -1,
            pos: 0,
        }))
    }

    pub fn mark_at(&mut self, pos: usize, msg: &str) {
        if pos as i64 > self.err_pos && self.err_cnt < 25 {
            self.notes.push(Note {
                pos,
                msg: msg.to_string(),
            });
        }
        self.err_cnt = (self.err_cnt + 1).min(25);
        self.err_pos = pos as i64 + 4;
    }

    pub fn mark(&mut self, msg: &str) {
        let pos = self.pos;
        self.mark_at(pos, msg);
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn err_cnt(&self) -> u32 {
        self.err_cnt
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn take_notes(&mut self) -> Vec<Note> {
        std::mem::take(&mut self.notes)
    }

    /// Writes the recorded messages in the line-oriented form expected by
    /// plain diagnostic sinks.
    pub fn write_plain(&self, w: &mut impl Write) -> io::Result<()> {
        for note in &self.notes {
            write!(w, "\n  pos {} {}", note.pos, note.msg)?;
        }
        Ok(())
    }
}

/// Pull-style lexer front end used by the parser.
pub struct Scanner<'s> {
    lex: Lexer<'s, Token>,
    pos: usize,
    diag: DiagRef,
}

impl<'s> Scanner<'s> {
    pub fn new(src: &'s str, diag: DiagRef) -> Scanner<'s> {
        Scanner {
            lex: Token::lexer(src),
            pos: 0,
            diag,
        }
    }

    /// Delivers the next symbol. Characters the language does not know are
    /// skipped without comment; end of input delivers [`Token::Eot`]
    /// indefinitely.
    pub fn get(&mut self) -> Token {
        loop {
            match self.lex.next() {
                Some(Ok(tok)) => {
                    self.pos = self.lex.span().start;
                    self.flush_pending();
                    self.diag.borrow_mut().set_pos(self.pos);
                    return tok;
                }
                Some(Err(())) => {
                    self.flush_pending();
                }
                None => {
                    self.pos = self.lex.source().len();
                    self.flush_pending();
                    self.diag.borrow_mut().set_pos(self.pos);
                    return Token::Eot;
                }
            }
        }
    }

    /// Position of the most recent symbol.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Records a compile error at the current position.
    pub fn mark(&self, msg: &str) {
        self.diag.borrow_mut().mark_at(self.pos, msg);
    }

    pub fn diag(&self) -> DiagRef {
        Rc::clone(&self.diag)
    }

    fn flush_pending(&mut self) {
        for (pos, msg) in self.lex.extras.errs.drain(..) {
            self.diag.borrow_mut().mark_at(pos, msg);
        }
    }
}

fn lex_ident(lex: &mut Lexer<Token>) -> String {
    let s = lex.slice();
    let end = s.len().min(ID_LEN);
    s[..end].to_string()
}

/// Digit values of a numeric literal, suffix stripped. Mirrors the rolling
/// 16-digit buffer of the original scanner: overlong literals are reported
/// and restart the buffer.
fn digit_values(lex: &mut Lexer<Token>, suffix: usize) -> Vec<i64> {
    let bytes = lex.slice().as_bytes();
    let bytes = bytes[..bytes.len() - suffix].to_vec();
    let mut d = Vec::new();
    let mut overlong = false;
    for b in bytes {
        let v = if b.is_ascii_digit() {
            (b - b'0') as i64
        } else {
            (b - b'A' + 10) as i64
        };
        if d.len() < MAX_DIGITS {
            d.push(v);
        } else {
            overlong = true;
            d.clear();
        }
    }
    if overlong {
        lex.extras.errs.push((lex.span().start, "too many digits"));
    }
    d
}

fn decimal_value(lex: &mut Lexer<Token>, d: &[i64]) -> i32 {
    const MAX: i64 = i32::MAX as i64;
    let mut k: i64 = 0;
    for &v in d {
        if v < 10 {
            if k <= (MAX - v) / 10 {
                k = k * 10 + v;
            } else {
                lex.extras.errs.push((lex.span().start, "too large"));
                k = 0;
            }
        } else {
            lex.extras.errs.push((lex.span().start, "bad integer"));
        }
    }
    k as i32
}

fn hex_value(d: &[i64]) -> i64 {
    let mut k: i64 = 0;
    for &v in d {
        k = k.wrapping_mul(0x10).wrapping_add(v);
    }
    k
}

fn lex_int(lex: &mut Lexer<Token>) -> i32 {
    let d = digit_values(lex, 0);
    decimal_value(lex, &d)
}

fn lex_hex(lex: &mut Lexer<Token>) -> i32 {
    let d = digit_values(lex, 1);
    hex_value(&d) as i32
}

fn lex_char(lex: &mut Lexer<Token>) -> u8 {
    let d = digit_values(lex, 1);
    let k = hex_value(&d);
    if (0..0x100).contains(&k) {
        k as u8
    } else {
        lex.extras.errs.push((lex.span().start, "illegal value"));
        0
    }
}

fn lex_real_bits(lex: &mut Lexer<Token>) -> f32 {
    let d = digit_values(lex, 1);
    f32::from_bits(hex_value(&d) as u32)
}

/// 10^e computed by repeated squaring, in single precision like everything
/// else about real literals.
fn ten(mut e: i32) -> f32 {
    let mut x = 1.0f32;
    let mut t = 10.0f32;
    while e > 0 {
        if e % 2 != 0 {
            x = t * x;
        }
        t = t * t;
        e /= 2;
    }
    x
}

fn lex_real(lex: &mut Lexer<Token>) -> f32 {
    let s = lex.slice();
    let (mantissa, scale) = match s.find(|c| c == 'E' || c == 'D') {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some(parts) => parts,
        None => (mantissa, ""),
    };
    let mut x = 0.0f32;
    for b in int_part.bytes() {
        x = x * 10.0 + (b - b'0') as f32;
    }
    let mut e: i32 = 0;
    for b in frac_part.bytes() {
        x = x * 10.0 + (b - b'0') as f32;
        e -= 1;
    }
    if let Some(scale) = scale {
        let (neg, digits) = match scale.as_bytes()[0] {
            b'-' => (true, &scale[1..]),
            b'+' => (false, &scale[1..]),
            _ => (false, scale),
        };
        let mut sf: i32 = 0;
        for b in digits.bytes() {
            sf = sf.saturating_mul(10).saturating_add((b - b'0') as i32);
        }
        if neg {
            e -= sf;
        } else {
            e += sf;
        }
    }
    if e < 0 {
        if e >= -MAX_EXP {
            x / ten(-e)
        } else {
            0.0
        }
    } else if e > 0 {
        if e <= MAX_EXP {
            ten(e) * x
        } else {
            lex.extras.errs.push((lex.span().start, "too large"));
            0.0
        }
    } else {
        x
    }
}

fn lex_string(lex: &mut Lexer<Token>) -> Vec<u8> {
    let raw = lex.slice().as_bytes();
    let mut buf = Vec::new();
    let mut overflow = false;
    for &b in &raw[1..raw.len() - 1] {
        if b >= 0x20 {
            if buf.len() < STRING_BUF_SIZE - 1 {
                buf.push(b);
            } else {
                overflow = true;
            }
        }
    }
    if overflow {
        lex.extras.errs.push((lex.span().start, "string too long"));
    }
    buf.push(0);
    buf
}

fn hex_digit_value(lex: &mut Lexer<Token>, pos: usize, b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'A'..=b'F' => b - b'A' + 10,
        _ => {
            lex.extras.errs.push((pos, "hexdig expected"));
            0
        }
    }
}

/// `$ … $` strings: pairs of hex digits separated by whitespace, no NUL
/// appended.
fn lex_hex_string(lex: &mut Lexer<Token>) -> Vec<u8> {
    let rem = lex.remainder().as_bytes().to_vec();
    let start = lex.span().end;
    let mut buf = Vec::new();
    let mut i = 0;
    let mut overflow = false;
    loop {
        while i < rem.len() && rem[i] <= b' ' {
            i += 1;
        }
        if i >= rem.len() || rem[i] == b'$' {
            break;
        }
        let m = hex_digit_value(lex, start + i, rem[i]);
        i += 1;
        let n = if i < rem.len() && rem[i] != b'$' {
            let v = hex_digit_value(lex, start + i, rem[i]);
            i += 1;
            v
        } else {
            lex.extras.errs.push((start + i, "hexdig expected"));
            0
        };
        if buf.len() < STRING_BUF_SIZE {
            buf.push(m * 0x10 + n);
        } else {
            overflow = true;
        }
    }
    if overflow {
        lex.extras.errs.push((lex.span().start, "string too long"));
    }
    if i < rem.len() {
        i += 1; // closing '$'
    }
    lex.bump(i);
    buf
}

fn lex_comment(lex: &mut Lexer<Token>) -> Skip {
    let rem = lex.remainder().as_bytes();
    let mut depth = 1;
    let mut i = 0;
    while i < rem.len() && depth > 0 {
        if rem[i] == b'(' && rem.get(i + 1) == Some(&b'*') {
            depth += 1;
            i += 2;
        } else if rem[i] == b'*' && rem.get(i + 1) == Some(&b')') {
            depth -= 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    if depth > 0 {
        lex.extras
            .errs
            .push((lex.span().start, "unterminated comment"));
    }
    lex.bump(i);
    Skip
}
