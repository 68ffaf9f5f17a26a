use std::path::Path;

use pretty_assertions::assert_eq;

use super::*;

fn compile_in(dir: &Path, src: &str) -> Outcome {
    compile(
        src,
        &Options {
            new_sym_file: false,
            dir: dir.to_path_buf(),
        },
    )
    .unwrap()
}

fn compile_ok(src: &str) -> Outcome {
    let dir = tempfile::tempdir().unwrap();
    let out = compile_in(dir.path(), src);
    assert_eq!(out.err_cnt, 0, "unexpected errors: {:?}", out.notes);
    out
}

fn notes_of(src: &str) -> Vec<String> {
    let dir = tempfile::tempdir().unwrap();
    let out = compile_in(dir.path(), src);
    assert!(out.err_cnt > 0, "expected errors");
    out.notes.into_iter().map(|n| n.msg).collect()
}

#[test]
fn empty_module() {
    let dir = tempfile::tempdir().unwrap();
    let out = compile_in(dir.path(), "MODULE M; END M.");
    assert_eq!(out.err_cnt, 0);
    // two words of entry code, three of exit code
    assert_eq!(out.pc, 5);
    assert!(out.sym_file_written);
    assert!(dir.path().join("M.rsc").exists());
    // header, version byte, terminator, padded to a word boundary
    let smb = std::fs::read(dir.path().join("M.smb")).unwrap();
    assert_eq!(smb.len(), 12);
}

#[test]
fn outputs_are_deterministic() {
    let src = "MODULE M; VAR x*: INTEGER; PROCEDURE P*; BEGIN x := 1 END P; END M.";
    let dir = tempfile::tempdir().unwrap();
    compile_in(dir.path(), src);
    let rsc1 = std::fs::read(dir.path().join("M.rsc")).unwrap();
    let smb1 = std::fs::read(dir.path().join("M.smb")).unwrap();
    let out = compile_in(dir.path(), src);
    assert_eq!(out.err_cnt, 0);
    // the unchanged key leaves the symbol file alone
    assert!(!out.sym_file_written);
    assert_eq!(std::fs::read(dir.path().join("M.rsc")).unwrap(), rsc1);
    assert_eq!(std::fs::read(dir.path().join("M.smb")).unwrap(), smb1);
}

#[test]
fn no_output_files_on_errors() {
    let dir = tempfile::tempdir().unwrap();
    let out = compile_in(dir.path(), "MODULE M; BEGIN x := 1 END M.");
    assert!(out.err_cnt > 0);
    assert!(!dir.path().join("M.smb").exists());
    assert!(!dir.path().join("M.rsc").exists());
}

#[test]
fn module_trailer_is_checked() {
    assert!(notes_of("MODULE M; END N.").contains(&"no match".to_string()));
    assert!(notes_of("BEGIN END.").contains(&"must start with MODULE".to_string()));
}

#[test]
fn exported_constant_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let out = compile_in(dir.path(), "MODULE M; CONST K* = 42; END M.");
    assert_eq!(out.err_cnt, 0);
    // the imported constant is usable where a constant is required
    let out = compile_in(
        dir.path(),
        "MODULE N; IMPORT M; VAR a: ARRAY M.K OF INTEGER; END N.",
    );
    assert_eq!(out.err_cnt, 0, "{:?}", out.notes);
    assert_eq!(out.dc, 42 * 4);
}

#[test]
fn division_semantics_are_floored() {
    // (-15) DIV 4 = -4 and (-15) MOD 4 = 1, observable through constant
    // array lengths
    let out = compile_ok(
        "MODULE M;\n\
         VAR a: ARRAY 10 + (0 - 15) DIV 4 OF INTEGER;\n\
             b: ARRAY (0 - 15) MOD 4 OF INTEGER;\n\
         END M.",
    );
    assert_eq!(out.dc, 6 * 4 + 4);
}

#[test]
fn record_declaration_builds_a_descriptor() {
    let out = compile_ok("MODULE M; TYPE R* = RECORD a*: INTEGER; b: INTEGER END; END M.");
    // 5 descriptor words: rounded size 32, empty extension chain, −1 end
    assert_eq!(out.dc, 20);
}

#[test]
fn forward_pointer_bases_are_patched() {
    compile_ok(
        "MODULE M;\n\
         TYPE P* = POINTER TO R;\n\
              R* = RECORD next: P END;\n\
         END M.",
    );
    assert!(notes_of("MODULE M; TYPE P = POINTER TO R; END M.")
        .contains(&"undefined pointer base".to_string()));
}

#[test]
fn open_array_parameters_are_bounds_checked() {
    let dir = tempfile::tempdir().unwrap();
    let src = "MODULE M;\n\
               PROCEDURE P*(VAR a: ARRAY OF INTEGER);\n\
               BEGIN a[0] := 1\n\
               END P;\n\
               END M.";
    let out = compile_in(dir.path(), src);
    assert_eq!(out.err_cnt, 0, "{:?}", out.notes);
    // a bounds trap is a BLR on carry-clear; its top byte is 0xDA
    let rsc = std::fs::read(dir.path().join("M.rsc")).unwrap();
    assert!(
        rsc.chunks(4).any(|c| c.len() == 4 && c[3] == 0xDA),
        "no bounds trap emitted"
    );
}

#[test]
fn for_by_zero_is_reported() {
    let notes = notes_of(
        "MODULE M; VAR i: INTEGER; BEGIN FOR i := 0 TO 9 BY 0 DO END END M.",
    );
    assert!(notes.contains(&"zero increment".to_string()));
}

#[test]
fn for_control_variable_is_read_only() {
    let notes = notes_of(
        "MODULE M; VAR i: INTEGER; BEGIN FOR i := 0 TO 9 DO i := 1 END END M.",
    );
    assert!(notes.contains(&"read-only".to_string()));
}

#[test]
fn extension_depth_is_limited() {
    let notes = notes_of(
        "MODULE M;\n\
         TYPE R0 = RECORD END;\n\
              R1 = RECORD (R0) END;\n\
              R2 = RECORD (R1) END;\n\
              R3 = RECORD (R2) END;\n\
              R4 = RECORD (R3) END;\n\
         END M.",
    );
    assert!(notes.contains(&"ext level too large".to_string()));
}

#[test]
fn numeric_case_is_diagnosed_and_skipped() {
    let notes = notes_of(
        "MODULE M; VAR i: INTEGER; BEGIN CASE i OF 0: i := 1 END END M.",
    );
    assert!(notes.contains(&"numeric case not implemented".to_string()));
}

#[test]
fn type_case_over_pointers() {
    compile_ok(
        "MODULE M;\n\
         TYPE R0* = RECORD END;\n\
              R1* = RECORD (R0) x: INTEGER END;\n\
              P0 = POINTER TO R0;\n\
              P1 = POINTER TO R1;\n\
         VAR p: P0; b: BOOLEAN;\n\
         BEGIN NEW(p); b := p IS P1;\n\
           IF p IS P1 THEN p(P1).x := 1 END;\n\
           CASE p OF P1: p(P1).x := 2 END\n\
         END M.",
    );
}

#[test]
fn procedures_and_calls() {
    compile_ok(
        "MODULE M;\n\
         VAR s: INTEGER;\n\
         PROCEDURE Add(x, y: INTEGER): INTEGER;\n\
         BEGIN RETURN x + y\n\
         END Add;\n\
         BEGIN s := Add(3, 4)\n\
         END M.",
    );
}

#[test]
fn nested_procedures_are_jumped_over() {
    compile_ok(
        "MODULE M;\n\
         PROCEDURE P;\n\
           VAR n: INTEGER;\n\
           PROCEDURE Q(): INTEGER;\n\
           BEGIN RETURN 1\n\
           END Q;\n\
         BEGIN n := Q()\n\
         END P;\n\
         BEGIN P\n\
         END M.",
    );
}

#[test]
fn procedure_variables() {
    compile_ok(
        "MODULE M;\n\
         TYPE F = PROCEDURE (x: INTEGER): INTEGER;\n\
         VAR f: F; r: INTEGER;\n\
         PROCEDURE Inc1(x: INTEGER): INTEGER;\n\
         BEGIN RETURN x + 1\n\
         END Inc1;\n\
         BEGIN f := Inc1; r := f(2); r := 0; IF f # NIL THEN r := f(r) END\n\
         END M.",
    );
}

#[test]
fn interrupt_procedures_return_via_rti() {
    let dir = tempfile::tempdir().unwrap();
    let src = "MODULE M; VAR n: INTEGER;\n\
               PROCEDURE* Tick; BEGIN n := n + 1 END Tick;\n\
               END M.";
    let out = compile_in(dir.path(), src);
    assert_eq!(out.err_cnt, 0, "{:?}", out.notes);
    let rsc = std::fs::read(dir.path().join("M.rsc")).unwrap();
    let rti = crate::risc::f3(crate::risc::BR, crate::risc::AL, 0x10).to_le_bytes();
    assert!(
        rsc.chunks(4).any(|c| c == rti),
        "no RTI return in the object code"
    );
}

#[test]
fn strings_and_characters() {
    compile_ok(
        "MODULE M;\n\
         CONST greeting = \"hello\";\n\
         VAR a: ARRAY 8 OF CHAR; c: CHAR;\n\
         BEGIN a := greeting; a := \"hi\"; c := \"x\"; c := 22X\n\
         END M.",
    );
    // a seven-byte literal cannot land in ARRAY 4 OF CHAR
    let notes = notes_of(
        "MODULE M; VAR a: ARRAY 4 OF CHAR; BEGIN a := \"toolong\" END M.",
    );
    assert!(notes.contains(&"string too long".to_string()));
}

#[test]
fn byte_and_integer_interchange() {
    let out = compile_ok(
        "MODULE M; VAR b: BYTE; i: INTEGER; BEGIN b := i; i := b END M.",
    );
    assert_eq!(out.dc, 8);
}

#[test]
fn sets_and_their_operators() {
    compile_ok(
        "MODULE M; VAR s, t: SET; b: BOOLEAN;\n\
         BEGIN s := {1, 3..5}; t := s + {0}; t := s * t; t := s - t; t := s / t;\n\
           b := 3 IN s; INCL(s, 7); EXCL(s, 1)\n\
         END M.",
    );
}

#[test]
fn control_flow_statements() {
    compile_ok(
        "MODULE M; VAR i, j: INTEGER; b: BOOLEAN;\n\
         BEGIN i := 0; j := 10;\n\
           WHILE i < j DO i := i + 1 ELSIF b DO j := 0 END;\n\
           REPEAT i := i - 1 UNTIL i <= 0;\n\
           IF i = 0 THEN j := 1 ELSIF i > 0 THEN j := 2 ELSE j := 3 END;\n\
           FOR i := 0 TO 9 BY 3 DO j := j + i END;\n\
           ASSERT(j >= 0)\n\
         END M.",
    );
}

#[test]
fn truncated_identifiers_share_a_name() {
    // both spellings agree on the first 32 characters
    let a = "abcdefghijklmnopqrstuvwxyz0123456789";
    let b = "abcdefghijklmnopqrstuvwxyz012345XYZ";
    let src = format!(
        "MODULE M; VAR {}: INTEGER; BEGIN {} := 0 END M.",
        a, b
    );
    compile_ok(&src);
}

#[test]
fn error_reports_are_capped() {
    let mut src = String::from("MODULE M; BEGIN ");
    for _ in 0..100 {
        src.push_str("x := ; ");
    }
    src.push_str("END M.");
    let dir = tempfile::tempdir().unwrap();
    let out = compile_in(dir.path(), &src);
    assert!(out.err_cnt > 0);
    assert!(out.err_cnt <= 25);
    assert!(out.notes.len() as u32 <= out.err_cnt);
}

#[test]
fn declaration_order_is_enforced() {
    let notes = notes_of("MODULE M; VAR x: INTEGER; TYPE T = INTEGER; END M.");
    assert!(notes.contains(&"declaration in bad order".to_string()));
}

#[test]
fn risc0_modules_have_no_symbol_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = compile_in(dir.path(), "MODULE* M; BEGIN LED(1) END M.");
    assert_eq!(out.err_cnt, 0, "{:?}", out.notes);
    assert!(!out.sym_file_written);
    assert!(!dir.path().join("M.smb").exists());
    assert!(dir.path().join("M.rsc").exists());
}

#[test]
fn system_pseudo_module() {
    compile_ok(
        "MODULE M; IMPORT SYSTEM;\n\
         VAR a, v: INTEGER;\n\
         BEGIN a := SYSTEM.ADR(v); SYSTEM.PUT(a, 1); SYSTEM.GET(a, v)\n\
         END M.",
    );
}
