use bbc_basic_runtime::executor::{Host, Interpreter, InterpreterConfig, Outcome};
use bbc_basic_runtime::os::ScriptedKeyboard;
use bbc_basic_runtime::{ErrorKind, Result};

/// Load and run a program, keeping the interpreter for inspection
fn run(source: &str) -> (Interpreter, Result<Outcome>) {
    let mut interp = Interpreter::in_memory().unwrap();
    interp.load_program(source).unwrap();
    let outcome = interp.run_program();
    (interp, outcome)
}

/// Everything a program printed, which must finish normally
fn output(source: &str) -> String {
    let (mut interp, outcome) = run(source);
    assert_eq!(outcome.unwrap(), Outcome::Finished);
    interp.take_output()
}

#[test]
fn test_print_expression() {
    let (mut interp, outcome) = run("10 PRINT 3+4*2");
    assert_eq!(outcome.unwrap(), Outcome::Finished);
    // numbers fill the default ten character field
    assert_eq!(interp.take_output(), "        11\n");
    assert!(interp.stack().is_empty());
    assert_eq!(output("10 PRINT ;3+4*2"), "11\n");
}

#[test]
fn test_for_loop_prints_on_one_line() {
    assert_eq!(
        output("10 FOR I=1 TO 3:PRINT I;:NEXT"),
        "         1         2         3"
    );
    assert_eq!(output("10 FOR I=1 TO 3:PRINT \" \";I;:NEXT:PRINT"), " 1 2 3\n");
}

#[test]
fn test_general_format_with_nine_digits() {
    assert_eq!(output("10 @%=&0000090A:PRINT PI"), "3.14159265\n");
}

#[test]
fn test_exponent_format() {
    assert_eq!(output("10 @%=&0001000A:PRINT 1E-5"), "1.000000000E-5\n");
    assert_eq!(output("10 @%=&01020A:PRINT 1E-5"), "    1.0E-5\n");
    // the same @% and value always give the same text
    let first = output("10 @%=&01020A:PRINT 1E-5");
    assert_eq!(first, output("10 @%=&01020A:PRINT 1E-5"));
}

#[test]
fn test_return_parameter() {
    assert_eq!(
        output("10 DEF PROCp(RETURN n):n=n*2:ENDPROC\n20 x=21:PROCp(x):PRINT x"),
        "        42\n"
    );
}

#[test]
fn test_on_error_handles_division_by_zero() {
    let (mut interp, outcome) = run("10 ON ERROR PRINT \"oops\":END\n20 PRINT 1/0");
    assert_eq!(outcome.unwrap(), Outcome::Finished);
    assert_eq!(interp.take_output(), "oops\n");
    let last = interp.last_error().unwrap();
    assert_eq!(last.kind, ErrorKind::DivZero);
    assert_eq!(last.line, Some(20));
}

#[test]
fn test_two_dimensional_array() {
    assert_eq!(
        output("10 DIM a(2,2):a(1,1)=7:PRINT a(1,1)\n20 PRINT ;DIM(a());DIM(a(),2)"),
        "         7\n23\n"
    );
}

#[test]
fn test_untrapped_error_reports_its_line() {
    let (_, outcome) = run("10 x = 1\n20 y = x / 0\n30 PRINT y");
    let err = outcome.unwrap_err();
    assert_eq!(err.kind, ErrorKind::DivZero);
    assert_eq!(err.number(), 18);
    assert_eq!(err.report(), "Division by zero at line 20");
}

#[test]
fn test_err_and_erl_in_handler() {
    let out = output(
        "10 ON ERROR PRINT ;ERR;\" \";ERL;\" \";REPORT$: END\n\
         20 FOR i% = 1 TO 3\n\
         30   REPEAT\n\
         40     a$ = STRING$(3, \"x\") + CHR$(1/0)\n\
         50   UNTIL TRUE\n\
         60 NEXT",
    );
    assert_eq!(out, "18 40 Division by zero\n");
}

#[test]
fn test_stop_and_quit_outcomes() {
    let (mut interp, outcome) = run("10 PRINT \"a\"\n20 STOP\n30 PRINT \"b\"");
    assert_eq!(outcome.unwrap(), Outcome::Stopped { line: 20 });
    assert_eq!(interp.take_output(), "a\n");

    let (_, outcome) = run("10 ON ERROR PRINT \"never\"\n20 QUIT 3");
    assert_eq!(outcome.unwrap(), Outcome::Quit(3));
}

#[test]
fn test_string_handling() {
    let out = output(
        "10 s$ = \"The quick brown fox\"\n\
         20 PRINT LEFT$(s$, 3);\"|\";MID$(s$, 5, 5);\"|\";RIGHT$(s$, 3)\n\
         30 PRINT ;LEN(s$);\" \";INSTR(s$, \"brown\");\" \";ASC(s$)\n\
         40 r$ = \"\": FOR i% = LEN(s$) TO 1 STEP -1: r$ += MID$(s$, i%, 1): NEXT\n\
         50 PRINT r$",
    );
    assert_eq!(out, "The|quick|fox\n19 11 84\nxof nworb kciuq ehT\n");
}

#[test]
fn test_recursive_functions_and_locals() {
    let out = output(
        "10 PRINT ;FNfib(15);\" \";FNgcd(1071, 462)\n\
         20 END\n\
         30 DEF FNfib(n%)\n\
         40 IF n% < 2 THEN = n%\n\
         50 = FNfib(n% - 1) + FNfib(n% - 2)\n\
         60 DEF FNgcd(a%, b%)\n\
         70 LOCAL t%\n\
         80 WHILE b% <> 0: t% = b%: b% = a% MOD b%: a% = t%: ENDWHILE\n\
         90 = a%",
    );
    assert_eq!(out, "610 21\n");
}

#[test]
fn test_bubble_sort() {
    let out = output(
        "10 DIM v%(7)\n\
         20 FOR i% = 0 TO 7: READ v%(i%): NEXT\n\
         30 REPEAT\n\
         40   swapped% = FALSE\n\
         50   FOR i% = 0 TO 6\n\
         60     IF v%(i%) > v%(i% + 1) THEN SWAP v%(i%), v%(i% + 1): swapped% = TRUE\n\
         70   NEXT\n\
         80 UNTIL NOT swapped%\n\
         90 FOR i% = 0 TO 7: PRINT ;v%(i%);\" \";: NEXT: PRINT\n\
         100 DATA 5, 3, 8, 1, 9, 2, 7, 4",
    );
    assert_eq!(out, "1 2 3 4 5 7 8 9 \n");
}

#[test]
fn test_gosub_with_computed_on() {
    let out = output(
        "10 FOR k% = 1 TO 3\n\
         20   ON k% GOSUB 100, 200, 300\n\
         30 NEXT\n\
         40 END\n\
         100 PRINT \"one\": RETURN\n\
         200 PRINT \"two\": RETURN\n\
         300 PRINT \"three\": RETURN",
    );
    assert_eq!(out, "one\ntwo\nthree\n");
}

#[test]
fn test_local_error_handler_inside_procedure() {
    let out = output(
        "10 ON ERROR PRINT \"global \";REPORT$: END\n\
         20 PROCsafe(0): PROCsafe(4)\n\
         30 ERROR 100, \"boom\"\n\
         40 DEF PROCsafe(d)\n\
         50 LOCAL ERROR\n\
         60 ON ERROR LOCAL PRINT \"handled\": ENDPROC\n\
         70 PRINT ;8 / d\n\
         80 ENDPROC",
    );
    assert_eq!(out, "handled\n2\nglobal boom\n");
}

#[test]
fn test_input_reads_scripted_replies() {
    let config = InterpreterConfig::default();
    let keyboard = ScriptedKeyboard::with_lines(["3", "4"]);
    let mut interp = Interpreter::new(config.clone(), Host::with_input(&config, keyboard)).unwrap();
    interp
        .load_program("10 INPUT \"a\" a, \"b\" b\n20 PRINT ;\"sum \";a + b")
        .unwrap();
    assert_eq!(interp.run_program().unwrap(), Outcome::Finished);
    assert_eq!(interp.take_output(), "absum 7\n");
}

#[test]
fn test_immediate_lines_edit_the_program() {
    let mut interp = Interpreter::in_memory().unwrap();
    interp.exec_thisline("20 PRINT \"second\"").unwrap();
    interp.exec_thisline("10 PRINT \"first\"").unwrap();
    interp.exec_thisline("30 PRINT \"gone\"").unwrap();
    interp.exec_thisline("30").unwrap();
    assert_eq!(interp.run_program().unwrap(), Outcome::Finished);
    assert_eq!(interp.take_output(), "first\nsecond\n");

    // variables survive between immediate lines until the next RUN
    interp.exec_thisline("total% = 5").unwrap();
    interp.exec_thisline("total% += 2: PRINT ;total%").unwrap();
    assert_eq!(interp.take_output(), "7\n");
}

#[test]
fn test_clear_releases_everything() {
    let mut interp = Interpreter::in_memory().unwrap();
    interp
        .exec_thisline("a$ = \"one\": b$ = a$ + \"two\": DIM s$(3): s$(1) = b$")
        .unwrap();
    assert!(interp.strings().live_count() > 0);
    interp.exec_thisline("CLEAR").unwrap();
    assert_eq!(interp.strings().live_count(), 0);
    let err = interp.exec_thisline("PRINT a$").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoSuchVar);
}

#[test]
fn test_integer_overflow_widens() {
    assert_eq!(
        output("10 a% = &7FFFFFFF\n20 PRINT ;a% + 1;\" \";a% * a%"),
        "2147483648 4611686014132420609\n"
    );
}
