use bbc_basic_runtime::executor::{Host, Interpreter, InterpreterConfig};
use bbc_basic_runtime::filesystem::MemoryFiles;
use bbc_basic_runtime::os::ScriptedKeyboard;
use bbc_basic_runtime::screen::{BufferScreen, GraphicsOp, ModeDesc};
use bbc_basic_runtime::sound::NullSound;
use bbc_basic_runtime::ErrorKind;
use std::cell::RefCell;
use std::rc::Rc;

/// Interpreter drawing to a screen the test can still look at
fn interpreter() -> (Interpreter, Rc<RefCell<BufferScreen>>) {
    let screen = Rc::new(RefCell::new(BufferScreen::new()));
    let host = Host::new(
        Box::new(screen.clone()),
        Box::new(ScriptedKeyboard::new()),
        Box::new(MemoryFiles::new()),
        Box::new(NullSound::new()),
    );
    let interp = Interpreter::new(InterpreterConfig::default(), host).unwrap();
    (interp, screen)
}

/// Helper to execute a BBC BASIC line
fn execute_line(interp: &mut Interpreter, line: &str) {
    interp.exec_thisline(line).unwrap();
}

fn graphics(screen: &Rc<RefCell<BufferScreen>>) -> Vec<GraphicsOp> {
    screen.borrow().graphics.clone()
}

#[test]
fn test_move_and_draw() {
    let (mut interp, screen) = interpreter();

    execute_line(&mut interp, "MOVE 100, 200");
    execute_line(&mut interp, "DRAW 300, 400");

    assert_eq!(
        graphics(&screen),
        vec![
            GraphicsOp::Plot { code: 4, x: 100, y: 200 },
            GraphicsOp::Plot { code: 5, x: 300, y: 400 },
        ]
    );
}

#[test]
fn test_plot_modes() {
    let (mut interp, screen) = interpreter();

    // PLOT 4 = MOVE, PLOT 5 = DRAW, anything else passes straight through
    execute_line(&mut interp, "PLOT 4, 100, 100");
    execute_line(&mut interp, "PLOT 85, 200, 200");

    assert_eq!(
        graphics(&screen),
        vec![
            GraphicsOp::Plot { code: 4, x: 100, y: 100 },
            GraphicsOp::Plot { code: 85, x: 200, y: 200 },
        ]
    );
}

#[test]
fn test_coordinates_are_truncated_expressions() {
    let (mut interp, screen) = interpreter();

    execute_line(&mut interp, "cx% = 640: r = 99.6");
    execute_line(&mut interp, "CIRCLE cx%, cx% DIV 2, r");

    assert_eq!(
        graphics(&screen),
        vec![GraphicsOp::Circle { x: 640, y: 320, radius: 99, filled: false }]
    );
}

#[test]
fn test_gcol_command() {
    let (mut interp, screen) = interpreter();

    execute_line(&mut interp, "GCOL 0, 255");
    execute_line(&mut interp, "GCOL 3");
    execute_line(&mut interp, "COLOUR 129");

    assert_eq!(
        graphics(&screen),
        vec![
            GraphicsOp::Colour { graphics: true, action: 0, colour: 255 },
            GraphicsOp::Colour { graphics: true, action: 0, colour: 3 },
            GraphicsOp::Colour { graphics: false, action: 0, colour: 129 },
        ]
    );
}

#[test]
fn test_filled_shapes() {
    let (mut interp, screen) = interpreter();

    execute_line(&mut interp, "ELLIPSE FILL 500, 500, 150, 100");
    execute_line(&mut interp, "RECTANGLE FILL 300, 300, 200, 150");
    execute_line(&mut interp, "CIRCLE FILL 10, 20, 30");

    assert_eq!(
        graphics(&screen),
        vec![
            GraphicsOp::Ellipse { x: 500, y: 500, a: 150, b: 100, filled: true },
            GraphicsOp::Rectangle { x: 300, y: 300, width: 200, height: 150, filled: true },
            GraphicsOp::Circle { x: 10, y: 20, radius: 30, filled: true },
        ]
    );
}

#[test]
fn test_rectangle_with_one_side_is_square() {
    let (mut interp, screen) = interpreter();

    execute_line(&mut interp, "RECTANGLE 300, 300, 0");

    assert_eq!(
        graphics(&screen),
        vec![GraphicsOp::Rectangle { x: 300, y: 300, width: 0, height: 0, filled: false }]
    );
}

#[test]
fn test_mode_forms() {
    let (mut interp, screen) = interpreter();

    execute_line(&mut interp, "MODE 7");
    execute_line(&mut interp, "MODE 640, 480, 8");
    execute_line(&mut interp, "MODE 800, 600, 32, 60");
    execute_line(&mut interp, "MODE 640, 512, 16, 0, 1, 1, 60");

    assert_eq!(
        graphics(&screen),
        vec![
            GraphicsOp::Mode(7),
            GraphicsOp::NewMode { width: 640, height: 480, bpp: 8, rate: 0 },
            GraphicsOp::NewMode { width: 800, height: 600, bpp: 32, rate: 60 },
            GraphicsOp::Described(ModeDesc {
                width: 640,
                height: 512,
                colours: 16,
                greys: 0,
                xeig: 1,
                yeig: 1,
                rate: 60,
            }),
        ]
    );
}

#[test]
fn test_shapes_in_a_program() {
    let (mut interp, screen) = interpreter();

    interp
        .load_program(
            "10 CLG: ORIGIN 100, 100\n\
             20 FOR i% = 1 TO 3\n\
             30   CIRCLE i% * 100, 0, i% * 10\n\
             40 NEXT",
        )
        .unwrap();
    interp.run_program().unwrap();

    assert_eq!(
        graphics(&screen),
        vec![
            GraphicsOp::Clear,
            GraphicsOp::Origin { x: 100, y: 100 },
            GraphicsOp::Circle { x: 100, y: 0, radius: 10, filled: false },
            GraphicsOp::Circle { x: 200, y: 0, radius: 20, filled: false },
            GraphicsOp::Circle { x: 300, y: 0, radius: 30, filled: false },
        ]
    );
}

#[test]
fn test_wrong_argument_counts() {
    let (mut interp, screen) = interpreter();

    let err = interp.exec_thisline("ELLIPSE 1, 2, 3").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Arguments);
    let err = interp.exec_thisline("MOVE 1").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Arguments);
    let err = interp.exec_thisline("COLOUR 1, 2, 3, 4").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unsupported("COLOUR palette"));

    assert!(graphics(&screen).is_empty());
}
