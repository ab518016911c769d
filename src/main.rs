use bbc_basic_runtime::{
    executor::{Host, Interpreter, InterpreterConfig, Outcome},
    filesystem::MemoryFiles,
    os::{EscapeFlag, StdinKeyboard},
    screen::StdoutScreen,
    sound::NullSound,
    BasicError, ProgramStore,
};
use log::warn;
use std::io::{self, Write};
use std::path::PathBuf;

fn main() {
    let mut config = InterpreterConfig::default();
    let mut program_path = None;
    for arg in std::env::args().skip(1) {
        match arg.strip_prefix("--workspace=") {
            Some(size) => match size.parse() {
                Ok(bytes) => config.workspace_size = bytes,
                Err(_) => {
                    eprintln!("Bad workspace size: {}", size);
                    std::process::exit(2);
                }
            },
            None => program_path = Some(arg),
        }
    }

    let escape = EscapeFlag::new();
    let handler_flag = escape.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.raise()) {
        warn!("Escape key handler not installed: {}", e);
    }

    let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut files = MemoryFiles::with_root(root);
    files.set_bput_newline(config.bput_trailing_newline);
    let host = Host::new(
        Box::new(StdoutScreen::new()),
        Box::new(StdinKeyboard::new(escape)),
        Box::new(files),
        Box::new(NullSound::new()),
    );
    let mut interp = match Interpreter::new(config, host) {
        Ok(interp) => interp,
        Err(e) => {
            eprintln!("Cannot start: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = program_path {
        let code = match load_file(&mut interp, &path).and_then(|()| interp.run_program()) {
            Ok(Outcome::Quit(code)) => code,
            Ok(_) => 0,
            Err(e) => {
                report(&e);
                1
            }
        };
        std::process::exit(code);
    }

    println!("BBC BASIC Runtime v0.1.0");
    println!("Type 'QUIT' to leave, 'HELP' for help\n");

    let stdin = io::stdin();
    let mut line_buffer = String::new();
    loop {
        print!(">");
        if io::stdout().flush().is_err() {
            break;
        }

        line_buffer.clear();
        match stdin.read_line(&mut line_buffer) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line_buffer.trim();
        if input.is_empty() {
            continue;
        }

        let command = input.to_ascii_uppercase();
        let result = if command == "HELP" {
            print_help();
            Ok(Outcome::Finished)
        } else if command == "RUN" {
            interp.run_program()
        } else if command == "NEW" {
            interp.load_store(&ProgramStore::new()).map(|()| Outcome::Finished)
        } else if let Some(name) = command.strip_prefix("LOAD") {
            let name = input[input.len() - name.len()..].trim().trim_matches('"');
            load_file(&mut interp, name).map(|()| Outcome::Finished)
        } else {
            interp.exec_thisline(input)
        };

        match result {
            Ok(Outcome::Quit(code)) => std::process::exit(code),
            Ok(Outcome::Stopped { line }) => println!("\nSTOP at line {}", line),
            Ok(Outcome::Finished) => {}
            Err(e) => report(&e),
        }
    }
}

fn load_file(interp: &mut Interpreter, path: &str) -> Result<(), BasicError> {
    let text = std::fs::read_to_string(path)
        .map_err(|_| BasicError::new(bbc_basic_runtime::ErrorKind::FileNotFound))?;
    interp.load_program(&text)
}

fn report(error: &BasicError) {
    println!("\n{}", error.report());
}

fn print_help() {
    println!("Commands:");
    println!("  10 PRINT \"HELLO\"   - Store a program line (a bare number deletes it)");
    println!("  RUN                - Run the stored program");
    println!("  NEW                - Forget the program");
    println!("  LOAD \"file\"        - Load a program from a text file");
    println!("  QUIT               - Leave");
    println!();
    println!("Any other line is executed at once, e.g. PRINT 6*7");
}
