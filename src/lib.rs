//! BBC BASIC Runtime
//!
//! The execution core of a tokenised BBC BASIC interpreter: a single flat
//! workspace holding the program, variable heap and control stack, a string
//! heap, an expression evaluator and the statement machinery for loops,
//! procedures, functions and error recovery.

pub mod executor;
pub mod filesystem;
pub mod format;
pub mod lvalue;
pub mod memory;
pub mod os;
pub mod program;
pub mod screen;
pub mod sound;
pub mod stack;
pub mod strings;
pub mod tokenizer;
pub mod variables;

// Re-export core types for convenience
pub use crate::error::{BasicError, ErrorKind, Result};
pub use executor::{Host, Interpreter, InterpreterConfig, Outcome};
pub use memory::Workspace;
pub use program::ProgramStore;
pub use strings::{StringDesc, StringHeap};
pub use tokenizer::TokenizedLine;
pub use variables::{VarType, VariableStore};

/// Core error handling types for the BASIC runtime
pub mod error {
    use thiserror::Error;

    /// Result type for runtime operations
    pub type Result<T> = std::result::Result<T, BasicError>;

    /// Every condition the runtime can raise, trappable or not
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum ErrorKind {
        #[error("No room")]
        NoRoom,
        #[error("Missing {0}")]
        Missing(char),
        #[error("Type mismatch")]
        TypeMismatch,
        #[error("Type mismatch: number wanted")]
        NumberWanted,
        #[error("Type mismatch: string wanted")]
        StringWanted,
        #[error("Number too big")]
        NumRange,
        #[error("Log range")]
        LogRange,
        #[error("-ve root")]
        NegRoot,
        #[error("Division by zero")]
        DivZero,
        #[error("String too long")]
        StringLen,
        #[error("Bad DIM statement")]
        ArrayDim,
        #[error("Subscript out of range")]
        Subscript,
        #[error("Syntax error")]
        Syntax,
        #[error("No such variable")]
        NoSuchVar,
        #[error("No such FN/PROC")]
        NoSuchProc,
        #[error("Incorrect number of arguments")]
        Arguments,
        #[error("Bad call")]
        BadCall,
        #[error("No {0}")]
        NoMatching(&'static str),
        #[error("Not in a procedure")]
        NotInProc,
        #[error("Not in a function")]
        NotInFn,
        #[error("Stack full")]
        StackFull,
        #[error("No such line")]
        LineMiss,
        #[error("Line number out of range")]
        LineNo,
        #[error("ON range")]
        OnRange,
        #[error("Out of DATA")]
        OutOfData,
        #[error("Address out of range")]
        BadAddress,
        #[error("Bad program")]
        BadProg,
        #[error("Channel")]
        Channel,
        #[error("File or path not found")]
        FileNotFound,
        #[error("Cannot use this command in a program")]
        Command,
        #[error("{0} is not supported")]
        Unsupported(&'static str),
        #[error("Escape")]
        Escape,
        #[error("Internal error: {0}")]
        Broken(&'static str),
        #[error("{message}")]
        User { number: i32, message: String },
        #[error("END")]
        End,
        #[error("STOP")]
        Stop,
        #[error("QUIT")]
        Quit(i32),
    }

    impl ErrorKind {
        /// BBC-style error number reported through `ERR`
        pub fn number(&self) -> i32 {
            match self {
                ErrorKind::NoRoom => 0,
                ErrorKind::Missing(_) => 27,
                ErrorKind::TypeMismatch | ErrorKind::NumberWanted | ErrorKind::StringWanted => 6,
                ErrorKind::NumRange => 20,
                ErrorKind::LogRange => 22,
                ErrorKind::NegRoot => 21,
                ErrorKind::DivZero => 18,
                ErrorKind::StringLen => 19,
                ErrorKind::ArrayDim => 10,
                ErrorKind::Subscript => 15,
                ErrorKind::Syntax => 16,
                ErrorKind::NoSuchVar => 26,
                ErrorKind::NoSuchProc => 29,
                ErrorKind::Arguments => 31,
                ErrorKind::BadCall => 30,
                ErrorKind::NoMatching(what) => match *what {
                    "FOR" => 32,
                    "GOSUB" => 38,
                    "REPEAT" => 43,
                    "WHILE" => 46,
                    _ => 47,
                },
                ErrorKind::NotInProc => 13,
                ErrorKind::NotInFn => 7,
                ErrorKind::StackFull => 44,
                ErrorKind::LineMiss => 41,
                ErrorKind::LineNo => 45,
                ErrorKind::OnRange => 40,
                ErrorKind::OutOfData => 42,
                ErrorKind::BadAddress => 8,
                ErrorKind::BadProg => 48,
                ErrorKind::Channel => 222,
                ErrorKind::FileNotFound => 214,
                ErrorKind::Command => 49,
                ErrorKind::Unsupported(_) => 254,
                ErrorKind::Escape => 17,
                ErrorKind::Broken(_) => 255,
                ErrorKind::User { number, .. } => *number,
                ErrorKind::End | ErrorKind::Stop | ErrorKind::Quit(_) => 0,
            }
        }

        /// `END`, `STOP` and `QUIT` travel the error channel but are never trapped
        pub fn is_trappable(&self) -> bool {
            !matches!(
                self,
                ErrorKind::End | ErrorKind::Stop | ErrorKind::Quit(_) | ErrorKind::Broken(_)
            )
        }
    }

    /// An error together with the line it was raised on
    #[derive(Debug, Clone, PartialEq, Error)]
    #[error("{kind}")]
    pub struct BasicError {
        pub kind: ErrorKind,
        /// Recorded by the innermost statement loop that catches the error
        pub line: Option<u32>,
    }

    impl BasicError {
        pub fn new(kind: ErrorKind) -> Self {
            Self { kind, line: None }
        }

        pub fn number(&self) -> i32 {
            self.kind.number()
        }

        pub fn is_trappable(&self) -> bool {
            self.kind.is_trappable()
        }

        /// The text `REPORT` prints, followed by the line when known
        pub fn report(&self) -> String {
            match self.line {
                Some(line) if line > 0 => format!("{} at line {}", self.kind, line),
                _ => self.kind.to_string(),
            }
        }
    }

    impl From<ErrorKind> for BasicError {
        fn from(kind: ErrorKind) -> Self {
            BasicError::new(kind)
        }
    }

}
