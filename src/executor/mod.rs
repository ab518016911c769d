//! Statement executor
//!
//! Runs tokenised program text straight out of the workspace. `current` is
//! the address of the next token to read; each statement either advances
//! it past itself or moves it somewhere else. Loops, calls, `LOCAL` saves
//! and error handlers live as frames on the value stack. Only `FN` calls
//! recurse into a nested statement loop, so that a function can hand its
//! result back into the middle of the expression that called it.

mod assign;
mod control;
mod data;
mod devices;
mod errors;
mod expression;
mod functions;
mod print;
mod procs;
mod stackops;

pub(crate) use expression::Value;

use crate::error::{BasicError, ErrorKind, Result};
use crate::filesystem::{FileIo, MemoryFiles};
use crate::lvalue::Storage;
use crate::memory::{Workspace, DEFAULT_MARGIN, DEFAULT_WORKSPACE, SCRATCH_BASE, SCRATCH_SIZE};
use crate::os::{Keyboard, ScriptedKeyboard};
use crate::program::{self, DataCursor, ProgramStore, LINE_HEADER};
use crate::screen::{BufferScreen, Screen};
use crate::sound::{NullSound, Sound};
use crate::stack::{LocalHandler, ValueStack};
use crate::strings::StringHeap;
use crate::tokenizer::{self, TokenizedLine, *};
use crate::variables::VariableStore;
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

/// Runtime limits and behaviour switches
#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterConfig {
    /// Total workspace in bytes, including the scratch prefix below PAGE
    pub workspace_size: usize,
    /// Upper bound on string heap growth
    pub string_heap_size: usize,
    pub max_string_len: usize,
    /// Gap kept between the variable heap and the stack
    pub stack_margin: usize,
    /// `BPUT#h,s$` appends a newline unless followed by `;`
    pub bput_trailing_newline: bool,
    /// Deepest allowed nesting of `FN` calls. Each call recurses through
    /// the statement loop, so going past this raises `StackFull` even when
    /// the workspace stack still has room.
    pub max_fn_depth: usize,
}

impl InterpreterConfig {
    pub fn new() -> Self {
        Self {
            workspace_size: DEFAULT_WORKSPACE,
            string_heap_size: 1 << 20,
            max_string_len: 65535,
            stack_margin: DEFAULT_MARGIN,
            bput_trailing_newline: true,
            max_fn_depth: 128,
        }
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The devices a program talks to
pub struct Host {
    pub screen: Box<dyn Screen>,
    pub keyboard: Box<dyn Keyboard>,
    pub files: Box<dyn FileIo>,
    pub sound: Box<dyn Sound>,
}

impl Host {
    pub fn new(
        screen: Box<dyn Screen>,
        keyboard: Box<dyn Keyboard>,
        files: Box<dyn FileIo>,
        sound: Box<dyn Sound>,
    ) -> Self {
        Self {
            screen,
            keyboard,
            files,
            sound,
        }
    }

    /// Captured screen, no keyboard input, files in memory, silent sound
    pub fn in_memory(config: &InterpreterConfig) -> Self {
        Self::with_input(config, ScriptedKeyboard::new())
    }

    /// As `in_memory`, reading keys and lines from `keyboard`
    pub fn with_input(config: &InterpreterConfig, keyboard: ScriptedKeyboard) -> Self {
        let mut files = MemoryFiles::new();
        files.set_bput_newline(config.bput_trailing_newline);
        Self::new(
            Box::new(BufferScreen::new()),
            Box::new(keyboard),
            Box::new(files),
            Box::new(NullSound::new()),
        )
    }
}

/// How a run ended when it did not end in an untrapped error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `END`, or execution ran off the end of the program
    Finished,
    Stopped { line: u32 },
    Quit(i32),
}

/// What a statement left for the statement loop to do
#[derive(Debug)]
enum Flow {
    /// The statement ended normally; a separator must follow
    Continue,
    /// `current` was moved to the start of a statement
    Moved,
    /// `=` ended a function body
    Return(Value),
}

/// The BBC BASIC runtime
pub struct Interpreter {
    config: InterpreterConfig,
    ws: Workspace,
    strings: StringHeap,
    vars: VariableStore,
    stack: ValueStack,
    host: Host,
    /// Address of the next token
    current: usize,
    /// Frame index of the operator stack of the expression being evaluated
    opstack: Option<usize>,
    /// Address of the `ON ERROR` statements
    error_handler: Option<usize>,
    local_handler: Option<LocalHandler>,
    last_error: Option<BasicError>,
    data_cursor: DataCursor,
    /// Innermost `GOSUB` frame
    gosub_chain: Option<usize>,
    /// Innermost `PROC` or `FN` frame
    call_chain: Option<usize>,
    fn_depth: usize,
    defs_scanned: bool,
    rng: StdRng,
    last_rnd: f64,
    time_base: Instant,
    /// Next free byte of the `EVAL` area
    eval_top: usize,
}

impl Interpreter {
    /// Create a new interpreter with an empty program
    pub fn new(config: InterpreterConfig, host: Host) -> Result<Self> {
        let ws = empty_workspace(config.workspace_size, config.stack_margin)?;
        let strings = StringHeap::new(config.string_heap_size);
        debug!(
            "workspace {} bytes, PAGE {:#x}, HIMEM {:#x}",
            ws.size(),
            ws.page,
            ws.himem
        );
        Ok(Self {
            config,
            ws,
            strings,
            vars: VariableStore::new(),
            stack: ValueStack::new(),
            host,
            current: SCRATCH_BASE,
            opstack: None,
            error_handler: None,
            local_handler: None,
            last_error: None,
            data_cursor: DataCursor::Start,
            gosub_chain: None,
            call_chain: None,
            fn_depth: 0,
            defs_scanned: false,
            rng: StdRng::from_entropy(),
            last_rnd: 0.0,
            time_base: Instant::now(),
            eval_top: crate::memory::EVAL_BASE,
        })
    }

    /// Default limits with in-memory devices
    pub fn in_memory() -> Result<Self> {
        let config = InterpreterConfig::default();
        let host = Host::in_memory(&config);
        Self::new(config, host)
    }

    /// Replace the workspace with a fresh one of `size` bytes. The program
    /// and every variable are lost.
    pub fn init_workspace(&mut self, size: usize) -> Result<()> {
        let ws = empty_workspace(size, self.config.stack_margin)?;
        self.clear_stack();
        self.ws = ws;
        self.config.workspace_size = size;
        self.clear_variables();
        Ok(())
    }

    /// Drop the workspace, leaving a zero-sized one behind. Nothing runs
    /// again until `init_workspace`.
    pub fn release_workspace(&mut self) {
        self.clear_stack();
        self.ws = Workspace::empty();
        self.clear_variables();
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.ws
    }

    pub fn strings(&self) -> &StringHeap {
        &self.strings
    }

    pub fn variables(&self) -> &VariableStore {
        &self.vars
    }

    pub fn stack(&self) -> &ValueStack {
        &self.stack
    }

    /// The error `REPORT`, `ERR` and `ERL` describe
    pub fn last_error(&self) -> Option<&BasicError> {
        self.last_error.as_ref()
    }

    /// Drain whatever the screen captured
    pub fn take_output(&mut self) -> String {
        String::from_utf8_lossy(&self.host.screen.take_output()).into_owned()
    }

    /// Tokenise `source` and make it the current program
    pub fn load_program(&mut self, source: &str) -> Result<()> {
        let store = ProgramStore::from_source(source)?;
        self.load_store(&store)
    }

    pub fn load_store(&mut self, store: &ProgramStore) -> Result<()> {
        self.clear_stack();
        store.write_to(&mut self.ws)?;
        self.clear_variables();
        debug!("program loaded, TOP {:#x}", self.ws.top);
        Ok(())
    }

    /// The current program, read back out of the workspace
    pub fn program(&self) -> Result<ProgramStore> {
        ProgramStore::from_workspace(&self.ws)
    }

    /// Add, replace or (for an empty line) delete one program line
    pub fn edit_line(&mut self, line: &TokenizedLine) -> Result<()> {
        let number = line.line_number.ok_or(ErrorKind::LineNo)?;
        let mut store = self.program()?;
        if line.tokens.is_empty() {
            store.delete_line(number);
        } else {
            store.store_line(number, line.tokens.clone());
        }
        self.load_store(&store)
    }

    /// `RUN`: clear variables and execute the program from its first line
    pub fn run_program(&mut self) -> Result<Outcome> {
        match self.start_run() {
            Ok(()) => self.run_top(),
            Err(err) if err.kind == ErrorKind::End => Ok(Outcome::Finished),
            Err(err) => Err(err),
        }
    }

    /// Execute one command line. A line starting with a number is stored
    /// in the program instead.
    pub fn exec_thisline(&mut self, text: &str) -> Result<Outcome> {
        let line = tokenizer::tokenize(text)?;
        if line.line_number.is_some() {
            self.edit_line(&line)?;
            return Ok(Outcome::Finished);
        }
        self.current =
            program::write_immediate(&mut self.ws, SCRATCH_BASE, SCRATCH_SIZE, &line.tokens)?;
        self.run_top()
    }

    /// Release every string; descriptors still held become dangling
    pub fn clear_strings(&mut self) {
        self.strings.clear();
    }

    /// Drop every frame without running its side effects
    pub fn clear_stack(&mut self) {
        self.stack = ValueStack::new();
        self.ws.reset_stack();
        self.opstack = None;
        self.gosub_chain = None;
        self.call_chain = None;
        self.local_handler = None;
    }

    /// Forget the scanned `PROC`/`FN` definitions
    pub fn clear_varptrs(&mut self) {
        self.vars.clear_definitions();
        self.defs_scanned = false;
    }

    /// Drop every variable except the static integers
    pub fn clear_varlists(&mut self) {
        self.vars.clear_varlists();
        self.defs_scanned = false;
    }

    /// Reset the variable heap to empty
    pub fn clear_heap(&mut self) {
        self.ws.clear_heap();
    }

    fn clear_variables(&mut self) {
        self.clear_varlists();
        self.clear_heap();
        self.clear_strings();
        self.data_cursor = DataCursor::Start;
        self.error_handler = None;
        self.local_handler = None;
        self.eval_top = crate::memory::EVAL_BASE;
    }

    fn start_run(&mut self) -> Result<()> {
        if self.fn_depth > 0 {
            return Err(ErrorKind::Command.into());
        }
        program::check_program(&self.ws)?;
        self.clear_stack();
        self.clear_variables();
        self.last_error = None;
        let page = self.ws.page;
        self.enter_line(page)
    }

    /// Run the statement loop at the outermost level and turn the ways a
    /// program can stop into an `Outcome`
    fn run_top(&mut self) -> Result<Outcome> {
        self.fn_depth = 0;
        let result = self.execute();
        if let Err(err) = self.unwind_to(0, false) {
            log::warn!("stack reset after run failed: {}", err);
            self.clear_stack();
        }
        self.opstack = None;
        match result {
            Ok(_) => Ok(Outcome::Finished),
            Err(err) => match err.kind {
                ErrorKind::End => Ok(Outcome::Finished),
                ErrorKind::Stop => Ok(Outcome::Stopped {
                    line: err.line.unwrap_or(0),
                }),
                ErrorKind::Quit(code) => Ok(Outcome::Quit(code)),
                _ => Err(err),
            },
        }
    }

    /// The statement loop. Returns only when `=` ends a function body or
    /// an error goes unhandled at this level.
    fn execute(&mut self) -> Result<Value> {
        loop {
            match self.statement() {
                Ok(Flow::Return(value)) => return Ok(value),
                Ok(_) => {}
                Err(err) => self.recover(err)?,
            }
        }
    }

    fn statement(&mut self) -> Result<Flow> {
        let token = self.next_byte()?;
        let flow = self.dispatch(token)?;
        if let Flow::Continue = flow {
            self.end_of_statement()?;
        }
        Ok(flow)
    }

    fn dispatch(&mut self, token: u8) -> Result<Flow> {
        match token {
            b':' => Ok(Flow::Moved),
            TOK_EOL => {
                self.poll_escape()?;
                let next = self.current;
                self.enter_line(next)?;
                Ok(Flow::Moved)
            }
            TOK_PRINT => self.print_statement(),
            TOK_INPUT => self.input_statement(),
            TOK_LET => self.assignment(),
            TOK_IF => self.if_statement(),
            TOK_ELSE => self.else_statement(),
            TOK_FOR => self.for_statement(),
            TOK_NEXT => self.next_statement(),
            TOK_REPEAT => self.repeat_statement(),
            TOK_UNTIL => self.until_statement(),
            TOK_GOTO => self.goto_statement(),
            TOK_GOSUB => self.gosub_statement(),
            TOK_RETURN => self.return_statement(),
            TOK_ON => self.on_statement(),
            TOK_PROC => self.proc_statement(None),
            TOK_ENDPROC => self.endproc_statement(),
            TOK_LOCAL => self.local_statement(),
            TOK_DIM => self.dim_statement(),
            TOK_READ => self.read_statement(),
            TOK_RESTORE => self.restore_statement(),
            TOK_ERROR => self.error_statement(),
            TOK_REPORT => self.report_statement(),
            TOK_CLEAR => self.clear_statement(),
            TOK_REM | TOK_DATA | TOK_DEF => {
                self.skip_to_eol()?;
                Ok(Flow::Moved)
            }
            TOK_END => Err(ErrorKind::End.into()),
            TOK_STOP => Err(ErrorKind::Stop.into()),
            TOK_RUN => {
                self.start_run()?;
                Ok(Flow::Moved)
            }
            TOK_PAGE | TOK_HIMEM | TOK_LOMEM | TOK_TIME => self.pseudo_assignment(token),
            b'=' => self.fn_return(),
            TOK_CLS | TOK_CLG | TOK_VDU | TOK_MODE | TOK_COLOUR | TOK_GCOL | TOK_PLOT
            | TOK_MOVE | TOK_DRAW | TOK_SOUND | TOK_ENVELOPE | TOK_WIDTH => {
                self.device_statement(token)
            }
            TOK_BPUT => self.bput_statement(),
            TOK_CLOSE => self.close_statement(),
            TOK_CALL => Err(ErrorKind::Unsupported("CALL").into()),
            TOK_CHAIN => Err(ErrorKind::Unsupported("CHAIN").into()),
            TOK_OSCLI | b'*' => Err(ErrorKind::Unsupported("OSCLI").into()),
            TOK_TRACE => Err(ErrorKind::Unsupported("TRACE").into()),
            PREFIX_STATEMENT => {
                let sub = self.next_byte()?;
                self.extended_statement(sub)
            }
            PREFIX_COMMAND => Err(ErrorKind::Command.into()),
            _ => {
                self.current -= 1;
                self.assignment()
            }
        }
    }

    fn extended_statement(&mut self, sub: u8) -> Result<Flow> {
        match sub {
            XST_WHILE => self.while_statement(),
            XST_ENDWHILE => self.endwhile_statement(),
            XST_ENDIF => Ok(Flow::Continue),
            XST_EXIT => self.exit_statement(),
            XST_SWAP => self.swap_statement(),
            XST_QUIT => {
                let code = if self.at_statement_end()? {
                    0
                } else {
                    self.eval_int()?
                };
                Err(ErrorKind::Quit(code).into())
            }
            XST_CIRCLE | XST_ELLIPSE | XST_RECTANGLE | XST_ORIGIN => self.shape_statement(sub),
            XST_MOUSE => self.mouse_statement(),
            XST_STEREO | XST_TEMPO | XST_BEATS | XST_VOICES | XST_VOICE => {
                self.synth_statement(sub)
            }
            XST_SYS => Err(ErrorKind::Unsupported("SYS").into()),
            XST_INSTALL | XST_LIBRARY => Err(ErrorKind::Unsupported("LIBRARY").into()),
            _ => Err(ErrorKind::Syntax.into()),
        }
    }

    /// After a statement: step over `:`, or stop at the end of the line or
    /// an `ELSE`
    fn end_of_statement(&mut self) -> Result<()> {
        match self.peek()? {
            b':' => {
                self.current += 1;
                Ok(())
            }
            TOK_EOL | TOK_ELSE => Ok(()),
            _ => Err(ErrorKind::Syntax.into()),
        }
    }

    /// Escape is noticed between lines and on every jump
    fn poll_escape(&mut self) -> Result<()> {
        if self.host.keyboard.escape_polled() {
            return Err(ErrorKind::Escape.into());
        }
        Ok(())
    }

    /// Start executing the line at `addr`, or raise `End` at the end marker
    fn enter_line(&mut self, addr: usize) -> Result<()> {
        if program::at_prog_end(&self.ws, addr) {
            return Err(ErrorKind::End.into());
        }
        self.current = addr + LINE_HEADER;
        Ok(())
    }

    /// Line number of the statement being executed; 0 outside the program
    fn current_line(&self) -> u32 {
        program::line_containing(&self.ws, self.current).map_or(0, u32::from)
    }

    fn storage(&mut self) -> Storage<'_> {
        Storage {
            ws: &mut self.ws,
            vars: &mut self.vars,
            strings: &mut self.strings,
            max_string: self.config.max_string_len,
        }
    }

    // Token-level reading

    fn peek(&self) -> Result<u8> {
        self.ws.peek(self.current)
    }

    fn next_byte(&mut self) -> Result<u8> {
        let byte = self.ws.peek(self.current)?;
        self.current += 1;
        Ok(byte)
    }

    fn accept(&mut self, byte: u8) -> Result<bool> {
        if self.peek()? == byte {
            self.current += 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.accept(byte)? {
            Ok(())
        } else {
            Err(ErrorKind::Missing(byte as char).into())
        }
    }

    fn at_statement_end(&self) -> Result<bool> {
        Ok(matches!(self.peek()?, b':' | TOK_EOL | TOK_ELSE))
    }

    /// A variable name with its type suffix and, for arrays, the opening
    /// bracket
    fn read_name(&mut self) -> Result<Vec<u8>> {
        let (name, end) = self.name_at(self.current, true)?;
        if name.is_empty() {
            return Err(ErrorKind::Syntax.into());
        }
        self.current = end;
        Ok(name)
    }

    /// The bare name after `PROC` or `FN`
    fn read_proc_name(&mut self) -> Result<Vec<u8>> {
        let (name, end) = self.name_at(self.current, false)?;
        if name.is_empty() {
            return Err(ErrorKind::NoSuchProc.into());
        }
        self.current = end;
        Ok(name)
    }

    fn name_at(&self, pos: usize, with_suffix: bool) -> Result<(Vec<u8>, usize)> {
        let mut end = pos;
        if self.ws.peek(pos)? == b'@' && self.ws.peek(pos + 1)? == b'%' {
            return Ok((b"@%".to_vec(), pos + 2));
        }
        while is_name_byte(self.ws.peek(end)?) {
            end += 1;
        }
        if end == pos || !with_suffix {
            return Ok((self.ws.bytes(pos, end - pos)?.to_vec(), end));
        }
        match self.ws.peek(end)? {
            b'%' if self.ws.peek(end + 1)? == b'%' => end += 2,
            b'%' | b'&' | b'$' => end += 1,
            _ => {}
        }
        if self.ws.peek(end)? == b'(' {
            end += 1;
        }
        Ok((self.ws.bytes(pos, end - pos)?.to_vec(), end))
    }

    /// Move `current` to the end-of-line token of the current line
    fn skip_to_eol(&mut self) -> Result<()> {
        let mut prev = 0;
        loop {
            let byte = self.peek()?;
            if byte == TOK_EOL {
                return Ok(());
            }
            let next = self.token_after(self.current, prev)?;
            prev = byte;
            self.current = next;
        }
    }

    /// Move `current` to the separator ending the current statement
    fn skip_statement(&mut self) -> Result<()> {
        let mut prev = 0;
        loop {
            let byte = self.peek()?;
            if matches!(byte, b':' | TOK_EOL | TOK_ELSE) {
                return Ok(());
            }
            let next = self.token_after(self.current, prev)?;
            prev = byte;
            self.current = next;
        }
    }

    /// Address of the token following the one at `pos`. `prev` is the
    /// token before it, which decides whether `DATA` is followed by raw
    /// text.
    fn token_after(&self, pos: usize, prev: u8) -> Result<usize> {
        let byte = self.ws.peek(pos)?;
        let raw = byte == TOK_REM
            || (byte == TOK_DATA && prev != TOK_LOCAL && prev != TOK_RESTORE);
        if raw {
            let mut end = pos + 1;
            while self.ws.peek(end)? != TOK_EOL {
                end += 1;
            }
            return Ok(end);
        }
        let avail = (self.ws.size() - pos).min(3);
        Ok(pos + tokenizer::token_len(self.ws.bytes(pos, avail)?, 0))
    }
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'`'
}

/// A workspace of `size` bytes holding the empty program
fn empty_workspace(size: usize, margin: usize) -> Result<Workspace> {
    let mut ws = Workspace::new(size, margin)?;
    ProgramStore::new().write_to(&mut ws)?;
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MIN_WORKSPACE;

    fn run(source: &str) -> (Interpreter, Result<Outcome>) {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.load_program(source).unwrap();
        let outcome = interp.run_program();
        (interp, outcome)
    }

    #[test]
    fn test_interpreter_creation() {
        let interp = Interpreter::in_memory().unwrap();
        assert!(interp.workspace().check_invariants());
        assert_eq!(interp.stack().depth(), 0);
        assert!(interp.last_error().is_none());
    }

    #[test]
    fn test_empty_program_finishes() {
        let (_, outcome) = run("");
        assert_eq!(outcome.unwrap(), Outcome::Finished);
    }

    #[test]
    fn test_end_stop_and_quit() {
        assert_eq!(run("10 END\n20 PRINT 1").1.unwrap(), Outcome::Finished);
        assert_eq!(
            run("10 PRINT 1\n20 STOP").1.unwrap(),
            Outcome::Stopped { line: 20 }
        );
        assert_eq!(run("10 QUIT 3").1.unwrap(), Outcome::Quit(3));
    }

    #[test]
    fn test_immediate_line() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.exec_thisline("A% = 6 * 7").unwrap();
        interp.exec_thisline("PRINT A%").unwrap();
        assert_eq!(interp.take_output(), "        42\n");
    }

    #[test]
    fn test_numbered_line_is_stored() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.exec_thisline("10 PRINT \"HI\"").unwrap();
        interp.exec_thisline("20 PRINT \"THERE\"").unwrap();
        interp.exec_thisline("20").unwrap();
        assert_eq!(interp.program().unwrap().len(), 1);
        interp.run_program().unwrap();
        assert_eq!(interp.take_output(), "HI\n");
    }

    #[test]
    fn test_untrapped_error_carries_line() {
        let (interp, outcome) = run("10 X = 1\n20 PRINT 1/0");
        let err = outcome.unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivZero);
        assert_eq!(err.line, Some(20));
        assert_eq!(interp.stack().depth(), 0);
    }

    #[test]
    fn test_syntax_error_after_statement() {
        let (_, outcome) = run("10 PRINT 1 )");
        assert_eq!(outcome.unwrap_err().kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_escape_is_trappable() {
        let config = InterpreterConfig::default();
        let keyboard = ScriptedKeyboard::new();
        let flag = keyboard.escape_flag();
        let mut interp = Interpreter::new(config.clone(), Host::with_input(&config, keyboard)).unwrap();
        interp
            .load_program("10 ON ERROR PRINT REPORT$: END\n20 GOTO 20")
            .unwrap();
        flag.raise();
        interp.run_program().unwrap();
        assert_eq!(interp.take_output(), "Escape\n");
    }

    #[test]
    fn test_run_clears_variables() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.exec_thisline("count = 5: A% = 2").unwrap();
        interp.load_program("10 PRINT A%").unwrap();
        interp.run_program().unwrap();
        assert_eq!(interp.take_output(), "         2\n");
        assert!(interp.variables().lookup(b"count").is_none());
    }

    #[test]
    fn test_new_workspace_drops_variables() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.exec_thisline("count = 5").unwrap();
        interp.init_workspace(MIN_WORKSPACE).unwrap();
        assert_eq!(interp.workspace().size(), MIN_WORKSPACE);
        assert!(interp.workspace().check_invariants());
        assert!(interp.variables().lookup(b"count").is_none());
        assert_eq!(
            interp.init_workspace(MIN_WORKSPACE - 1).unwrap_err().kind,
            ErrorKind::NoRoom
        );
    }

    #[test]
    fn test_definitions_are_rescanned_after_clearing() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp
            .load_program("10 PROCp\n20 END\n30 DEF PROCp: PRINT \"p\": ENDPROC")
            .unwrap();
        interp.run_program().unwrap();
        interp.clear_varptrs();
        interp.exec_thisline("PROCp").unwrap();
        assert_eq!(interp.take_output(), "p\np\n");
    }

    #[test]
    fn test_format_starts_at_default() {
        let (mut interp, outcome) = run("10 PRINT ;~@%\n20 PRINT 1,2");
        assert_eq!(outcome.unwrap(), Outcome::Finished);
        assert_eq!(interp.take_output(), "90A\n         1         2\n");
        interp.exec_thisline("CLEAR: PRINT ;~@%").unwrap();
        assert_eq!(interp.take_output(), "90A\n");
    }

    #[test]
    fn test_format_is_static_across_run_and_clear() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.load_program("10 PRINT 7").unwrap();
        interp.exec_thisline("@% = &904").unwrap();
        assert_eq!(interp.run_program().unwrap(), Outcome::Finished);
        interp.exec_thisline("CLEAR: PRINT 8").unwrap();
        assert_eq!(interp.take_output(), "   7\n   8\n");
    }

    #[test]
    fn test_fresh_interpreter_accepts_program_lines() {
        let mut interp = Interpreter::in_memory().unwrap();
        program::check_program(interp.workspace()).unwrap();
        assert!(interp.program().unwrap().is_empty());
        assert_eq!(interp.run_program().unwrap(), Outcome::Finished);
        interp.exec_thisline("20 PRINT \"B\"").unwrap();
        interp.exec_thisline("10 PRINT \"A\"").unwrap();
        assert_eq!(interp.run_program().unwrap(), Outcome::Finished);
        assert_eq!(interp.take_output(), "A\nB\n");

        interp.init_workspace(MIN_WORKSPACE).unwrap();
        assert!(interp.program().unwrap().is_empty());
        interp.exec_thisline("10 PRINT \"C\"").unwrap();
        assert_eq!(interp.run_program().unwrap(), Outcome::Finished);
        assert_eq!(interp.take_output(), "C\n");
    }

    #[test]
    fn test_run_statement_on_empty_program() {
        let mut interp = Interpreter::in_memory().unwrap();
        assert_eq!(interp.exec_thisline("RUN").unwrap(), Outcome::Finished);
        interp.load_program("").unwrap();
        assert_eq!(interp.run_program().unwrap(), Outcome::Finished);
        assert!(interp.stack().is_empty());
    }
}
