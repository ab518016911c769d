//! Error trapping and the statements that manage it

use super::{Flow, Interpreter};
use crate::error::{BasicError, ErrorKind, Result};
use crate::program::DataCursor;
use crate::stack::{Frame, LocalHandler, RestartFrame};
use crate::tokenizer::*;
use log::debug;

impl Interpreter {
    /// Deal with an error raised by a statement. A local handler takes it
    /// first, then (outside any function) the global one; otherwise it is
    /// passed back to the caller.
    pub(super) fn recover(&mut self, mut err: BasicError) -> Result<()> {
        if err.line.is_none() {
            err.line = Some(self.current_line());
        }
        if !err.is_trappable() {
            return Err(err);
        }
        debug!("error {} ({}) at line {:?}", err.number(), err, err.line);
        self.last_error = Some(err.clone());

        if let Some(handler) = self.local_handler.clone() {
            self.unwind_to(handler.depth, false)?;
            self.opstack = None;
            self.data_cursor = handler.data;
            self.current = handler.address;
            return Ok(());
        }
        if self.fn_depth > 0 {
            return Err(err);
        }
        match self.error_handler {
            Some(address) => {
                self.unwind_to(0, false)?;
                self.opstack = None;
                self.current = address;
                Ok(())
            }
            None => Err(err),
        }
    }

    /// `ON ERROR statements`, `ON ERROR LOCAL statements`, `ON ERROR OFF`
    /// and `ON ERROR LOCAL OFF`. The handler is the rest of the line.
    pub(super) fn on_error_statement(&mut self) -> Result<Flow> {
        if self.accept(TOK_OFF)? {
            self.error_handler = None;
            self.local_handler = None;
            return Ok(Flow::Continue);
        }
        if self.accept(TOK_LOCAL)? {
            if self.accept(TOK_OFF)? {
                self.local_handler = None;
                return Ok(Flow::Continue);
            }
            let handler = LocalHandler {
                address: self.current,
                depth: self.stack.depth() + 1,
                data: self.data_cursor,
            };
            let restart = RestartFrame {
                handler: handler.clone(),
                previous: self.local_handler.clone(),
            };
            self.stack.push(&mut self.ws, Frame::Restart(restart))?;
            self.local_handler = Some(handler);
        } else {
            self.error_handler = Some(self.current);
        }
        self.skip_to_eol()?;
        Ok(Flow::Moved)
    }

    /// `ERROR number, message`
    pub(super) fn error_statement(&mut self) -> Result<Flow> {
        let number = self.eval_int()?;
        self.expect(b',')?;
        let message = self.eval_bytes()?;
        Err(ErrorKind::User {
            number,
            message: String::from_utf8_lossy(&message).into_owned(),
        }
        .into())
    }

    pub(super) fn report_statement(&mut self) -> Result<Flow> {
        let text = self.report_text();
        self.host.screen.vdu_string(text.as_bytes());
        Ok(Flow::Continue)
    }

    /// Message of the last error, as `REPORT` and `REPORT$` give it
    pub(super) fn report_text(&self) -> String {
        self.last_error
            .as_ref()
            .map_or_else(String::new, |err| err.kind.to_string())
    }

    /// `RESTORE ERROR` and `RESTORE DATA` reinstate what the innermost
    /// `LOCAL ERROR`, `ON ERROR LOCAL` or `LOCAL DATA` of the current call
    /// saved; the frame itself stays until the call ends
    pub(super) fn restore_saved(&mut self, token: u8) -> Result<Flow> {
        let floor = self.call_chain.map_or(0, |index| index + 1);
        if token == TOK_DATA {
            let index = self
                .stack
                .find_innermost(floor, |frame| matches!(frame, Frame::Data(_)))
                .ok_or(ErrorKind::NoMatching("LOCAL DATA"))?;
            if let Some(Frame::Data(cursor)) = self.stack.get(index) {
                self.data_cursor = *cursor;
            }
            return Ok(Flow::Continue);
        }
        let index = self
            .stack
            .find_innermost(floor, |frame| {
                matches!(frame, Frame::Error(_) | Frame::Restart(_))
            })
            .ok_or(ErrorKind::NoMatching("LOCAL ERROR"))?;
        match self.stack.get(index) {
            Some(Frame::Error(saved)) => {
                self.error_handler = saved.global;
                self.local_handler = saved.local.clone();
            }
            Some(Frame::Restart(restart)) => self.local_handler = restart.previous.clone(),
            _ => {}
        }
        Ok(Flow::Continue)
    }

    /// `CLEAR`: forget every variable and string, and reset `DATA`
    pub(super) fn clear_statement(&mut self) -> Result<Flow> {
        if self.call_chain.is_some() || self.fn_depth > 0 {
            return Err(ErrorKind::Command.into());
        }
        self.unwind_to(0, false)?;
        self.clear_varlists();
        self.clear_heap();
        self.clear_strings();
        self.data_cursor = DataCursor::Start;
        self.local_handler = None;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Outcome;

    fn run(source: &str) -> (Interpreter, Result<Outcome>) {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.load_program(source).unwrap();
        let outcome = interp.run_program();
        (interp, outcome)
    }

    fn output(source: &str) -> String {
        let (mut interp, outcome) = run(source);
        outcome.unwrap();
        interp.take_output()
    }

    #[test]
    fn test_global_handler_reports_error() {
        let out = output(
            "10 ON ERROR PRINT \"caught \";ERR;\" at \";ERL: END\n\
             20 x = 1\n\
             30 y = x / 0",
        );
        assert_eq!(out, "caught 18 at 30\n");
    }

    #[test]
    fn test_user_error() {
        let (interp, outcome) = run("10 ERROR 100, \"custom\"");
        let err = outcome.unwrap_err();
        assert_eq!(err.number(), 100);
        assert_eq!(err.report(), "custom at line 10");
        assert_eq!(interp.last_error().map(BasicError::number), Some(100));
    }

    #[test]
    fn test_handler_unwinds_loops() {
        let (interp, outcome) = run(
            "10 ON ERROR GOTO 100\n\
             20 FOR i% = 1 TO 5: REPEAT\n\
             30 PROCfail\n\
             40 UNTIL FALSE: NEXT\n\
             100 END\n\
             200 DEF PROCfail: LOCAL a: ERROR 1, \"x\"",
        );
        assert_eq!(outcome.unwrap(), Outcome::Finished);
        assert_eq!(interp.stack().depth(), 0);
    }

    #[test]
    fn test_local_handler_resumes_in_procedure() {
        let out = output(
            "10 PROCtry(0): PROCtry(2)\n\
             20 END\n\
             30 DEF PROCtry(d)\n\
             40 LOCAL r\n\
             50 ON ERROR LOCAL PRINT \"failed: \";REPORT$: ENDPROC\n\
             60 r = 10 / d: PRINT ;r\n\
             70 ENDPROC",
        );
        assert_eq!(out, "failed: Division by zero\n5\n");
    }

    #[test]
    fn test_local_handler_restored_after_procedure() {
        let (_, outcome) = run(
            "10 PROCinner\n\
             20 PRINT 1/0\n\
             30 DEF PROCinner\n\
             40 ON ERROR LOCAL ENDPROC\n\
             50 ENDPROC",
        );
        let err = outcome.unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivZero);
        assert_eq!(err.line, Some(20));
    }

    #[test]
    fn test_error_in_function_reaches_caller_handler() {
        let out = output(
            "10 ON ERROR PRINT \"outer \";ERL: END\n\
             20 PRINT FNbad\n\
             30 DEF FNbad\n\
             40 =SQR(-1)",
        );
        assert_eq!(out, "outer 40\n");
    }

    #[test]
    fn test_on_error_off() {
        let (_, outcome) = run("10 ON ERROR PRINT \"no\": END\n20 ON ERROR OFF\n30 PRINT 1/0");
        assert_eq!(outcome.unwrap_err().kind, ErrorKind::DivZero);
    }

    #[test]
    fn test_local_error_and_restore_error() {
        let out = output(
            "10 ON ERROR PRINT \"global\": END\n\
             20 PROCp\n\
             30 ERROR 5, \"later\"\n\
             40 DEF PROCp\n\
             50 LOCAL ERROR\n\
             60 ON ERROR LOCAL PRINT \"local\": RESTORE ERROR: ENDPROC\n\
             70 ERROR 4, \"now\"",
        );
        assert_eq!(out, "local\nglobal\n");
    }

    #[test]
    fn test_clear_inside_procedure_is_refused() {
        let (_, outcome) = run("10 PROCc\n20 END\n30 DEF PROCc: CLEAR");
        assert_eq!(outcome.unwrap_err().kind, ErrorKind::Command);
    }

    #[test]
    fn test_clear_releases_strings() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.exec_thisline("a$ = \"one\": DIM b$(3): b$(2) = \"two\"").unwrap();
        assert_eq!(interp.strings().live_count(), 2);
        interp.exec_thisline("CLEAR").unwrap();
        assert_eq!(interp.strings().live_count(), 0);
        assert!(interp.variables().lookup(b"a$").is_none());
    }
}
