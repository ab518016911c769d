//! Procedures, functions and `LOCAL`
//!
//! Definitions are found by scanning the program for `DEF` lines the first
//! time a call cannot be resolved, and are then kept as variable records
//! named `PROCname`/`FNname`. Arguments are evaluated onto the stack before
//! any formal parameter is touched, so an argument may mention a variable
//! its own formal shadows.

use super::{Flow, Interpreter, Value};
use crate::error::{ErrorKind, Result};
use crate::lvalue::{Location, Lvalue, Stored};
use crate::program::{self, LINE_HEADER};
use crate::stack::{CallFrame, FnFrame, Frame, FrameTag, SavedHandlers};
use crate::tokenizer::*;
use crate::variables::{FormalParam, Number, ParamKind, ProcDef, VarCell, VarType};
use log::{debug, trace, warn};
use std::rc::Rc;

impl Interpreter {
    /// `PROCname[(args)]`. `ret` overrides where `ENDPROC` resumes, as
    /// `ON ... PROC` needs.
    pub(super) fn proc_statement(&mut self, ret: Option<usize>) -> Result<Flow> {
        let name = self.read_proc_name()?;
        let key = [b"PROC".as_slice(), name.as_slice()].concat();
        let def = self.find_definition(&key)?;
        let param_count = self.bind_arguments(&def)?;
        let call = CallFrame {
            ret: ret.unwrap_or(self.current),
            name: key,
            param_count,
            prev: self.call_chain,
        };
        let index = self.stack.depth();
        self.stack.push(&mut self.ws, Frame::Proc(call))?;
        self.call_chain = Some(index);
        self.current = def.entry;
        Ok(Flow::Moved)
    }

    pub(super) fn endproc_statement(&mut self) -> Result<Flow> {
        let index = self.call_chain.ok_or(ErrorKind::NotInProc)?;
        let (ret, count) = match self.stack.get(index) {
            Some(Frame::Proc(call)) => (call.ret, call.param_count),
            _ => return Err(ErrorKind::NotInProc.into()),
        };
        self.unwind_to(index - count, true)?;
        self.current = ret;
        Ok(Flow::Continue)
    }

    /// `FNname[(args)]` inside an expression. The body runs in a nested
    /// statement loop until `=` hands back the result.
    pub(super) fn call_function(&mut self) -> Result<Value> {
        if self.fn_depth >= self.config.max_fn_depth {
            return Err(ErrorKind::StackFull.into());
        }
        let name = self.read_proc_name()?;
        let key = [b"FN".as_slice(), name.as_slice()].concat();
        let def = self.find_definition(&key)?;
        let base = self.stack.depth();
        let param_count = self.bind_arguments(&def)?;
        let ret = self.current;
        let frame = FnFrame {
            call: CallFrame {
                ret,
                name: key,
                param_count,
                prev: self.call_chain,
            },
            saved_opstack: self.opstack,
            saved_handler: self.local_handler.clone(),
        };
        let index = self.stack.depth();
        self.stack.push(&mut self.ws, Frame::Fn(frame))?;
        self.opstack = None;
        self.local_handler = None;
        self.call_chain = Some(index);
        self.current = def.entry;

        self.fn_depth += 1;
        let result = self.execute();
        self.fn_depth -= 1;

        match result {
            Ok(value) => {
                if let Err(err) = self.unwind_to(base, true) {
                    self.release(value);
                    return Err(err);
                }
                self.current = ret;
                Ok(value)
            }
            Err(err) => {
                self.unwind_to(base, false)?;
                Err(err)
            }
        }
    }

    /// `=expr` ending a function body
    pub(super) fn fn_return(&mut self) -> Result<Flow> {
        match self.call_chain.and_then(|index| self.stack.get(index)) {
            Some(Frame::Fn(_)) => {}
            _ => return Err(ErrorKind::NotInFn.into()),
        }
        let value = self.eval()?;
        Ok(Flow::Return(self.own(value)?))
    }

    /// `LOCAL var, ...`, `LOCAL name()`, `LOCAL DATA` and `LOCAL ERROR`
    pub(super) fn local_statement(&mut self) -> Result<Flow> {
        if self.accept(TOK_DATA)? {
            let cursor = self.data_cursor;
            self.stack.push(&mut self.ws, Frame::Data(cursor))?;
            return Ok(Flow::Continue);
        }
        if self.accept(TOK_ERROR)? {
            let saved = SavedHandlers {
                global: self.error_handler,
                local: self.local_handler.clone(),
            };
            self.stack.push(&mut self.ws, Frame::Error(saved))?;
            return Ok(Flow::Continue);
        }
        if self.call_chain.is_none() {
            return Err(ErrorKind::NotInProc.into());
        }
        loop {
            let (name, end) = self.name_at(self.current, true)?;
            if name.ends_with(b"(") && self.ws.peek(end)? == b')' {
                self.current = end + 1;
                let target = self.array_lvalue(&name, true)?;
                self.save_variable(target, None)?;
                if let Location::Variable(id) = target.loc {
                    self.vars.get_mut(id).local_array = true;
                }
            } else {
                let target = self.resolve_lvalue(true)?;
                if target.is_pointer() {
                    return Err(ErrorKind::Syntax.into());
                }
                self.save_variable(target, None)?;
            }
            if !self.accept(b',')? {
                break;
            }
        }
        Ok(Flow::Continue)
    }

    /// Move a variable's value into a `LOCAL` frame, or a `RETURN`
    /// parameter frame when `dest` is given, leaving it zeroed
    fn save_variable(&mut self, target: Lvalue, dest: Option<Lvalue>) -> Result<()> {
        let tag = if dest.is_some() {
            FrameTag::RetParm
        } else {
            FrameTag::Local
        };
        if self.ws.stack_room() < tag.size() {
            return Err(ErrorKind::StackFull.into());
        }
        let saved = self.storage().take(&target)?;
        let frame = match dest {
            Some(dest) => Frame::RetParm {
                target,
                saved,
                dest,
            },
            None => Frame::Local { target, saved },
        };
        self.stack.push(&mut self.ws, frame)
    }

    fn find_definition(&mut self, key: &[u8]) -> Result<Rc<ProcDef>> {
        if let Some(def) = self.definition(key) {
            return Ok(def);
        }
        if !self.defs_scanned {
            self.scan_definitions()?;
            self.defs_scanned = true;
            if let Some(def) = self.definition(key) {
                return Ok(def);
            }
        }
        Err(ErrorKind::NoSuchProc.into())
    }

    fn definition(&self, key: &[u8]) -> Option<Rc<ProcDef>> {
        let id = self.vars.lookup(key)?;
        match &self.vars.get(id).cell {
            VarCell::Definition(def) => Some(Rc::clone(def)),
            _ => None,
        }
    }

    /// Record every `DEF PROC`/`DEF FN` line not already known. The first
    /// definition of a name wins.
    fn scan_definitions(&mut self) -> Result<()> {
        let mut line = self.ws.page;
        let mut found = 0;
        while !program::at_prog_end(&self.ws, line) {
            let start = line + LINE_HEADER;
            if self.ws.peek(start)? == TOK_DEF {
                match self.scan_definition(start + 1) {
                    Ok(true) => found += 1,
                    Ok(false) => {}
                    Err(err) => warn!(
                        "skipping bad definition at line {}: {}",
                        program::line_no(&self.ws, line)?,
                        err
                    ),
                }
            }
            line += program::line_len(&self.ws, line)?;
        }
        debug!("found {} PROC/FN definitions", found);
        Ok(())
    }

    fn scan_definition(&mut self, pos: usize) -> Result<bool> {
        let (prefix, is_fn): (&[u8], bool) = match self.ws.peek(pos)? {
            TOK_PROC => (b"PROC".as_slice(), false),
            TOK_FN => (b"FN".as_slice(), true),
            _ => return Err(ErrorKind::Syntax.into()),
        };
        let (name, mut pos) = self.name_at(pos + 1, false)?;
        if name.is_empty() {
            return Err(ErrorKind::Syntax.into());
        }
        let key = [prefix, name.as_slice()].concat();
        if self.vars.lookup(&key).is_some() {
            return Ok(false);
        }
        let mut params = Vec::new();
        if self.ws.peek(pos)? == b'(' {
            pos += 1;
            loop {
                let is_return = self.ws.peek(pos)? == TOK_RETURN;
                if is_return {
                    pos += 1;
                }
                let (name, end) = self.name_at(pos, true)?;
                if name.is_empty() {
                    return Err(ErrorKind::Syntax.into());
                }
                pos = end;
                let kind = if name.ends_with(b"(") {
                    if self.ws.peek(pos)? != b')' {
                        return Err(ErrorKind::Missing(')').into());
                    }
                    pos += 1;
                    ParamKind::Array(VarType::from_name(&name))
                } else {
                    ParamKind::Scalar(VarType::from_name(&name))
                };
                params.push(FormalParam {
                    name,
                    kind,
                    is_return,
                });
                match self.ws.peek(pos)? {
                    b',' => pos += 1,
                    b')' => {
                        pos += 1;
                        break;
                    }
                    _ => return Err(ErrorKind::Missing(')').into()),
                }
            }
        }
        trace!(
            "DEF {} with {} parameters",
            String::from_utf8_lossy(&key),
            params.len()
        );
        let def = ProcDef::new(pos, params, is_fn);
        self.vars
            .create(&mut self.ws, &key, VarCell::Definition(Rc::new(def)))?;
        Ok(true)
    }

    /// Evaluate the actual arguments and bind them to the formals, leaving
    /// one `LOCAL` or `RETURN` frame per parameter. Returns how many.
    fn bind_arguments(&mut self, def: &ProcDef) -> Result<usize> {
        if !self.accept(b'(')? {
            if def.params.is_empty() {
                return Ok(0);
            }
            return Err(ErrorKind::Arguments.into());
        }
        if def.params.is_empty() {
            return Err(ErrorKind::Arguments.into());
        }
        if def.simple {
            let value = self.eval_int()?;
            self.close_arguments()?;
            let target = self.named_lvalue(&def.params[0].name, true)?;
            self.save_variable(target, None)?;
            self.storage().store_number(&target, Number::Int(value))?;
            return Ok(1);
        }

        let base = self.stack.depth();
        let mut dests = Vec::with_capacity(def.params.len());
        if let Err(err) = self.push_arguments(&def.params, &mut dests) {
            self.unwind_to(base, false)?;
            return Err(err);
        }
        let mut values = Vec::with_capacity(def.params.len());
        while self.stack.depth() > base {
            match self.stack.pop(&mut self.ws) {
                Some(frame) => values.push(frame),
                None => break,
            }
        }
        values.reverse();

        let mut values = values.into_iter();
        for (formal, dest) in def.params.iter().zip(dests) {
            let value = match values.next() {
                Some(value) => value,
                None => return Err(ErrorKind::Broken("argument frames missing").into()),
            };
            if let Err(err) = self.bind_one(formal, dest, value) {
                for rest in values {
                    if let Frame::StrTemp(desc) = rest {
                        self.strings.free(desc);
                    }
                }
                return Err(err);
            }
        }
        Ok(def.params.len())
    }

    fn close_arguments(&mut self) -> Result<()> {
        if self.peek()? == b',' {
            return Err(ErrorKind::Arguments.into());
        }
        self.expect(b')')
    }

    /// Push one frame per actual argument. `RETURN` formals take an
    /// assignable argument whose location is recorded in `dests`.
    fn push_arguments(
        &mut self,
        params: &[FormalParam],
        dests: &mut Vec<Option<Lvalue>>,
    ) -> Result<()> {
        for (i, formal) in params.iter().enumerate() {
            if i > 0 && !self.accept(b',')? {
                return Err(ErrorKind::Arguments.into());
            }
            match formal.kind {
                ParamKind::Array(element) => {
                    let (name, end) = self.name_at(self.current, true)?;
                    if !name.ends_with(b"(") || self.ws.peek(end)? != b')' {
                        return Err(ErrorKind::TypeMismatch.into());
                    }
                    self.current = end + 1;
                    let lv = self.array_lvalue(&name, false)?;
                    let desc = match self.storage().load(&lv)? {
                        Stored::Array(Some(desc)) => desc,
                        _ => return Err(ErrorKind::ArrayDim.into()),
                    };
                    if desc.element != element {
                        return Err(ErrorKind::TypeMismatch.into());
                    }
                    self.stack.push(&mut self.ws, Frame::Array(desc))?;
                    dests.push(None);
                }
                ParamKind::Scalar(_) if formal.is_return => {
                    let lv = self.resolve_lvalue(true)?;
                    let value = self.load_value(&lv)?;
                    self.push_value(value)?;
                    dests.push(Some(lv));
                }
                ParamKind::Scalar(_) => {
                    let value = self.eval()?;
                    self.push_value(value)?;
                    dests.push(None);
                }
            }
        }
        self.close_arguments()
    }

    fn bind_one(&mut self, formal: &FormalParam, dest: Option<Lvalue>, value: Frame) -> Result<()> {
        let target = match formal.kind {
            ParamKind::Array(_) => self.array_lvalue(&formal.name, true)?,
            ParamKind::Scalar(_) => self.named_lvalue(&formal.name, true)?,
        };
        if let Err(err) = self.save_variable(target, dest) {
            if let Frame::StrTemp(desc) = value {
                self.strings.free(desc);
            }
            return Err(err);
        }
        match value {
            Frame::Int(v) => self.storage().store_number(&target, Number::Int(v)),
            Frame::Int64(v) => self.storage().store_number(&target, Number::Int64(v)),
            Frame::Float(v) => self.storage().store_number(&target, Number::Float(v)),
            Frame::StrTemp(desc) => self.storage().store_string(&target, desc, true),
            Frame::Array(desc) => self.storage().store(&target, Stored::Array(Some(desc))),
            _ => Err(ErrorKind::Broken("argument frame expected").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{InterpreterConfig, Host, Outcome};

    fn run(source: &str) -> (Interpreter, crate::error::Result<Outcome>) {
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
    fn test_recursive_function() {
        let out = output(
            "10 PRINT FNfact(10)\n\
             20 END\n\
             30 DEF FNfact(n%)\n\
             40 IF n% <= 1 THEN =1\n\
             50 =n% * FNfact(n% - 1)",
        );
        assert_eq!(out, "   3628800\n");
    }

    #[test]
    fn test_procedure_with_locals() {
        let (interp, outcome) = run(
            "10 x = 1: y$ = \"outer\"\n\
             20 PROCinner(5)\n\
             30 PRINT ;x;y$\n\
             40 END\n\
             50 DEF PROCinner(x)\n\
             60 LOCAL y$\n\
             70 y$ = \"inner\": PRINT ;x;y$\n\
             80 ENDPROC",
        );
        outcome.unwrap();
        let mut interp = interp;
        assert_eq!(interp.take_output(), "5inner\n1outer\n");
        assert_eq!(interp.stack().depth(), 0);
    }

    #[test]
    fn test_return_parameter_is_written_back() {
        let out = output(
            "10 a = 1: b$ = \"x\"\n\
             20 PROCset(a, b$)\n\
             30 PRINT ;a;b$\n\
             40 END\n\
             50 DEF PROCset(RETURN n, RETURN s$)\n\
             60 n = n + 41: s$ = s$ + \"y\"\n\
             70 ENDPROC",
        );
        assert_eq!(out, "42xy\n");
    }

    #[test]
    fn test_array_parameter_shares_storage() {
        let out = output(
            "10 DIM v(3)\n\
             20 PROCfill(v())\n\
             30 PRINT ;v(0);v(3)\n\
             40 END\n\
             50 DEF PROCfill(a())\n\
             60 a(0) = 7: a(3) = 9\n\
             70 ENDPROC",
        );
        assert_eq!(out, "79\n");
    }

    #[test]
    fn test_argument_sees_caller_variable() {
        let out = output(
            "10 n% = 3\n\
             20 PRINT FNtwice(n% + 1)\n\
             30 END\n\
             40 DEF FNtwice(n%) = n% * 2",
        );
        assert_eq!(out, "         8\n");
    }

    #[test]
    fn test_local_array() {
        let (mut interp, outcome) = run(
            "10 PROCt: PROCt\n\
             20 END\n\
             30 DEF PROCt\n\
             40 LOCAL a()\n\
             50 DIM a(2): a(1) = a(1) + 1: PRINT ;a(1)\n\
             60 ENDPROC",
        );
        outcome.unwrap();
        assert_eq!(interp.take_output(), "1\n1\n");
        assert_eq!(interp.stack().depth(), 0);
    }

    #[test]
    fn test_call_errors() {
        assert_eq!(run("10 PROCmissing").1.unwrap_err().kind, ErrorKind::NoSuchProc);
        assert_eq!(run("10 ENDPROC").1.unwrap_err().kind, ErrorKind::NotInProc);
        assert_eq!(run("10 =1").1.unwrap_err().kind, ErrorKind::NotInFn);
        assert_eq!(run("10 LOCAL x").1.unwrap_err().kind, ErrorKind::NotInProc);
        assert_eq!(
            run("10 PROCp(1, 2)\n20 END\n30 DEF PROCp(a)\n40 ENDPROC").1.unwrap_err().kind,
            ErrorKind::Arguments
        );
        assert_eq!(
            run("10 PROCp\n20 END\n30 DEF PROCp(a, b)\n40 ENDPROC").1.unwrap_err().kind,
            ErrorKind::Arguments
        );
    }

    #[test]
    fn test_function_depth_is_limited() {
        let mut config = InterpreterConfig::default();
        config.max_fn_depth = 20;
        let host = Host::in_memory(&config);
        let mut interp = Interpreter::new(config, host).unwrap();
        interp
            .load_program("10 PRINT FNr(1)\n20 END\n30 DEF FNr(n) = FNr(n + 1)")
            .unwrap();
        let err = interp.run_program().unwrap_err();
        assert_eq!(err.kind, ErrorKind::StackFull);
        assert_eq!(interp.stack().depth(), 0);
    }

    #[test]
    fn test_string_function_result_survives_unwinding() {
        let out = output(
            "10 PRINT FNname(\"Ada\")\n\
             20 END\n\
             30 DEF FNname(n$)\n\
             40 LOCAL r$\n\
             50 r$ = \"Hello \" + n$\n\
             60 =r$",
        );
        assert_eq!(out, "Hello Ada\n");
    }
}
