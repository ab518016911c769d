//! Branches and loops
//!
//! Loop frames remember where their body starts; the closing statement
//! finds its frame on the stack and either jumps back or pops it. When a
//! body has to be skipped (a false `WHILE`, a `FOR` that runs zero times,
//! `EXIT`, the untaken half of a block `IF`) the token stream is walked
//! forward, across lines, to the matching closer.

use super::{Flow, Interpreter};
use crate::error::{ErrorKind, Result};
use crate::program::{self, LINE_HEADER};
use crate::lvalue::{Lvalue, LvalueType};
use crate::stack::{FloatForFrame, Frame, FrameTag, IntForFrame};
use crate::tokenizer::*;
use crate::variables::{Number, VarType};

const FOR_TAGS: [FrameTag; 2] = [FrameTag::IntFor, FrameTag::FloatFor];

/// Token codes as the walker reports them; prefixed tokens are
/// `(prefix << 8) | second byte`
const FOR: u16 = TOK_FOR as u16;
const NEXT: u16 = TOK_NEXT as u16;
const REPEAT: u16 = TOK_REPEAT as u16;
const UNTIL: u16 = TOK_UNTIL as u16;
const THEN: u16 = TOK_THEN as u16;
const ELSE: u16 = TOK_ELSE as u16;
const WHILE: u16 = extended(XST_WHILE);
const ENDWHILE: u16 = extended(XST_ENDWHILE);
const ENDIF: u16 = extended(XST_ENDIF);
const EXIT: u16 = extended(XST_EXIT);

const fn extended(sub: u8) -> u16 {
    (PREFIX_STATEMENT as u16) << 8 | sub as u16
}

fn code_len(code: u16) -> usize {
    if code > 0xFF {
        2
    } else {
        1
    }
}

impl Interpreter {
    /// Visit every token from `from` onwards, crossing into following
    /// lines, until `visit` yields a position. `None` at the end of the
    /// program.
    fn walk<F>(&self, from: usize, mut visit: F) -> Result<Option<usize>>
    where
        F: FnMut(usize, u16, u16) -> Result<Option<usize>>,
    {
        let mut pos = from;
        let mut prev: u16 = 0;
        loop {
            let byte = self.ws.peek(pos)?;
            let code = match byte {
                PREFIX_FUNCTION | PREFIX_COMMAND | PREFIX_STATEMENT => {
                    (byte as u16) << 8 | self.ws.peek(pos + 1)? as u16
                }
                _ => byte as u16,
            };
            if let Some(found) = visit(pos, code, prev)? {
                return Ok(Some(found));
            }
            if byte == TOK_EOL {
                let line = pos + 1;
                if program::at_prog_end(&self.ws, line) {
                    return Ok(None);
                }
                pos = line + LINE_HEADER;
                prev = 0;
                continue;
            }
            let prev_byte = if prev > 0xFF { 0 } else { prev as u8 };
            pos = self.token_after(pos, prev_byte)?;
            prev = code;
        }
    }

    /// Position just after the closer matching an already open `open`.
    /// `nested` counts inner blocks of the same kind that are open too.
    fn skip_block(&self, from: usize, open: u16, close: u16, nested: usize) -> Result<Option<usize>> {
        let mut depth = nested;
        self.walk(from, |pos, code, prev| {
            if prev == EXIT {
                return Ok(None);
            }
            if code == open {
                depth += 1;
            } else if code == close {
                if depth == 0 {
                    return Ok(Some(pos + code_len(code)));
                }
                depth -= 1;
            }
            Ok(None)
        })
    }

    /// Skip the body of a `FOR` loop and carry on after its `NEXT`. A
    /// `NEXT` naming several variables closes several loops at once.
    fn skip_for_body(&mut self, from: usize, nested: usize) -> Result<Flow> {
        let mut depth = nested;
        let resume = self.walk(from, |pos, code, prev| {
            if prev == EXIT {
                return Ok(None);
            }
            match code {
                FOR => depth += 1,
                NEXT => {
                    let ends = self.next_name_ends(pos + 1)?;
                    if ends.len() > depth {
                        return Ok(Some(ends[depth]));
                    }
                    depth -= ends.len();
                }
                _ => {}
            }
            Ok(None)
        })?;
        self.current = resume.ok_or(ErrorKind::NoMatching("NEXT"))?;
        if self.accept(b',')? {
            return self.next_statement();
        }
        Ok(Flow::Continue)
    }

    /// End of each variable named by the `NEXT` whose operands start at
    /// `pos`; a bare `NEXT` closes one loop
    fn next_name_ends(&self, mut pos: usize) -> Result<Vec<usize>> {
        let mut ends = Vec::new();
        loop {
            let (name, end) = self.name_at(pos, true)?;
            if name.is_empty() {
                break;
            }
            ends.push(end);
            if self.ws.peek(end)? != b',' {
                break;
            }
            pos = end + 1;
        }
        if ends.is_empty() {
            ends.push(pos);
        }
        Ok(ends)
    }

    pub(super) fn if_statement(&mut self) -> Result<Flow> {
        let cond = self.eval_number()?.is_true();
        let then = self.accept(TOK_THEN)?;
        if then && self.peek()? == TOK_EOL {
            if !cond {
                self.current = self.skip_if_block(self.current, true)?;
            }
            return Ok(Flow::Continue);
        }
        if !cond {
            match self.else_on_line(self.current)? {
                Some(pos) => self.current = pos,
                None => {
                    self.skip_to_eol()?;
                    return Ok(Flow::Moved);
                }
            }
        }
        if self.peek()? == TOK_LINENUM {
            let line = self.line_target()?;
            return self.jump_to_line(line);
        }
        Ok(Flow::Moved)
    }

    /// `ELSE` reached by running off the end of the taken branch
    pub(super) fn else_statement(&mut self) -> Result<Flow> {
        if self.peek()? == TOK_EOL {
            self.current = self.skip_if_block(self.current, false)?;
            return Ok(Flow::Continue);
        }
        self.skip_to_eol()?;
        Ok(Flow::Moved)
    }

    /// Find where a block `IF` continues: after its `ENDIF`, or after a
    /// block `ELSE` when `stop_at_else` is set
    fn skip_if_block(&self, from: usize, stop_at_else: bool) -> Result<usize> {
        let mut depth = 0usize;
        let found = self.walk(from, |pos, code, _| {
            match code {
                THEN if self.ws.peek(pos + 1)? == TOK_EOL => depth += 1,
                ELSE if stop_at_else && depth == 0 && self.ws.peek(pos + 1)? == TOK_EOL => {
                    return Ok(Some(pos + 1));
                }
                ENDIF => {
                    if depth == 0 {
                        return Ok(Some(pos + 2));
                    }
                    depth -= 1;
                }
                _ => {}
            }
            Ok(None)
        })?;
        found.ok_or_else(|| ErrorKind::NoMatching("ENDIF").into())
    }

    /// Position after the first `ELSE` on the current line
    fn else_on_line(&self, from: usize) -> Result<Option<usize>> {
        let mut pos = from;
        let mut prev = 0;
        loop {
            match self.ws.peek(pos)? {
                TOK_EOL => return Ok(None),
                TOK_ELSE => return Ok(Some(pos + 1)),
                byte => {
                    let next = self.token_after(pos, prev)?;
                    prev = byte;
                    pos = next;
                }
            }
        }
    }

    pub(super) fn for_statement(&mut self) -> Result<Flow> {
        let var = self.resolve_lvalue(true)?;
        let integer = match var.ty {
            LvalueType::Scalar(VarType::Real) => false,
            LvalueType::Scalar(ty) if ty.is_numeric() => true,
            _ => return Err(ErrorKind::TypeMismatch.into()),
        };
        self.expect(b'=')?;
        let start = self.eval_number()?;
        if !self.accept(TOK_TO)? {
            return Err(ErrorKind::Syntax.into());
        }
        let limit = self.eval_number()?;
        let step = if self.accept(TOK_STEP)? {
            Some(self.eval_number()?)
        } else {
            None
        };
        self.storage().store_number(&var, start)?;

        // re-entering a loop on the same variable replaces it
        let top = self.stack.depth();
        let same = match self.stack.top() {
            Some(Frame::IntFor(f)) => f.var == var,
            Some(Frame::FloatFor(f)) => f.var == var,
            _ => false,
        };
        if same {
            self.unwind_to(top - 1, false)?;
        }

        let body = self.current;
        let (frame, runs) = if integer {
            let first = start.to_i64()?;
            let limit = limit.to_i64()?;
            let step_value = step.map_or(Ok(1), Number::to_i64)?;
            let runs = if step_value >= 0 {
                first <= limit
            } else {
                first >= limit
            };
            let simple = step.is_none() && var.ty == LvalueType::Scalar(VarType::Integer);
            let frame = Frame::IntFor(IntForFrame {
                var,
                body,
                limit,
                step: step_value,
                simple,
            });
            (frame, runs)
        } else {
            let first = start.to_f64();
            let limit = limit.to_f64();
            let step_value = step.map_or(1.0, Number::to_f64);
            let runs = if step_value >= 0.0 {
                first <= limit
            } else {
                first >= limit
            };
            let frame = Frame::FloatFor(FloatForFrame {
                var,
                body,
                limit,
                step: step_value,
            });
            (frame, runs)
        };
        if !runs {
            return self.skip_for_body(body, 0);
        }
        self.stack.push(&mut self.ws, frame)?;
        Ok(Flow::Continue)
    }

    /// `NEXT [var[, var...]]`. Naming a variable discards any inner loops
    /// that use other variables.
    pub(super) fn next_statement(&mut self) -> Result<Flow> {
        loop {
            let named = if self.at_statement_end()? || self.peek()? == b',' {
                None
            } else {
                Some(self.resolve_lvalue(false)?)
            };
            let index = self.find_for(named)?;
            if self.step_loop(index)? {
                self.unwind_to(index + 1, false)?;
                return Ok(Flow::Moved);
            }
            self.unwind_to(index, false)?;
            if !self.accept(b',')? {
                return Ok(Flow::Continue);
            }
        }
    }

    fn find_for(&mut self, named: Option<Lvalue>) -> Result<usize> {
        loop {
            let index = self.stack.find_loop(&FOR_TAGS)?;
            let var = match self.stack.get(index) {
                Some(Frame::IntFor(f)) => f.var,
                Some(Frame::FloatFor(f)) => f.var,
                _ => return Err(ErrorKind::Broken("loop frame expected").into()),
            };
            match named {
                Some(lv) if lv != var => self.unwind_to(index, false)?,
                _ => return Ok(index),
            }
        }
    }

    /// Advance the control variable of the loop at `index`. True when the
    /// body should run again, in which case `current` is at the body.
    fn step_loop(&mut self, index: usize) -> Result<bool> {
        match self.stack.get(index).cloned() {
            Some(Frame::IntFor(f)) => {
                let value = self.load_value(&f.var)?;
                let current = self.to_number(value)?.to_i64()?;
                let step = if f.simple { 1 } else { f.step };
                let next = match current.checked_add(step) {
                    Some(next) => next,
                    None => return Ok(false),
                };
                self.storage().store_number(&f.var, Number::from_i64(next))?;
                let again = if step >= 0 {
                    next <= f.limit
                } else {
                    next >= f.limit
                };
                if again {
                    self.current = f.body;
                }
                Ok(again)
            }
            Some(Frame::FloatFor(f)) => {
                let value = self.load_value(&f.var)?;
                let next = self.to_number(value)?.to_f64() + f.step;
                self.storage().store_number(&f.var, Number::Float(next))?;
                let again = if f.step >= 0.0 {
                    next <= f.limit
                } else {
                    next >= f.limit
                };
                if again {
                    self.current = f.body;
                }
                Ok(again)
            }
            _ => Err(ErrorKind::Broken("loop frame expected").into()),
        }
    }

    pub(super) fn repeat_statement(&mut self) -> Result<Flow> {
        let body = self.current;
        self.stack.push(&mut self.ws, Frame::Repeat { body })?;
        // the body may follow REPEAT without a separator
        Ok(Flow::Moved)
    }

    pub(super) fn until_statement(&mut self) -> Result<Flow> {
        let index = self.stack.find_loop(&[FrameTag::Repeat])?;
        let body = match self.stack.get(index) {
            Some(Frame::Repeat { body }) => *body,
            _ => return Err(ErrorKind::Broken("loop frame expected").into()),
        };
        self.unwind_to(index + 1, false)?;
        if self.eval_number()?.is_true() {
            self.unwind_to(index, false)?;
            return Ok(Flow::Continue);
        }
        self.current = body;
        Ok(Flow::Moved)
    }

    pub(super) fn while_statement(&mut self) -> Result<Flow> {
        let cond = self.current;
        if self.eval_number()?.is_true() {
            let body = self.current;
            self.stack.push(&mut self.ws, Frame::While { cond, body })?;
            return Ok(Flow::Continue);
        }
        let after = self.skip_block(self.current, WHILE, ENDWHILE, 0)?;
        self.current = after.ok_or(ErrorKind::NoMatching("ENDWHILE"))?;
        Ok(Flow::Continue)
    }

    pub(super) fn endwhile_statement(&mut self) -> Result<Flow> {
        let index = self.stack.find_loop(&[FrameTag::While])?;
        let (cond, body) = match self.stack.get(index) {
            Some(Frame::While { cond, body }) => (*cond, *body),
            _ => return Err(ErrorKind::Broken("loop frame expected").into()),
        };
        self.unwind_to(index + 1, false)?;
        let after = self.current;
        self.current = cond;
        if self.eval_number()?.is_true() {
            self.current = body;
            return Ok(Flow::Moved);
        }
        self.unwind_to(index, false)?;
        self.current = after;
        Ok(Flow::Continue)
    }

    /// `EXIT FOR [var]`, `EXIT REPEAT` and `EXIT WHILE` leave the innermost
    /// loop of that kind, even from inside loops of another kind
    pub(super) fn exit_statement(&mut self) -> Result<Flow> {
        let token = self.next_byte()?;
        let (tags, keyword): (&[FrameTag], &'static str) = match token {
            TOK_FOR => (&FOR_TAGS[..], "FOR"),
            TOK_REPEAT => (&[FrameTag::Repeat][..], "REPEAT"),
            PREFIX_STATEMENT if self.accept(XST_WHILE)? => (&[FrameTag::While][..], "WHILE"),
            _ => return Err(ErrorKind::Syntax.into()),
        };
        let named = if token == TOK_FOR && !self.at_statement_end()? {
            Some(self.resolve_lvalue(false)?)
        } else {
            None
        };
        let floor = self.call_chain.map_or(0, |index| index + 1);
        let index = self
            .stack
            .find_innermost(floor, |frame| {
                tags.contains(&frame.tag())
                    && match frame {
                        Frame::IntFor(f) => named.map_or(true, |lv| lv == f.var),
                        Frame::FloatFor(f) => named.map_or(true, |lv| lv == f.var),
                        _ => true,
                    }
            })
            .ok_or(ErrorKind::NoMatching(keyword))?;
        let nested = self
            .stack
            .iter()
            .skip(index + 1)
            .filter(|frame| tags.contains(&frame.tag()))
            .count();
        self.unwind_to(index, false)?;

        let from = self.current;
        match token {
            TOK_FOR => self.skip_for_body(from, nested),
            TOK_REPEAT => {
                let after = self.skip_block(from, REPEAT, UNTIL, nested)?;
                self.current = after.ok_or(ErrorKind::NoMatching("UNTIL"))?;
                self.skip_statement()?;
                Ok(Flow::Continue)
            }
            _ => {
                let after = self.skip_block(from, WHILE, ENDWHILE, nested)?;
                self.current = after.ok_or(ErrorKind::NoMatching("ENDWHILE"))?;
                Ok(Flow::Continue)
            }
        }
    }

    /// A line number after `GOTO`, `GOSUB`, `RESTORE` and friends, either
    /// encoded or computed
    pub(super) fn line_target(&mut self) -> Result<u16> {
        if self.accept(TOK_LINENUM)? {
            let number = self.ws.read_u16(self.current)?;
            self.current += 2;
            return Ok(number);
        }
        let number = self.eval_i64()?;
        u16::try_from(number)
            .ok()
            .filter(|&n| u32::from(n) <= MAX_LINE_NUMBER)
            .ok_or_else(|| ErrorKind::LineNo.into())
    }

    fn line_address(&self, number: u16) -> Result<usize> {
        let addr = program::find_line(&self.ws, number)?.ok_or(ErrorKind::LineMiss)?;
        Ok(addr + LINE_HEADER)
    }

    fn jump_to_line(&mut self, number: u16) -> Result<Flow> {
        self.poll_escape()?;
        self.current = self.line_address(number)?;
        Ok(Flow::Moved)
    }

    fn gosub_to(&mut self, number: u16, ret: usize) -> Result<Flow> {
        self.poll_escape()?;
        let target = self.line_address(number)?;
        let index = self.stack.depth();
        let prev = self.gosub_chain;
        self.stack.push(&mut self.ws, Frame::Gosub { ret, prev })?;
        self.gosub_chain = Some(index);
        self.current = target;
        Ok(Flow::Moved)
    }

    pub(super) fn goto_statement(&mut self) -> Result<Flow> {
        let line = self.line_target()?;
        self.jump_to_line(line)
    }

    pub(super) fn gosub_statement(&mut self) -> Result<Flow> {
        let line = self.line_target()?;
        let ret = self.current;
        self.gosub_to(line, ret)
    }

    /// `RETURN` from the innermost `GOSUB`, which must belong to the
    /// current procedure
    pub(super) fn return_statement(&mut self) -> Result<Flow> {
        let index = self.gosub_chain.ok_or(ErrorKind::NoMatching("GOSUB"))?;
        if self.call_chain.map_or(false, |call| call > index) {
            return Err(ErrorKind::NoMatching("GOSUB").into());
        }
        let ret = match self.stack.get(index) {
            Some(Frame::Gosub { ret, .. }) => *ret,
            _ => return Err(ErrorKind::Broken("GOSUB frame expected").into()),
        };
        self.unwind_to(index, false)?;
        self.current = ret;
        Ok(Flow::Continue)
    }

    /// `ON ERROR ...` or `ON expr GOTO|GOSUB|PROC list [ELSE statements]`
    pub(super) fn on_statement(&mut self) -> Result<Flow> {
        if self.accept(TOK_ERROR)? {
            return self.on_error_statement();
        }
        let selector = self.eval_i64()?;
        let kind = self.next_byte()?;
        if !matches!(kind, TOK_GOTO | TOK_GOSUB | TOK_PROC) {
            return Err(ErrorKind::Syntax.into());
        }
        let mut entry = None;
        let mut position = 1;
        loop {
            if position == selector {
                entry = Some(self.current);
            }
            self.skip_list_item()?;
            if !self.accept(b',')? {
                break;
            }
            position += 1;
        }
        let entry = match entry {
            Some(entry) => entry,
            None if self.accept(TOK_ELSE)? => return Ok(Flow::Moved),
            None => return Err(ErrorKind::OnRange.into()),
        };
        if self.peek()? == TOK_ELSE {
            self.skip_to_eol()?;
        }
        let end = self.current;
        self.current = entry;
        match kind {
            TOK_GOTO => {
                let line = self.line_target()?;
                self.jump_to_line(line)
            }
            TOK_GOSUB => {
                let line = self.line_target()?;
                self.gosub_to(line, end)
            }
            _ => {
                self.accept(TOK_PROC)?;
                self.proc_statement(Some(end))
            }
        }
    }

    /// Step over one entry of an `ON` list, brackets included
    fn skip_list_item(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.peek()? {
                TOK_EOL => return Ok(()),
                b',' | b':' | TOK_ELSE if depth == 0 => return Ok(()),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.current = self.token_after(self.current, 0)?;
        }
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
        assert_eq!(interp.stack().depth(), 0);
        interp.take_output()
    }

    #[test]
    fn test_single_line_if() {
        assert_eq!(
            output("10 x = 3\n20 IF x > 2 THEN PRINT \"big\" ELSE PRINT \"small\"\n30 IF x < 2 PRINT \"no\" ELSE PRINT \"yes\""),
            "big\nyes\n"
        );
        assert_eq!(output("10 IF 0 THEN 30\n20 PRINT \"a\"\n30 PRINT \"b\""), "a\nb\n");
        assert_eq!(output("10 IF 1 THEN 30\n20 PRINT \"a\"\n30 PRINT \"b\""), "b\n");
    }

    #[test]
    fn test_block_if() {
        let source = "10 FOR i% = 1 TO 3\n\
                      20 IF i% = 2 THEN\n\
                      30 PRINT \"two\"\n\
                      40 ELSE\n\
                      50 IF i% = 1 THEN\n\
                      60 PRINT \"one\"\n\
                      70 ENDIF\n\
                      80 PRINT \"not two\"\n\
                      90 ENDIF\n\
                      100 NEXT";
        assert_eq!(output(source), "one\nnot two\ntwo\nnot two\n");
    }

    #[test]
    fn test_for_loops() {
        assert_eq!(output("10 FOR i% = 1 TO 3: PRINT ;i%;: NEXT: PRINT"), "123\n");
        assert_eq!(output("10 FOR x = 1 TO 0 STEP -0.5: PRINT ;x;\" \";: NEXT x: PRINT"), "1 0.5 0 \n");
        assert_eq!(output("10 FOR i% = 10 TO 1 STEP -3: PRINT ;i%;: NEXT: PRINT"), "10741\n");
    }

    #[test]
    fn test_zero_trip_for_skips_body() {
        let source = "10 FOR i% = 1 TO 0\n\
                      20 FOR j% = 1 TO 2: PRINT \"inner\": NEXT j%\n\
                      30 PRINT \"body\"\n\
                      40 NEXT i%\n\
                      50 PRINT \"done\"";
        assert_eq!(output(source), "done\n");
    }

    #[test]
    fn test_next_closes_several_loops() {
        let source = "10 FOR i% = 1 TO 2: FOR j% = 1 TO 2\n\
                      20 PRINT ;i%;j%;\" \";\n\
                      30 NEXT j%, i%\n\
                      40 PRINT";
        assert_eq!(output(source), "11 12 21 22 \n");
    }

    #[test]
    fn test_repeat_and_while() {
        assert_eq!(output("10 n% = 0: REPEAT n% += 1: UNTIL n% = 4: PRINT ;n%"), "4\n");
        assert_eq!(
            output("10 n% = 3\n20 WHILE n% > 0: PRINT ;n%;: n% -= 1: ENDWHILE\n30 PRINT"),
            "321\n"
        );
        assert_eq!(
            output("10 WHILE FALSE\n20 PRINT \"never\"\n30 ENDWHILE\n40 PRINT \"after\""),
            "after\n"
        );
    }

    #[test]
    fn test_exit_loops() {
        let source = "10 FOR i% = 1 TO 10\n\
                      20 IF i% = 3 THEN EXIT FOR\n\
                      30 PRINT ;i%;\n\
                      40 NEXT\n\
                      50 PRINT \" i=\";i%\n\
                      60 n% = 0: REPEAT: n% += 1: IF n% = 5 EXIT REPEAT\n\
                      70 UNTIL FALSE\n\
                      80 PRINT ;n%\n\
                      90 WHILE TRUE: EXIT WHILE: ENDWHILE\n\
                      100 PRINT \"out\"";
        assert_eq!(output(source), "12 i=3\n5\nout\n");
    }

    #[test]
    fn test_gosub_and_return() {
        let source = "10 GOSUB 100: PRINT \"back\"\n\
                      20 END\n\
                      100 PRINT \"sub\"\n\
                      110 RETURN";
        assert_eq!(output(source), "sub\nback\n");
        assert_eq!(
            run("10 RETURN").1.unwrap_err().kind,
            ErrorKind::NoMatching("GOSUB")
        );
    }

    #[test]
    fn test_goto_missing_line() {
        let (_, outcome) = run("10 GOTO 500");
        let err = outcome.unwrap_err();
        assert_eq!(err.kind, ErrorKind::LineMiss);
        assert_eq!(err.line, Some(10));
    }

    #[test]
    fn test_on_goto_gosub_proc() {
        let source = "10 FOR k% = 1 TO 3\n\
                      20 ON k% GOTO 30, 40, 50\n\
                      30 PRINT \"a\": GOTO 60\n\
                      40 PRINT \"b\": GOTO 60\n\
                      50 PRINT \"c\"\n\
                      60 NEXT\n\
                      70 ON 2 GOSUB 200, 210: PRINT \"after\"\n\
                      80 ON 1 PROCx, PROCy: PRINT \"done\"\n\
                      90 ON 9 GOTO 30 ELSE PRINT \"else\"\n\
                      100 END\n\
                      200 PRINT \"s1\": RETURN\n\
                      210 PRINT \"s2\": RETURN\n\
                      300 DEF PROCx: PRINT \"x\": ENDPROC\n\
                      310 DEF PROCy: PRINT \"y\": ENDPROC";
        assert_eq!(output(source), "a\nb\nc\ns2\nafter\nx\ndone\nelse\n");
        assert_eq!(run("10 ON 3 GOTO 10, 10").1.unwrap_err().kind, ErrorKind::OnRange);
    }

    #[test]
    fn test_unmatched_loop_closers() {
        assert_eq!(run("10 NEXT").1.unwrap_err().kind, ErrorKind::NoMatching("FOR"));
        assert_eq!(run("10 UNTIL TRUE").1.unwrap_err().kind, ErrorKind::NoMatching("REPEAT"));
        assert_eq!(run("10 ENDWHILE").1.unwrap_err().kind, ErrorKind::NoMatching("WHILE"));
    }
}
