//! `READ` and `RESTORE`

use super::functions::val_number;
use super::{Flow, Interpreter};
use crate::error::{ErrorKind, Result};
use crate::program::{self, DataCursor};
use crate::tokenizer::*;
use log::trace;

impl Interpreter {
    /// `READ var, ...`
    pub(super) fn read_statement(&mut self) -> Result<Flow> {
        loop {
            let lv = self.resolve_lvalue(true)?;
            let item = self.next_data_item()?;
            let value = if lv.is_string() {
                self.string_value(&item)?
            } else {
                val_number(&item).into()
            };
            self.store_value(&lv, value)?;
            if !self.accept(b',')? {
                return Ok(Flow::Continue);
            }
        }
    }

    /// `RESTORE`, `RESTORE line`, `RESTORE DATA` and `RESTORE ERROR`
    pub(super) fn restore_statement(&mut self) -> Result<Flow> {
        let token = self.peek()?;
        if token == TOK_DATA || token == TOK_ERROR {
            self.current += 1;
            return self.restore_saved(token);
        }
        if self.at_statement_end()? {
            self.data_cursor = DataCursor::Start;
            return Ok(Flow::Continue);
        }
        let number = self.line_target()?;
        let addr = program::find_line(&self.ws, number)?.ok_or(ErrorKind::LineMiss)?;
        self.data_cursor = DataCursor::FromLine(addr);
        Ok(Flow::Continue)
    }

    /// Take the next item from the `DATA` statements, moving on to the
    /// next `DATA` line when the current one is used up
    fn next_data_item(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.data_cursor {
                DataCursor::Start => self.data_cursor = DataCursor::FromLine(self.ws.page),
                DataCursor::FromLine(line) => {
                    let item = program::find_data(&self.ws, line)?.ok_or(ErrorKind::OutOfData)?;
                    self.data_cursor = DataCursor::Item(item);
                }
                DataCursor::Item(mut pos) => {
                    while self.ws.peek(pos)? == b' ' {
                        pos += 1;
                    }
                    if self.ws.peek(pos)? == TOK_EOL {
                        self.data_cursor = DataCursor::FromLine(pos + 1);
                        continue;
                    }
                    let (item, end) = self.data_item_at(pos)?;
                    let next = if self.ws.peek(end)? == b',' { end + 1 } else { end };
                    self.data_cursor = DataCursor::Item(next);
                    trace!("DATA item {:?}", String::from_utf8_lossy(&item));
                    return Ok(item);
                }
            }
        }
    }

    /// One item of raw `DATA` text starting at `pos` and the address of
    /// the `,` or end of line after it. Quotes are removed from a quoted
    /// item, with `""` standing for `"`.
    fn data_item_at(&self, mut pos: usize) -> Result<(Vec<u8>, usize)> {
        let mut item = Vec::new();
        if self.ws.peek(pos)? == b'"' {
            pos += 1;
            loop {
                match self.ws.peek(pos)? {
                    TOK_EOL => break,
                    b'"' if self.ws.peek(pos + 1)? == b'"' => {
                        item.push(b'"');
                        pos += 2;
                    }
                    b'"' => {
                        pos += 1;
                        break;
                    }
                    byte => {
                        item.push(byte);
                        pos += 1;
                    }
                }
            }
            while !matches!(self.ws.peek(pos)?, b',' | TOK_EOL) {
                pos += 1;
            }
            return Ok((item, pos));
        }
        loop {
            match self.ws.peek(pos)? {
                b',' | TOK_EOL => return Ok((item, pos)),
                byte => {
                    item.push(byte);
                    pos += 1;
                }
            }
        }
    }
}
