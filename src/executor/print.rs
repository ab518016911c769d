//! `PRINT` and `INPUT`, on the screen and on file channels

use super::functions::val_number;
use super::{Flow, Interpreter, Value};
use crate::error::{ErrorKind, Result};
use crate::format::{self, Format};
use crate::lvalue::Lvalue;
use crate::tokenizer::*;
use crate::variables::{Number, FORMAT_SLOT};
use std::collections::VecDeque;

impl Interpreter {
    /// `PRINT` items separated by `,` (tabulate), `;` (run on), `'`
    /// (newline), `TAB(`, `SPC` and `~` (hex). Numbers are right-justified
    /// to the `@%` field width until a `;` is seen; a `,` turns that back on.
    pub(super) fn print_statement(&mut self) -> Result<Flow> {
        if self.accept(b'#')? {
            return self.print_to_channel();
        }
        let mut justify = true;
        let mut hex = false;
        let mut newline = true;
        while !self.at_statement_end()? {
            match self.peek()? {
                b';' => {
                    self.current += 1;
                    justify = false;
                    newline = false;
                }
                b',' => {
                    self.current += 1;
                    self.tabulate();
                    justify = true;
                    newline = false;
                }
                b'~' => {
                    self.current += 1;
                    hex = true;
                }
                b'\'' | TOK_TAB | TOK_SPC => {
                    self.print_layout()?;
                    newline = true;
                }
                _ => {
                    let value = self.eval()?;
                    self.print_value(value, justify, hex)?;
                    hex = false;
                    newline = true;
                }
            }
        }
        if newline {
            self.host.screen.newline();
        }
        Ok(Flow::Continue)
    }

    fn print_value(&mut self, value: Value, justify: bool, hex: bool) -> Result<()> {
        let number = match value.number() {
            Some(n) => n,
            None => {
                let text = self.to_bytes(value)?;
                self.host.screen.vdu_string(&text);
                return Ok(());
            }
        };
        let word = self.vars.get_static(FORMAT_SLOT);
        let mut text = if hex {
            format::format_hex(number)?
        } else {
            format::format_number(word, number)
        };
        if justify {
            text = format::justify(&text, Format::from_word(word).width);
        }
        self.host.screen.vdu_string(text.as_bytes());
        Ok(())
    }

    /// Pad to the next multiple of the `@%` field width
    fn tabulate(&mut self) {
        let width = Format::from_word(self.vars.get_static(FORMAT_SLOT)).width as i32;
        if width == 0 {
            return;
        }
        let column = self.host.screen.pos();
        if column % width != 0 {
            self.host.screen.tab_to((column / width + 1) * width, None);
        }
    }

    /// `'`, `TAB(x)`, `TAB(x,y)` and `SPC n`, which `INPUT` accepts too
    fn print_layout(&mut self) -> Result<()> {
        match self.next_byte()? {
            b'\'' => self.host.screen.newline(),
            TOK_TAB => {
                let x = self.eval_int()?;
                let y = if self.accept(b',')? {
                    Some(self.eval_int()?)
                } else {
                    None
                };
                self.expect(b')')?;
                self.host.screen.tab_to(x, y);
            }
            _ => {
                let count = self.eval_factor_number()?.to_i32()?;
                for _ in 0..count.clamp(0, 255) {
                    self.host.screen.vdu_byte(b' ');
                }
            }
        }
        Ok(())
    }

    /// `PRINT#h, item, ...` writes one tagged record per item
    fn print_to_channel(&mut self) -> Result<Flow> {
        let handle = self.channel()?;
        while self.accept(b',')? {
            let value = self.eval()?;
            match value.number() {
                Some(Number::Int(v)) => self.host.files.print_int(handle, v)?,
                Some(Number::Int64(v)) => self.host.files.print_i64(handle, v)?,
                Some(Number::Float(v)) => self.host.files.print_float(handle, v)?,
                None => {
                    let text = self.to_bytes(value)?;
                    self.host.files.print_string(handle, &text)?;
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// `INPUT [LINE] ["prompt"{,|;}] var, ...`. A `?` is shown before a
    /// reply unless a prompt string stands directly in front of the
    /// variable. One reply may answer several variables, split at commas.
    pub(super) fn input_statement(&mut self) -> Result<Flow> {
        if self.accept(b'#')? {
            return self.input_from_channel();
        }
        let whole_line = self.accept(TOK_LINE)?;
        let mut fields: VecDeque<Vec<u8>> = VecDeque::new();
        let mut question = true;
        while !self.at_statement_end()? {
            match self.peek()? {
                b',' | b';' => {
                    self.current += 1;
                    question = true;
                }
                TOK_STRCON => {
                    self.current += 1;
                    let len = self.ws.read_u16(self.current)? as usize;
                    let prompt = self.ws.bytes(self.current + 2, len)?.to_vec();
                    self.current += 2 + len;
                    self.host.screen.vdu_string(&prompt);
                    fields.clear();
                    question = false;
                }
                b'\'' | TOK_TAB | TOK_SPC => self.print_layout()?,
                _ => {
                    let lv = self.resolve_lvalue(true)?;
                    if fields.is_empty() {
                        if question {
                            self.host.screen.vdu_byte(b'?');
                        }
                        let reply = self.read_reply()?;
                        if whole_line {
                            fields.push_back(reply);
                        } else {
                            fields.extend(split_fields(&reply));
                        }
                    }
                    let field = fields.pop_front().unwrap_or_default();
                    self.store_input(&lv, &field)?;
                    question = true;
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn read_reply(&mut self) -> Result<Vec<u8>> {
        self.poll_escape()?;
        let max = self.config.max_string_len;
        match self.host.keyboard.read_line(max) {
            Some(line) => {
                self.host.screen.echo_input(&line);
                Ok(line.into_bytes())
            }
            None => Err(ErrorKind::Escape.into()),
        }
    }

    fn store_input(&mut self, lv: &Lvalue, field: &[u8]) -> Result<()> {
        let value = if lv.is_string() {
            self.string_value(field)?
        } else {
            val_number(field).into()
        };
        self.store_value(lv, value)
    }

    /// `INPUT#h, var, ...` reads back what `PRINT#` wrote
    fn input_from_channel(&mut self) -> Result<Flow> {
        let handle = self.channel()?;
        while self.accept(b',')? {
            let lv = self.resolve_lvalue(true)?;
            let value = if lv.is_string() {
                let text = self.host.files.get_string(handle)?;
                self.string_value(&text)?
            } else {
                self.host.files.get_number(handle)?.into()
            };
            self.store_value(&lv, value)?;
        }
        Ok(Flow::Continue)
    }
}

/// Split an `INPUT` reply at commas outside quotes. Leading spaces are
/// dropped and quoted fields lose their quotes, `""` standing for `"`.
fn split_fields(line: &[u8]) -> Vec<Vec<u8>> {
    let mut fields = Vec::new();
    let mut rest = line;
    loop {
        let start = rest.iter().position(|&b| b != b' ').unwrap_or(rest.len());
        rest = &rest[start..];
        let mut field = Vec::new();
        if rest.first() == Some(&b'"') {
            let mut i = 1;
            while let Some(&byte) = rest.get(i) {
                i += 1;
                if byte == b'"' {
                    if rest.get(i) != Some(&b'"') {
                        break;
                    }
                    i += 1;
                }
                field.push(byte);
            }
            rest = &rest[i.min(rest.len())..];
            fields.push(field);
            match rest.iter().position(|&b| b == b',') {
                Some(comma) => rest = &rest[comma + 1..],
                None => return fields,
            }
        } else {
            match rest.iter().position(|&b| b == b',') {
                Some(comma) => {
                    field.extend_from_slice(&rest[..comma]);
                    fields.push(field);
                    rest = &rest[comma + 1..];
                }
                None => {
                    field.extend_from_slice(rest);
                    fields.push(field);
                    return fields;
                }
            }
        }
    }
}
