//! Program storage and management
//!
//! Lines are edited in a `ProgramStore` keyed by line number and then laid
//! out in the workspace from PAGE as
//! `[line number u16][length u16][tokens...][0x0D]`, terminated by a line
//! numbered `0xFFFF`. The free functions here read that layout.

use crate::error::{ErrorKind, Result};
use crate::memory::Workspace;
use crate::tokenizer::{tokenize, TOK_DATA, TOK_EOL};
use log::debug;
use std::collections::BTreeMap;

/// Bytes before the first token of a line
pub const LINE_HEADER: usize = 4;
/// Line number of the end-of-program marker
pub const END_MARKER: u16 = 0xFFFF;
/// Line number given to the command line buffer
pub const IMMEDIATE_LINE: u16 = 0xFFFE;

/// Where the next `READ` takes its item from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCursor {
    /// Search for DATA from the start of the program
    Start,
    /// Search for DATA from the line starting at this address
    FromLine(usize),
    /// Next item starts at this address inside a DATA line
    Item(usize),
}

/// Program line storage
#[derive(Debug, Clone)]
pub struct ProgramStore {
    lines: BTreeMap<u16, Vec<u8>>,
}

impl ProgramStore {
    /// Create a new program store
    pub fn new() -> Self {
        Self {
            lines: BTreeMap::new(),
        }
    }

    /// Tokenise program text. Lines without a number are numbered ten
    /// past the previous one.
    pub fn from_source(text: &str) -> Result<Self> {
        let mut store = Self::new();
        let mut last: u32 = 0;
        for source in text.lines() {
            if source.trim().is_empty() {
                continue;
            }
            let line = tokenize(source)?;
            let number = match line.line_number {
                Some(n) => n as u32,
                None => last + 10,
            };
            if number > crate::tokenizer::MAX_LINE_NUMBER {
                return Err(ErrorKind::LineNo.into());
            }
            store.store_line(number as u16, line.tokens);
            last = number;
        }
        Ok(store)
    }

    /// Read back the program currently laid out in the workspace
    pub fn from_workspace(ws: &Workspace) -> Result<Self> {
        let mut store = Self::new();
        let mut addr = ws.page;
        while !at_prog_end(ws, addr) {
            let len = line_len(ws, addr)?;
            let tokens = ws.bytes(addr + LINE_HEADER, len - LINE_HEADER - 1)?;
            store.store_line(line_no(ws, addr)?, tokens.to_vec());
            addr += len;
        }
        Ok(store)
    }

    /// Store a program line
    pub fn store_line(&mut self, line_number: u16, tokenized_data: Vec<u8>) {
        self.lines.insert(line_number, tokenized_data);
    }

    /// Get a program line
    pub fn get_line(&self, line_number: u16) -> Option<&Vec<u8>> {
        self.lines.get(&line_number)
    }

    /// Delete a program line
    pub fn delete_line(&mut self, line_number: u16) {
        self.lines.remove(&line_number);
    }

    /// Clear all program lines
    pub fn clear_program(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lay the program out from PAGE and move TOP (and the heap) above it
    pub fn write_to(&self, ws: &mut Workspace) -> Result<()> {
        let mut image = Vec::new();
        for (&number, tokens) in &self.lines {
            let len = LINE_HEADER + tokens.len() + 1;
            let len = u16::try_from(len).map_err(|_| ErrorKind::StringLen)?;
            image.extend_from_slice(&number.to_le_bytes());
            image.extend_from_slice(&len.to_le_bytes());
            image.extend_from_slice(tokens);
            image.push(TOK_EOL);
        }
        image.extend_from_slice(&END_MARKER.to_le_bytes());
        image.extend_from_slice(&(LINE_HEADER as u16).to_le_bytes());

        let top = ws.page + image.len();
        let margin = ws.stacklimit - ws.vartop;
        if top + margin > ws.stacktop {
            return Err(ErrorKind::NoRoom.into());
        }
        ws.write_bytes(ws.page, &image)?;
        ws.set_top(top);
        debug!("program of {} lines, top at {:#x}", self.lines.len(), top);
        Ok(())
    }
}

impl Default for ProgramStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Line number of the line starting at `addr`
pub fn line_no(ws: &Workspace, addr: usize) -> Result<u16> {
    ws.read_u16(addr)
}

/// Total length of the line starting at `addr`, header and EOL included
pub fn line_len(ws: &Workspace, addr: usize) -> Result<usize> {
    let len = ws.read_u16(addr + 2)? as usize;
    if len < LINE_HEADER + 1 {
        return Err(ErrorKind::BadProg.into());
    }
    Ok(len)
}

/// True when `addr` holds the end-of-program marker (or is unreadable)
pub fn at_prog_end(ws: &Workspace, addr: usize) -> bool {
    !matches!(line_no(ws, addr), Ok(n) if n != END_MARKER)
}

/// Address of line `number`, if the program has it
pub fn find_line(ws: &Workspace, number: u16) -> Result<Option<usize>> {
    let mut addr = ws.page;
    while !at_prog_end(ws, addr) {
        let n = line_no(ws, addr)?;
        if n == number {
            return Ok(Some(addr));
        }
        if n > number {
            break;
        }
        addr += line_len(ws, addr)?;
    }
    Ok(None)
}

/// Number of the program line holding `addr`; `None` outside the program
pub fn line_containing(ws: &Workspace, addr: usize) -> Option<u16> {
    if addr < ws.page || addr >= ws.top {
        return None;
    }
    let mut line = ws.page;
    while !at_prog_end(ws, line) {
        let len = line_len(ws, line).ok()?;
        if addr < line + len {
            return line_no(ws, line).ok();
        }
        line += len;
    }
    None
}

/// Write a tokenised command line at `base` and return the address of its
/// first token. The line is followed by an end marker so that running off
/// its end stops execution.
pub fn write_immediate(ws: &mut Workspace, base: usize, limit: usize, tokens: &[u8]) -> Result<usize> {
    let len = LINE_HEADER + tokens.len() + 1;
    if len + LINE_HEADER > limit {
        return Err(ErrorKind::StringLen.into());
    }
    ws.write_u16(base, IMMEDIATE_LINE)?;
    ws.write_u16(base + 2, len as u16)?;
    ws.write_bytes(base + LINE_HEADER, tokens)?;
    ws.poke(base + len - 1, TOK_EOL)?;
    ws.write_u16(base + len, END_MARKER)?;
    ws.write_u16(base + len + 2, LINE_HEADER as u16)?;
    Ok(base + LINE_HEADER)
}

/// Find the first line at or after `from` whose first statement is DATA and
/// return the address of its raw text
pub fn find_data(ws: &Workspace, from: usize) -> Result<Option<usize>> {
    let mut addr = from;
    while !at_prog_end(ws, addr) {
        if ws.peek(addr + LINE_HEADER)? == TOK_DATA {
            return Ok(Some(addr + LINE_HEADER + 1));
        }
        addr += line_len(ws, addr)?;
    }
    Ok(None)
}

/// Walk the program checking the line structure
pub fn check_program(ws: &Workspace) -> Result<()> {
    let mut addr = ws.page;
    let mut last: Option<u16> = None;
    while !at_prog_end(ws, addr) {
        let n = line_no(ws, addr)?;
        let len = line_len(ws, addr)?;
        if last.map_or(false, |prev| prev >= n)
            || addr + len > ws.top
            || ws.peek(addr + len - 1)? != TOK_EOL
        {
            return Err(ErrorKind::BadProg.into());
        }
        last = Some(n);
        addr += len;
    }
    if addr + LINE_HEADER != ws.top {
        return Err(ErrorKind::BadProg.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DEFAULT_MARGIN, DEFAULT_WORKSPACE, SCRATCH_BASE, SCRATCH_SIZE};
    use crate::tokenizer::TOK_PRINT;

    fn loaded(text: &str) -> Workspace {
        let mut ws = Workspace::new(DEFAULT_WORKSPACE, DEFAULT_MARGIN).unwrap();
        ProgramStore::from_source(text).unwrap().write_to(&mut ws).unwrap();
        ws
    }

    #[test]
    fn test_store_and_delete_lines() {
        let mut store = ProgramStore::new();
        store.store_line(20, vec![TOK_PRINT]);
        store.store_line(10, vec![TOK_PRINT]);
        assert_eq!(store.len(), 2);
        store.delete_line(20);
        assert!(store.get_line(20).is_none());
        store.clear_program();
        assert!(store.is_empty());
    }

    #[test]
    fn test_layout_in_workspace() {
        let ws = loaded("20 PRINT\n10 END\n");
        assert_eq!(line_no(&ws, ws.page).unwrap(), 10);
        let second = ws.page + line_len(&ws, ws.page).unwrap();
        assert_eq!(line_no(&ws, second).unwrap(), 20);
        assert_eq!(find_line(&ws, 20).unwrap(), Some(second));
        assert_eq!(find_line(&ws, 15).unwrap(), None);
        assert_eq!(ws.lomem, ws.top);
        check_program(&ws).unwrap();
    }

    #[test]
    fn test_unnumbered_lines_are_numbered() {
        let ws = loaded("PRINT 1\nPRINT 2\n");
        assert!(find_line(&ws, 10).unwrap().is_some());
        assert!(find_line(&ws, 20).unwrap().is_some());
    }

    #[test]
    fn test_line_containing() {
        let ws = loaded("10 PRINT 1\n20 PRINT 2\n");
        let second = find_line(&ws, 20).unwrap().unwrap();
        assert_eq!(line_containing(&ws, second + LINE_HEADER), Some(20));
        assert_eq!(line_containing(&ws, 0), None);
    }

    #[test]
    fn test_round_trip_through_workspace() {
        let ws = loaded("10 PRINT 1\n20 END\n");
        let store = ProgramStore::from_workspace(&ws).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_line(20), Some(&vec![crate::tokenizer::TOK_END]));
    }

    #[test]
    fn test_immediate_line_is_terminated() {
        let mut ws = loaded("");
        let start = write_immediate(&mut ws, SCRATCH_BASE, SCRATCH_SIZE, &[TOK_PRINT]).unwrap();
        assert_eq!(start, SCRATCH_BASE + LINE_HEADER);
        assert_eq!(ws.peek(start + 1).unwrap(), TOK_EOL);
        assert!(at_prog_end(&ws, SCRATCH_BASE + LINE_HEADER + 2));
        assert!(!at_prog_end(&ws, SCRATCH_BASE));
    }

    #[test]
    fn test_find_data_lines() {
        let ws = loaded("10 PRINT\n20 DATA 1,2\n");
        let text = find_data(&ws, ws.page).unwrap().unwrap();
        assert_eq!(ws.peek(text).unwrap(), b' ');
    }

    #[test]
    fn test_corrupt_program_detected() {
        let mut ws = loaded("10 PRINT\n");
        ws.poke(ws.page + 2, 2).unwrap();
        assert_eq!(check_program(&ws).unwrap_err().kind, ErrorKind::BadProg);
    }
}
