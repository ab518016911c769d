//! Workspace memory for the BASIC runtime
//!
//! One contiguous byte region addressed by 32-bit offsets. The region is
//! carved up by a set of boundary pointers:
//!
//! ```text
//! 0 .. PREFIX_SIZE   preserved prefix (command line buffer, EVAL area)
//! page .. top        tokenised program
//! lomem .. vartop    variable heap, grows upwards
//! stacktop .. himem  control stack, grows downwards
//! ```
//!
//! `stacklimit` sits a safety margin above `vartop` and is the lowest
//! address the stack may reach.

use crate::error::{ErrorKind, Result};
use log::debug;

/// Default workspace size in bytes
pub const DEFAULT_WORKSPACE: usize = 256 * 1024;
/// Smallest workspace the runtime accepts
pub const MIN_WORKSPACE: usize = 16 * 1024;
/// Bytes below PAGE kept for the command line buffer and EVAL text
pub const PREFIX_SIZE: usize = 4096;
/// Start of the tokenised command line buffer
pub const SCRATCH_BASE: usize = 0;
/// Bytes available to a tokenised command line
pub const SCRATCH_SIZE: usize = 1024;
/// Start of the area used to tokenise `EVAL` strings
pub const EVAL_BASE: usize = SCRATCH_BASE + SCRATCH_SIZE;
/// Default gap kept between the variable heap and the stack
pub const DEFAULT_MARGIN: usize = 256;

/// The interpreter's workspace and its boundary pointers
#[derive(Debug, Clone)]
pub struct Workspace {
    mem: Vec<u8>,
    pub page: usize,
    pub top: usize,
    pub lomem: usize,
    pub vartop: usize,
    pub stacktop: usize,
    pub stacklimit: usize,
    pub himem: usize,
    margin: usize,
}

impl Workspace {
    /// Allocate a zeroed workspace of `size` bytes; PAGE, TOP and LOMEM all
    /// start at the end of the prefix until a program image is written
    pub fn new(size: usize, margin: usize) -> Result<Self> {
        if size < MIN_WORKSPACE || size > u32::MAX as usize {
            return Err(ErrorKind::NoRoom.into());
        }
        let mut ws = Self {
            mem: vec![0; size],
            page: PREFIX_SIZE,
            top: PREFIX_SIZE,
            lomem: PREFIX_SIZE,
            vartop: PREFIX_SIZE,
            stacktop: size,
            stacklimit: PREFIX_SIZE + margin,
            himem: size,
            margin,
        };
        ws.set_top(PREFIX_SIZE);
        debug!("workspace of {} bytes, page at {:#x}", size, ws.page);
        Ok(ws)
    }

    /// A zero-sized workspace, the state after `release_workspace`
    pub fn empty() -> Self {
        Self {
            mem: Vec::new(),
            page: 0,
            top: 0,
            lomem: 0,
            vartop: 0,
            stacktop: 0,
            stacklimit: 0,
            himem: 0,
            margin: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.mem.len()
    }

    /// Record a new end of program; the variable heap restarts above it
    pub fn set_top(&mut self, top: usize) {
        self.top = top;
        self.lomem = top;
        self.vartop = top;
        self.stacklimit = top + self.margin;
    }

    /// Check that `[addr, addr + len)` lies inside the workspace
    pub fn check_range(&self, addr: usize, len: usize) -> Result<()> {
        match addr.checked_add(len) {
            Some(end) if end <= self.mem.len() => Ok(()),
            _ => Err(ErrorKind::BadAddress.into()),
        }
    }

    /// Convert a BASIC integer into a workspace offset
    pub fn address(&self, value: i64, len: usize) -> Result<usize> {
        if value < 0 {
            return Err(ErrorKind::BadAddress.into());
        }
        let addr = value as usize;
        self.check_range(addr, len)?;
        Ok(addr)
    }

    /// Read a byte (`?addr`)
    pub fn peek(&self, addr: usize) -> Result<u8> {
        self.mem.get(addr).copied().ok_or_else(|| ErrorKind::BadAddress.into())
    }

    /// Write a byte (`?addr = value`)
    pub fn poke(&mut self, addr: usize, value: u8) -> Result<()> {
        match self.mem.get_mut(addr) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ErrorKind::BadAddress.into()),
        }
    }

    /// Borrow `len` bytes starting at `addr`
    pub fn bytes(&self, addr: usize, len: usize) -> Result<&[u8]> {
        self.check_range(addr, len)?;
        Ok(&self.mem[addr..addr + len])
    }

    pub fn bytes_mut(&mut self, addr: usize, len: usize) -> Result<&mut [u8]> {
        self.check_range(addr, len)?;
        Ok(&mut self.mem[addr..addr + len])
    }

    pub fn write_bytes(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        self.bytes_mut(addr, data.len())?.copy_from_slice(data);
        Ok(())
    }

    fn read_array<const N: usize>(&self, addr: usize) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.bytes(addr, N)?);
        Ok(buf)
    }

    /// Read a 16-bit word (little-endian)
    pub fn read_u16(&self, addr: usize) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array(addr)?))
    }

    pub fn write_u16(&mut self, addr: usize, value: u16) -> Result<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Read a 32-bit integer (`!addr`), no alignment required
    pub fn read_i32(&self, addr: usize) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array(addr)?))
    }

    pub fn write_i32(&mut self, addr: usize, value: i32) -> Result<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Read a 64-bit integer (`|addr`)
    pub fn read_i64(&self, addr: usize) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array(addr)?))
    }

    pub fn write_i64(&mut self, addr: usize, value: i64) -> Result<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Read an 8-byte float (`|.addr`)
    pub fn read_f64(&self, addr: usize) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array(addr)?))
    }

    pub fn write_f64(&mut self, addr: usize, value: f64) -> Result<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Read a CR-terminated string (`$addr`), at most `max` bytes
    pub fn read_cr_string(&self, addr: usize, max: usize) -> Result<Vec<u8>> {
        self.check_range(addr, 0)?;
        let end = (addr + max + 1).min(self.mem.len());
        let text = &self.mem[addr..end];
        match text.iter().position(|&b| b == b'\r') {
            Some(len) => Ok(text[..len].to_vec()),
            None if text.len() > max => Err(ErrorKind::StringLen.into()),
            None => Ok(text.to_vec()),
        }
    }

    /// Write `text` followed by a carriage return
    pub fn write_cr_string(&mut self, addr: usize, text: &[u8]) -> Result<()> {
        self.check_range(addr, text.len() + 1)?;
        self.mem[addr..addr + text.len()].copy_from_slice(text);
        self.mem[addr + text.len()] = b'\r';
        Ok(())
    }

    /// Claim `size` zeroed bytes from the variable heap
    pub fn alloc_heap(&mut self, size: usize) -> Result<usize> {
        let start = self.vartop;
        let end = start.checked_add(size).ok_or(ErrorKind::NoRoom)?;
        if end + self.margin > self.stacktop {
            return Err(ErrorKind::NoRoom.into());
        }
        self.mem[start..end].fill(0);
        self.vartop = end;
        self.stacklimit = end + self.margin;
        Ok(start)
    }

    /// Discard the whole variable heap
    pub fn clear_heap(&mut self) {
        self.vartop = self.lomem;
        self.stacklimit = self.vartop + self.margin;
    }

    /// Move the stack top down by `size` bytes, returning the new top
    pub fn claim_stack(&mut self, size: usize) -> Result<usize> {
        match self.stacktop.checked_sub(size) {
            Some(top) if top >= self.stacklimit => {
                self.stacktop = top;
                Ok(top)
            }
            _ => Err(ErrorKind::StackFull.into()),
        }
    }

    pub fn release_stack(&mut self, size: usize) {
        self.stacktop = (self.stacktop + size).min(self.himem);
    }

    pub fn reset_stack(&mut self) {
        self.stacktop = self.himem;
    }

    /// Bytes left between the stack limit and the stack top
    pub fn stack_room(&self) -> usize {
        self.stacktop.saturating_sub(self.stacklimit)
    }

    /// Move HIMEM; only allowed while the stack is empty
    pub fn set_himem(&mut self, himem: usize) -> Result<()> {
        if himem > self.mem.len() || himem < self.vartop + self.margin {
            return Err(ErrorKind::BadAddress.into());
        }
        self.himem = himem;
        self.stacktop = himem;
        Ok(())
    }

    /// Move LOMEM; the variable heap is discarded
    pub fn set_lomem(&mut self, lomem: usize) -> Result<()> {
        if lomem < self.top || lomem + self.margin > self.stacktop {
            return Err(ErrorKind::BadAddress.into());
        }
        self.lomem = lomem;
        self.clear_heap();
        Ok(())
    }

    /// The ordering every boundary pointer must respect
    pub fn check_invariants(&self) -> bool {
        self.page <= self.top
            && self.top <= self.lomem
            && self.lomem <= self.vartop
            && self.vartop <= self.stacklimit
            && self.stacklimit <= self.stacktop
            && self.stacktop <= self.himem
            && self.himem <= self.mem.len()
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::empty()
    }
}
