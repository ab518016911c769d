//! File collaborator
//!
//! Byte-level channel I/O for `OPENIN`/`OPENOUT`/`OPENUP`, `BPUT#`,
//! `BGET#`, `EOF#` and `CLOSE#`, plus the tagged binary records written by
//! `PRINT#` and read back by `INPUT#`:
//!
//! ```text
//! 0x40 i32 (big-endian)    0x41 i64 (little-endian)
//! 0xFF f64 (little-endian) 0x00 len:u8 bytes (reversed)
//! 0x01 len:u16 bytes
//! ```

use crate::error::{ErrorKind, Result};
use crate::variables::Number;
use log::debug;
use std::collections::HashMap;
use std::path::PathBuf;

const REC_INT: u8 = 0x40;
const REC_INT64: u8 = 0x41;
const REC_FLOAT: u8 = 0xFF;
const REC_SHORT_STRING: u8 = 0x00;
const REC_LONG_STRING: u8 = 0x01;

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `OPENIN`: existing file, read only
    Read,
    /// `OPENOUT`: new empty file
    Write,
    /// `OPENUP`: existing file, read and write
    Update,
}

/// A value read back by `INPUT#`
#[derive(Debug, Clone, PartialEq)]
pub enum FileValue {
    Number(Number),
    Text(Vec<u8>),
}

/// File I/O interface
pub trait FileIo {
    /// Open a file and return its channel; 0 when the file does not exist
    fn open(&mut self, name: &str, mode: OpenMode) -> Result<i32>;
    /// Close one channel, or every channel for 0
    fn close(&mut self, handle: i32) -> Result<()>;
    fn bput_bytes(&mut self, handle: i32, bytes: &[u8]) -> Result<()>;
    fn bget(&mut self, handle: i32) -> Result<u8>;
    fn eof(&self, handle: i32) -> Result<bool>;

    /// Whether `BPUT#h,s$` ends the string with a newline
    fn bput_newline(&self) -> bool {
        true
    }

    fn bput_byte(&mut self, handle: i32, byte: u8) -> Result<()> {
        self.bput_bytes(handle, &[byte])
    }

    fn print_int(&mut self, handle: i32, value: i32) -> Result<()> {
        self.bput_byte(handle, REC_INT)?;
        self.bput_bytes(handle, &value.to_be_bytes())
    }

    fn print_i64(&mut self, handle: i32, value: i64) -> Result<()> {
        self.bput_byte(handle, REC_INT64)?;
        self.bput_bytes(handle, &value.to_le_bytes())
    }

    fn print_u8(&mut self, handle: i32, value: u8) -> Result<()> {
        self.print_int(handle, value as i32)
    }

    fn print_float(&mut self, handle: i32, value: f64) -> Result<()> {
        self.bput_byte(handle, REC_FLOAT)?;
        self.bput_bytes(handle, &value.to_le_bytes())
    }

    fn print_string(&mut self, handle: i32, text: &[u8]) -> Result<()> {
        match u8::try_from(text.len()) {
            Ok(len) => {
                self.bput_bytes(handle, &[REC_SHORT_STRING, len])?;
                let reversed: Vec<u8> = text.iter().rev().copied().collect();
                self.bput_bytes(handle, &reversed)
            }
            Err(_) => {
                let len = u16::try_from(text.len()).map_err(|_| ErrorKind::StringLen)?;
                self.bput_byte(handle, REC_LONG_STRING)?;
                self.bput_bytes(handle, &len.to_le_bytes())?;
                self.bput_bytes(handle, text)
            }
        }
    }

    /// Read one `PRINT#` record
    fn get_value(&mut self, handle: i32) -> Result<FileValue> {
        let tag = self.bget(handle)?;
        match tag {
            REC_INT => {
                let raw = take_bytes(self, handle, 4)?;
                Ok(FileValue::Number(Number::Int(i32::from_be_bytes([
                    raw[0], raw[1], raw[2], raw[3],
                ]))))
            }
            REC_INT64 | REC_FLOAT => {
                let raw = take_bytes(self, handle, 8)?;
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&raw);
                Ok(FileValue::Number(if tag == REC_INT64 {
                    Number::Int64(i64::from_le_bytes(bytes))
                } else {
                    Number::Float(f64::from_le_bytes(bytes))
                }))
            }
            REC_SHORT_STRING => {
                let len = self.bget(handle)? as usize;
                let mut text = take_bytes(self, handle, len)?;
                text.reverse();
                Ok(FileValue::Text(text))
            }
            REC_LONG_STRING => {
                let raw = take_bytes(self, handle, 2)?;
                let len = u16::from_le_bytes([raw[0], raw[1]]) as usize;
                Ok(FileValue::Text(take_bytes(self, handle, len)?))
            }
            _ => Err(ErrorKind::Channel.into()),
        }
    }

    fn get_number(&mut self, handle: i32) -> Result<Number> {
        match self.get_value(handle)? {
            FileValue::Number(n) => Ok(n),
            FileValue::Text(_) => Err(ErrorKind::NumberWanted.into()),
        }
    }

    fn get_string(&mut self, handle: i32) -> Result<Vec<u8>> {
        match self.get_value(handle)? {
            FileValue::Text(text) => Ok(text),
            FileValue::Number(_) => Err(ErrorKind::StringWanted.into()),
        }
    }
}

fn take_bytes<F: FileIo + ?Sized>(io: &mut F, handle: i32, n: usize) -> Result<Vec<u8>> {
    (0..n).map(|_| io.bget(handle)).collect()
}

#[derive(Debug, Clone)]
struct Channel {
    name: String,
    pos: usize,
    writable: bool,
}

/// Files held in memory, optionally loaded from and saved to a directory
#[derive(Debug, Clone)]
pub struct MemoryFiles {
    files: HashMap<String, Vec<u8>>,
    channels: HashMap<i32, Channel>,
    next_handle: i32,
    root: Option<PathBuf>,
    bput_newline: bool,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            channels: HashMap::new(),
            next_handle: 1,
            root: None,
            bput_newline: true,
        }
    }

    /// Files not yet in memory are read from `root`; closed output files
    /// are written back there
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root: Some(root),
            ..Self::new()
        }
    }

    pub fn set_bput_newline(&mut self, enabled: bool) {
        self.bput_newline = enabled;
    }

    pub fn insert(&mut self, name: &str, contents: Vec<u8>) {
        self.files.insert(name.to_string(), contents);
    }

    pub fn contents(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    fn channel(&self, handle: i32) -> Result<&Channel> {
        self.channels.get(&handle).ok_or_else(|| ErrorKind::Channel.into())
    }

    fn channel_mut(&mut self, handle: i32) -> Result<&mut Channel> {
        self.channels.get_mut(&handle).ok_or_else(|| ErrorKind::Channel.into())
    }

    fn load(&mut self, name: &str) -> bool {
        if self.files.contains_key(name) {
            return true;
        }
        let Some(root) = &self.root else {
            return false;
        };
        match std::fs::read(root.join(name)) {
            Ok(bytes) => {
                self.files.insert(name.to_string(), bytes);
                true
            }
            Err(_) => false,
        }
    }

    fn save(&self, name: &str) -> Result<()> {
        if let (Some(root), Some(bytes)) = (&self.root, self.files.get(name)) {
            std::fs::write(root.join(name), bytes).map_err(|_| ErrorKind::FileNotFound)?;
        }
        Ok(())
    }
}

impl Default for MemoryFiles {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIo for MemoryFiles {
    fn open(&mut self, name: &str, mode: OpenMode) -> Result<i32> {
        match mode {
            OpenMode::Write => {
                self.files.insert(name.to_string(), Vec::new());
            }
            OpenMode::Read | OpenMode::Update => {
                if !self.load(name) {
                    return Ok(0);
                }
            }
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.channels.insert(
            handle,
            Channel {
                name: name.to_string(),
                pos: 0,
                writable: mode != OpenMode::Read,
            },
        );
        debug!("opened {} as channel {}", name, handle);
        Ok(handle)
    }

    fn close(&mut self, handle: i32) -> Result<()> {
        let handles: Vec<i32> = if handle == 0 {
            self.channels.keys().copied().collect()
        } else {
            vec![handle]
        };
        for handle in handles {
            let channel = self.channels.remove(&handle).ok_or(ErrorKind::Channel)?;
            if channel.writable {
                self.save(&channel.name)?;
            }
        }
        Ok(())
    }

    fn bput_bytes(&mut self, handle: i32, bytes: &[u8]) -> Result<()> {
        let channel = self.channel(handle)?.clone();
        if !channel.writable {
            return Err(ErrorKind::Channel.into());
        }
        let file = self.files.entry(channel.name).or_default();
        let end = channel.pos + bytes.len();
        if file.len() < end {
            file.resize(end, 0);
        }
        file[channel.pos..end].copy_from_slice(bytes);
        self.channel_mut(handle)?.pos = end;
        Ok(())
    }

    fn bget(&mut self, handle: i32) -> Result<u8> {
        let channel = self.channel(handle)?;
        let byte = self
            .files
            .get(&channel.name)
            .and_then(|file| file.get(channel.pos).copied())
            .ok_or(ErrorKind::Channel)?;
        self.channel_mut(handle)?.pos += 1;
        Ok(byte)
    }

    fn eof(&self, handle: i32) -> Result<bool> {
        let channel = self.channel(handle)?;
        let len = self.files.get(&channel.name).map_or(0, Vec::len);
        Ok(channel.pos >= len)
    }

    fn bput_newline(&self) -> bool {
        self.bput_newline
    }
}
