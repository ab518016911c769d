//! Keyboard collaborator
//!
//! Line input for `INPUT`, single keys for `GET` and `INKEY`, the mouse
//! pointer behind `MOUSE`, and the cooperative escape flag the runtime
//! polls between statements.

use crate::error::Result;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a `MOUSE` statement asks of the pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MouseCommand {
    /// Show the pointer with the given shape
    On(i32),
    Off,
    To { x: i32, y: i32 },
    /// Pointer speed along each axis
    Step { x: i32, y: i32 },
    Colour { index: i32, red: i32, green: i32, blue: i32 },
    /// Confine the pointer; `None` lifts the restriction
    Rectangle(Option<[i32; 4]>),
}

/// Pointer state read by `MOUSE x, y, b`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseState {
    pub x: i32,
    pub y: i32,
    pub buttons: i32,
}

/// Keyboard interface
pub trait Keyboard {
    /// Read one line of at most `max` bytes; `None` when input ends or
    /// escape was pressed
    fn read_line(&mut self, max: usize) -> Option<String>;

    /// Wait for a key; `None` when input ends
    fn get_char(&mut self) -> Option<u8>;

    /// A key if one arrives within `centiseconds`
    fn inkey(&mut self, centiseconds: i32) -> Option<u8>;

    /// Report and clear a pending escape
    fn escape_polled(&mut self) -> bool;

    fn mouse(&mut self) -> MouseState {
        MouseState::default()
    }

    /// Devices without a pointer ignore pointer commands
    fn mouse_command(&mut self, _command: MouseCommand) -> Result<()> {
        Ok(())
    }
}

impl<K: Keyboard> Keyboard for Rc<RefCell<K>> {
    fn read_line(&mut self, max: usize) -> Option<String> {
        self.borrow_mut().read_line(max)
    }

    fn get_char(&mut self) -> Option<u8> {
        self.borrow_mut().get_char()
    }

    fn inkey(&mut self, centiseconds: i32) -> Option<u8> {
        self.borrow_mut().inkey(centiseconds)
    }

    fn escape_polled(&mut self) -> bool {
        self.borrow_mut().escape_polled()
    }

    fn mouse(&mut self) -> MouseState {
        self.borrow_mut().mouse()
    }

    fn mouse_command(&mut self, command: MouseCommand) -> Result<()> {
        self.borrow_mut().mouse_command(command)
    }
}

/// Shared escape flag, set from a signal handler or another thread
#[derive(Debug, Clone, Default)]
pub struct EscapeFlag(Arc<AtomicBool>);

impl EscapeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Read and clear the flag
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Keyboard fed from prepared input, for tests and batch runs
#[derive(Debug, Default)]
pub struct ScriptedKeyboard {
    lines: VecDeque<String>,
    keys: VecDeque<u8>,
    escape: EscapeFlag,
    pub pointer: MouseState,
    /// Pointer commands received, oldest first
    pub mouse_commands: Vec<MouseCommand>,
}

impl ScriptedKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn push_keys(&mut self, keys: &[u8]) {
        self.keys.extend(keys.iter().copied());
    }

    /// Handle for raising escape from outside
    pub fn escape_flag(&self) -> EscapeFlag {
        self.escape.clone()
    }
}

impl Keyboard for ScriptedKeyboard {
    fn read_line(&mut self, max: usize) -> Option<String> {
        let mut line = self.lines.pop_front()?;
        line.truncate(max);
        Some(line)
    }

    fn get_char(&mut self) -> Option<u8> {
        self.keys.pop_front()
    }

    fn inkey(&mut self, _centiseconds: i32) -> Option<u8> {
        self.keys.pop_front()
    }

    fn escape_polled(&mut self) -> bool {
        self.escape.take()
    }

    fn mouse(&mut self) -> MouseState {
        self.pointer
    }

    fn mouse_command(&mut self, command: MouseCommand) -> Result<()> {
        if let MouseCommand::To { x, y } = command {
            self.pointer.x = x;
            self.pointer.y = y;
        }
        self.mouse_commands.push(command);
        Ok(())
    }
}

/// Keyboard on standard input, with escape raised by Ctrl-C
#[derive(Debug)]
pub struct StdinKeyboard {
    escape: EscapeFlag,
    pending: VecDeque<u8>,
}

impl StdinKeyboard {
    pub fn new(escape: EscapeFlag) -> Self {
        Self {
            escape,
            pending: VecDeque::new(),
        }
    }
}

impl Keyboard for StdinKeyboard {
    fn read_line(&mut self, max: usize) -> Option<String> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                if self.escape.take() {
                    return None;
                }
                let mut line = line.trim_end_matches(['\r', '\n']).to_string();
                line.truncate(max);
                Some(line)
            }
        }
    }

    fn get_char(&mut self) -> Option<u8> {
        if self.pending.is_empty() {
            let line = self.read_line(usize::MAX)?;
            self.pending.extend(line.bytes());
            self.pending.push_back(b'\r');
        }
        self.pending.pop_front()
    }

    /// Standard input cannot be polled, so only buffered keys are seen
    fn inkey(&mut self, _centiseconds: i32) -> Option<u8> {
        self.pending.pop_front()
    }

    fn escape_polled(&mut self) -> bool {
        self.escape.take()
    }
}
