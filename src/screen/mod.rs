//! Screen collaborator
//!
//! The runtime writes text and issues VDU and graphics requests through
//! the `Screen` trait. `BufferScreen` keeps everything in memory for tests
//! and embedding; `StdoutScreen` writes text to standard output and
//! ignores graphics.

use log::debug;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// VDU code that moves the text cursor (`VDU 31,x,y`)
const VDU_TAB: u8 = 31;
/// VDU code that clears the text window
const VDU_CLS: u8 = 12;

/// A graphics request, recorded by `BufferScreen`
#[derive(Debug, Clone, PartialEq)]
pub enum GraphicsOp {
    Clear,
    Colour { graphics: bool, action: i32, colour: i32 },
    Plot { code: i32, x: i32, y: i32 },
    Circle { x: i32, y: i32, radius: i32, filled: bool },
    Ellipse { x: i32, y: i32, a: i32, b: i32, filled: bool },
    Rectangle { x: i32, y: i32, width: i32, height: i32, filled: bool },
    Origin { x: i32, y: i32 },
    Mode(i32),
    NewMode { width: i32, height: i32, bpp: i32, rate: i32 },
    Described(ModeDesc),
}

/// A screen mode given by its geometry and palette, as taken by the
/// seven-argument `MODE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDesc {
    pub width: i32,
    pub height: i32,
    pub colours: i32,
    pub greys: i32,
    /// Graphics units per pixel, as powers of two
    pub xeig: i32,
    pub yeig: i32,
    pub rate: i32,
}

/// Output device interface
pub trait Screen {
    /// Send one byte to the VDU stream
    fn vdu_byte(&mut self, byte: u8);

    fn vdu_string(&mut self, text: &[u8]) {
        for &byte in text {
            self.vdu_byte(byte);
        }
    }

    fn newline(&mut self);

    /// `TAB(x)` pads with spaces (after a newline if already past `x`);
    /// `TAB(x,y)` moves the cursor
    fn tab_to(&mut self, x: i32, y: Option<i32>) {
        match y {
            Some(y) => {
                self.vdu_byte(VDU_TAB);
                self.vdu_byte(x as u8);
                self.vdu_byte(y as u8);
            }
            None => {
                if self.pos() > x {
                    self.newline();
                }
                for _ in self.pos()..x {
                    self.vdu_byte(b' ');
                }
            }
        }
    }

    fn clear_text(&mut self) {
        self.vdu_byte(VDU_CLS);
    }

    fn clear_graphics(&mut self);
    fn set_colour(&mut self, graphics: bool, action: i32, colour: i32);
    fn plot(&mut self, code: i32, x: i32, y: i32);
    fn circle(&mut self, x: i32, y: i32, radius: i32, filled: bool);
    fn ellipse(&mut self, x: i32, y: i32, a: i32, b: i32, filled: bool);
    fn rectangle(&mut self, x: i32, y: i32, width: i32, height: i32, filled: bool);
    fn origin(&mut self, x: i32, y: i32);
    fn mode_set(&mut self, mode: i32);
    fn mode_new(&mut self, width: i32, height: i32, bpp: i32, rate: i32);
    fn mode_desc(&mut self, desc: ModeDesc);

    /// Text cursor column
    fn pos(&self) -> i32;
    /// Text cursor row
    fn vpos(&self) -> i32;

    /// Show what the user typed at an `INPUT` prompt
    fn echo_input(&mut self, line: &str) {
        self.vdu_string(line.as_bytes());
        self.newline();
    }

    /// Drain captured output; devices that do not capture return nothing
    fn take_output(&mut self) -> Vec<u8> {
        Vec::new()
    }
}

/// A screen the embedder keeps a handle on while the runtime draws to it
impl<S: Screen> Screen for Rc<RefCell<S>> {
    fn vdu_byte(&mut self, byte: u8) {
        self.borrow_mut().vdu_byte(byte)
    }

    fn vdu_string(&mut self, text: &[u8]) {
        self.borrow_mut().vdu_string(text)
    }

    fn newline(&mut self) {
        self.borrow_mut().newline()
    }

    fn tab_to(&mut self, x: i32, y: Option<i32>) {
        self.borrow_mut().tab_to(x, y)
    }

    fn clear_text(&mut self) {
        self.borrow_mut().clear_text()
    }

    fn clear_graphics(&mut self) {
        self.borrow_mut().clear_graphics()
    }

    fn set_colour(&mut self, graphics: bool, action: i32, colour: i32) {
        self.borrow_mut().set_colour(graphics, action, colour)
    }

    fn plot(&mut self, code: i32, x: i32, y: i32) {
        self.borrow_mut().plot(code, x, y)
    }

    fn circle(&mut self, x: i32, y: i32, radius: i32, filled: bool) {
        self.borrow_mut().circle(x, y, radius, filled)
    }

    fn ellipse(&mut self, x: i32, y: i32, a: i32, b: i32, filled: bool) {
        self.borrow_mut().ellipse(x, y, a, b, filled)
    }

    fn rectangle(&mut self, x: i32, y: i32, width: i32, height: i32, filled: bool) {
        self.borrow_mut().rectangle(x, y, width, height, filled)
    }

    fn origin(&mut self, x: i32, y: i32) {
        self.borrow_mut().origin(x, y)
    }

    fn mode_set(&mut self, mode: i32) {
        self.borrow_mut().mode_set(mode)
    }

    fn mode_new(&mut self, width: i32, height: i32, bpp: i32, rate: i32) {
        self.borrow_mut().mode_new(width, height, bpp, rate)
    }

    fn mode_desc(&mut self, desc: ModeDesc) {
        self.borrow_mut().mode_desc(desc)
    }

    fn pos(&self) -> i32 {
        self.borrow().pos()
    }

    fn vpos(&self) -> i32 {
        self.borrow().vpos()
    }

    fn echo_input(&mut self, line: &str) {
        self.borrow_mut().echo_input(line)
    }

    fn take_output(&mut self) -> Vec<u8> {
        self.borrow_mut().take_output()
    }
}

/// In-memory screen that records text and graphics requests
#[derive(Debug, Clone, Default)]
pub struct BufferScreen {
    output: Vec<u8>,
    column: i32,
    row: i32,
    pub graphics: Vec<GraphicsOp>,
}

impl BufferScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured text so far, as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Screen for BufferScreen {
    fn vdu_byte(&mut self, byte: u8) {
        self.output.push(byte);
        match byte {
            b'\r' => self.column = 0,
            b'\n' => self.row += 1,
            8 => self.column = (self.column - 1).max(0),
            VDU_CLS => {
                self.column = 0;
                self.row = 0;
            }
            32..=255 => self.column += 1,
            _ => {}
        }
    }

    fn newline(&mut self) {
        self.output.push(b'\n');
        self.column = 0;
        self.row += 1;
    }

    fn tab_to(&mut self, x: i32, y: Option<i32>) {
        match y {
            Some(y) => {
                self.column = x;
                self.row = y;
            }
            None => {
                if self.column > x {
                    self.newline();
                }
                while self.column < x {
                    self.vdu_byte(b' ');
                }
            }
        }
    }

    fn clear_graphics(&mut self) {
        self.graphics.push(GraphicsOp::Clear);
    }

    fn set_colour(&mut self, graphics: bool, action: i32, colour: i32) {
        self.graphics.push(GraphicsOp::Colour { graphics, action, colour });
    }

    fn plot(&mut self, code: i32, x: i32, y: i32) {
        self.graphics.push(GraphicsOp::Plot { code, x, y });
    }

    fn circle(&mut self, x: i32, y: i32, radius: i32, filled: bool) {
        self.graphics.push(GraphicsOp::Circle { x, y, radius, filled });
    }

    fn ellipse(&mut self, x: i32, y: i32, a: i32, b: i32, filled: bool) {
        self.graphics.push(GraphicsOp::Ellipse { x, y, a, b, filled });
    }

    fn rectangle(&mut self, x: i32, y: i32, width: i32, height: i32, filled: bool) {
        self.graphics.push(GraphicsOp::Rectangle {
            x,
            y,
            width,
            height,
            filled,
        });
    }

    fn origin(&mut self, x: i32, y: i32) {
        self.graphics.push(GraphicsOp::Origin { x, y });
    }

    fn mode_set(&mut self, mode: i32) {
        self.column = 0;
        self.row = 0;
        self.graphics.push(GraphicsOp::Mode(mode));
    }

    fn mode_new(&mut self, width: i32, height: i32, bpp: i32, rate: i32) {
        self.column = 0;
        self.row = 0;
        self.graphics.push(GraphicsOp::NewMode {
            width,
            height,
            bpp,
            rate,
        });
    }

    fn mode_desc(&mut self, desc: ModeDesc) {
        self.column = 0;
        self.row = 0;
        self.graphics.push(GraphicsOp::Described(desc));
    }

    fn pos(&self) -> i32 {
        self.column
    }

    fn vpos(&self) -> i32 {
        self.row
    }

    /// Input arrives from a script, so nothing is echoed
    fn echo_input(&mut self, _line: &str) {
        self.column = 0;
    }

    fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

/// Text-only terminal on standard output
#[derive(Debug, Default)]
pub struct StdoutScreen {
    column: i32,
    row: i32,
}

impl StdoutScreen {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut out = io::stdout().lock();
        // a closed stdout leaves nothing useful to do with the text
        let _ = out.write_all(bytes);
        let _ = out.flush();
    }
}

impl Screen for StdoutScreen {
    fn vdu_byte(&mut self, byte: u8) {
        match byte {
            b'\r' => self.column = 0,
            b'\n' => self.row += 1,
            VDU_CLS => {
                self.write(b"\x1b[2J\x1b[H");
                self.column = 0;
                self.row = 0;
                return;
            }
            32..=255 => self.column += 1,
            _ => {}
        }
        self.write(&[byte]);
    }

    fn newline(&mut self) {
        self.write(b"\n");
        self.column = 0;
        self.row += 1;
    }

    fn clear_graphics(&mut self) {
        debug!("CLG ignored on a text terminal");
    }

    fn set_colour(&mut self, graphics: bool, action: i32, colour: i32) {
        debug!("colour {} {} {} ignored", graphics, action, colour);
    }

    fn plot(&mut self, code: i32, x: i32, y: i32) {
        debug!("PLOT {},{},{} ignored", code, x, y);
    }

    fn circle(&mut self, x: i32, y: i32, radius: i32, _filled: bool) {
        debug!("CIRCLE {},{},{} ignored", x, y, radius);
    }

    fn ellipse(&mut self, x: i32, y: i32, a: i32, b: i32, _filled: bool) {
        debug!("ELLIPSE {},{},{},{} ignored", x, y, a, b);
    }

    fn rectangle(&mut self, x: i32, y: i32, width: i32, height: i32, _filled: bool) {
        debug!("RECTANGLE {},{},{},{} ignored", x, y, width, height);
    }

    fn origin(&mut self, x: i32, y: i32) {
        debug!("ORIGIN {},{} ignored", x, y);
    }

    fn mode_set(&mut self, mode: i32) {
        debug!("MODE {}", mode);
        self.clear_text();
    }

    fn mode_new(&mut self, width: i32, height: i32, bpp: i32, rate: i32) {
        debug!("MODE {},{},{},{}", width, height, bpp, rate);
        self.clear_text();
    }

    fn mode_desc(&mut self, desc: ModeDesc) {
        debug!("MODE {:?}", desc);
        self.clear_text();
    }

    fn pos(&self) -> i32 {
        self.column
    }

    fn vpos(&self) -> i32 {
        self.row
    }

    /// The terminal already echoed the typed line
    fn echo_input(&mut self, _line: &str) {
        self.column = 0;
        self.row += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_tracks_column() {
        let mut screen = BufferScreen::new();
        screen.vdu_string(b"HELLO");
        assert_eq!(screen.pos(), 5);
        screen.newline();
        assert_eq!(screen.pos(), 0);
        assert_eq!(screen.vpos(), 1);
        assert_eq!(screen.text(), "HELLO\n");
    }

    #[test]
    fn test_tab_pads_or_wraps() {
        let mut screen = BufferScreen::new();
        screen.vdu_string(b"AB");
        screen.tab_to(5, None);
        screen.vdu_byte(b'C');
        screen.tab_to(2, None);
        screen.vdu_byte(b'D');
        assert_eq!(String::from_utf8(screen.take_output()).unwrap(), "AB   C\n  D");
        assert!(screen.take_output().is_empty());
    }

    #[test]
    fn test_graphics_are_recorded() {
        let mut screen = BufferScreen::new();
        screen.plot(4, 100, 200);
        screen.circle(10, 20, 30, true);
        screen.mode_set(7);
        assert_eq!(
            screen.graphics,
            vec![
                GraphicsOp::Plot { code: 4, x: 100, y: 200 },
                GraphicsOp::Circle { x: 10, y: 20, radius: 30, filled: true },
                GraphicsOp::Mode(7),
            ]
        );
    }
}
