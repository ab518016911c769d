//! Statements that only talk to the screen, sound and file collaborators

use super::{Flow, Interpreter, Value};
use crate::error::{ErrorKind, Result};
use crate::os::MouseCommand;
use crate::screen::ModeDesc;
use crate::tokenizer::*;

/// `PLOT` codes used by `MOVE` and `DRAW`
const PLOT_MOVE: i32 = 4;
const PLOT_DRAW: i32 = 5;
/// Parameters taken by `ENVELOPE`
const ENVELOPE_PARAMS: usize = 14;

impl Interpreter {
    pub(super) fn device_statement(&mut self, token: u8) -> Result<Flow> {
        match token {
            TOK_CLS => self.host.screen.clear_text(),
            TOK_CLG => self.host.screen.clear_graphics(),
            TOK_VDU => self.vdu_statement()?,
            TOK_MODE => {
                let args = self.int_list()?;
                match args[..] {
                    [mode] => self.host.screen.mode_set(mode),
                    [width, height, bpp] => self.host.screen.mode_new(width, height, bpp, 0),
                    [width, height, bpp, rate] => {
                        self.host.screen.mode_new(width, height, bpp, rate)
                    }
                    [width, height, colours, greys, xeig, yeig, rate] => {
                        self.host.screen.mode_desc(ModeDesc {
                            width,
                            height,
                            colours,
                            greys,
                            xeig,
                            yeig,
                            rate,
                        })
                    }
                    _ => return Err(ErrorKind::Syntax.into()),
                }
            }
            TOK_COLOUR => match self.int_list()?[..] {
                [colour] => self.host.screen.set_colour(false, 0, colour),
                _ => return Err(ErrorKind::Unsupported("COLOUR palette").into()),
            },
            TOK_GCOL => match self.int_list()?[..] {
                [colour] => self.host.screen.set_colour(true, 0, colour),
                [action, colour] => self.host.screen.set_colour(true, action, colour),
                _ => return Err(ErrorKind::Syntax.into()),
            },
            TOK_PLOT => {
                let [code, x, y] = self.int_args::<3>()?;
                self.host.screen.plot(code, x, y);
            }
            TOK_MOVE | TOK_DRAW => {
                let [x, y] = self.int_args::<2>()?;
                let code = if token == TOK_MOVE { PLOT_MOVE } else { PLOT_DRAW };
                self.host.screen.plot(code, x, y);
            }
            TOK_SOUND => {
                let [channel, amplitude, pitch, duration] = self.int_args::<4>()?;
                self.host.sound.sound(channel, amplitude, pitch, duration)?;
            }
            TOK_ENVELOPE => {
                let params = self.int_list()?;
                if params.len() != ENVELOPE_PARAMS {
                    return Err(ErrorKind::Arguments.into());
                }
                self.host.sound.envelope(&params)?;
            }
            _ => return Err(ErrorKind::Unsupported("WIDTH").into()),
        }
        Ok(Flow::Continue)
    }

    /// `VDU a, b; c | ...`: a `,` (or the end) sends the low byte, a `;`
    /// sends two bytes low first, `|` sends nine zeros
    fn vdu_statement(&mut self) -> Result<()> {
        while !self.at_statement_end()? {
            if self.accept(b'|')? {
                for _ in 0..9 {
                    self.host.screen.vdu_byte(0);
                }
                continue;
            }
            let value = self.eval_int()?;
            self.host.screen.vdu_byte(value as u8);
            if self.accept(b';')? {
                self.host.screen.vdu_byte((value >> 8) as u8);
            } else {
                self.accept(b',')?;
            }
        }
        Ok(())
    }

    /// `CIRCLE [FILL] x,y,r`, `ELLIPSE [FILL] x,y,a,b`,
    /// `RECTANGLE [FILL] x,y,w[,h]` and `ORIGIN x,y`
    pub(super) fn shape_statement(&mut self, sub: u8) -> Result<Flow> {
        let filled = sub != XST_ORIGIN && self.accept_fill()?;
        match sub {
            XST_CIRCLE => {
                let [x, y, radius] = self.int_args::<3>()?;
                self.host.screen.circle(x, y, radius, filled);
            }
            XST_ELLIPSE => {
                let [x, y, a, b] = self.int_args::<4>()?;
                self.host.screen.ellipse(x, y, a, b, filled);
            }
            XST_RECTANGLE => match self.int_list()?[..] {
                [x, y, side] => self.host.screen.rectangle(x, y, side, side, filled),
                [x, y, width, height] => self.host.screen.rectangle(x, y, width, height, filled),
                _ => return Err(ErrorKind::Syntax.into()),
            },
            _ => {
                let [x, y] = self.int_args::<2>()?;
                self.host.screen.origin(x, y);
            }
        }
        Ok(Flow::Continue)
    }

    /// `MOUSE x, y, b` reads the pointer into three variables; the
    /// `ON`, `OFF`, `TO`, `STEP`, `COLOUR` and `RECTANGLE` forms drive it
    pub(super) fn mouse_statement(&mut self) -> Result<Flow> {
        let command = match self.peek()? {
            TOK_ON => {
                self.current += 1;
                let shape = if self.at_statement_end()? { 0 } else { self.eval_int()? };
                MouseCommand::On(shape)
            }
            TOK_OFF => {
                self.current += 1;
                MouseCommand::Off
            }
            TOK_TO => {
                self.current += 1;
                let [x, y] = self.int_args::<2>()?;
                MouseCommand::To { x, y }
            }
            TOK_STEP => {
                self.current += 1;
                match self.int_list()?[..] {
                    [step] => MouseCommand::Step { x: step, y: step },
                    [x, y] => MouseCommand::Step { x, y },
                    _ => return Err(ErrorKind::Arguments.into()),
                }
            }
            TOK_COLOUR => {
                self.current += 1;
                let [index, red, green, blue] = self.int_args::<4>()?;
                MouseCommand::Colour { index, red, green, blue }
            }
            PREFIX_STATEMENT if self.ws.peek(self.current + 1)? == XST_RECTANGLE => {
                self.current += 2;
                if self.accept(TOK_OFF)? {
                    MouseCommand::Rectangle(None)
                } else {
                    MouseCommand::Rectangle(Some(self.int_args::<4>()?))
                }
            }
            _ => {
                let state = self.host.keyboard.mouse();
                for (i, value) in [state.x, state.y, state.buttons].into_iter().enumerate() {
                    if i > 0 {
                        self.expect(b',')?;
                    }
                    let lv = self.resolve_lvalue(true)?;
                    self.store_value(&lv, Value::Int(value))?;
                }
                return Ok(Flow::Continue);
            }
        };
        self.host.keyboard.mouse_command(command)?;
        Ok(Flow::Continue)
    }

    /// `STEREO ch, pos`, `TEMPO n`, `BEATS n`, `VOICES n` and
    /// `VOICE ch, name$`
    pub(super) fn synth_statement(&mut self, sub: u8) -> Result<Flow> {
        match sub {
            XST_STEREO => {
                let [channel, position] = self.int_args::<2>()?;
                self.host.sound.stereo(channel, position)?;
            }
            XST_VOICE => {
                let channel = self.eval_int()?;
                self.expect(b',')?;
                let name = self.eval_bytes()?;
                self.host.sound.voice(channel, &String::from_utf8_lossy(&name))?;
            }
            _ => {
                let [n] = self.int_args::<1>()?;
                match sub {
                    XST_TEMPO => self.host.sound.tempo(n)?,
                    XST_BEATS => self.host.sound.beats(n)?,
                    _ => self.host.sound.voices(n)?,
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// `FILL` is not a keyword, so it arrives as name bytes
    fn accept_fill(&mut self) -> Result<bool> {
        let (name, end) = self.name_at(self.current, false)?;
        if name == b"FILL" {
            self.current = end;
            return Ok(true);
        }
        Ok(false)
    }

    /// `BPUT#h, item, ...`. Numbers send one byte and strings their text,
    /// followed by a newline when the string ends the statement without
    /// a `;` and the file device asks for one.
    pub(super) fn bput_statement(&mut self) -> Result<Flow> {
        self.expect(b'#')?;
        let handle = self.channel()?;
        while self.accept(b',')? {
            let value = self.eval()?;
            match value.number() {
                Some(n) => self.host.files.bput_byte(handle, n.to_i32()? as u8)?,
                None => {
                    let text = self.to_bytes(value)?;
                    self.host.files.bput_bytes(handle, &text)?;
                    let last = self.at_statement_end()?;
                    if last && self.host.files.bput_newline() {
                        self.host.files.bput_byte(handle, b'\n')?;
                    }
                }
            }
        }
        self.accept(b';')?;
        Ok(Flow::Continue)
    }

    /// `CLOSE#h`; channel 0 closes every file
    pub(super) fn close_statement(&mut self) -> Result<Flow> {
        self.expect(b'#')?;
        let handle = self.channel()?;
        self.host.files.close(handle)?;
        Ok(Flow::Continue)
    }

    /// The channel number after `#`
    pub(super) fn channel(&mut self) -> Result<i32> {
        self.eval_factor_number()?.to_i32()
    }

    /// Comma-separated integer arguments
    fn int_list(&mut self) -> Result<Vec<i32>> {
        let mut args = vec![self.eval_int()?];
        while self.accept(b',')? {
            args.push(self.eval_int()?);
        }
        Ok(args)
    }

    /// Exactly `N` comma-separated integer arguments
    fn int_args<const N: usize>(&mut self) -> Result<[i32; N]> {
        let args = self.int_list()?;
        <[i32; N]>::try_from(args).map_err(|_| ErrorKind::Arguments.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Host, InterpreterConfig};
    use crate::filesystem::MemoryFiles;
    use crate::os::ScriptedKeyboard;
    use crate::screen::{BufferScreen, GraphicsOp};
    use crate::sound::{NullSound, SoundRequest};
    use std::cell::RefCell;
    use std::rc::Rc;

    type SharedScreen = Rc<RefCell<BufferScreen>>;
    type SharedSound = Rc<RefCell<NullSound>>;

    fn run_with_devices(source: &str) -> (Interpreter, SharedScreen, SharedSound) {
        let screen = SharedScreen::default();
        let sound = SharedSound::default();
        let host = Host::new(
            Box::new(screen.clone()),
            Box::new(ScriptedKeyboard::new()),
            Box::new(MemoryFiles::new()),
            Box::new(sound.clone()),
        );
        let mut interp = Interpreter::new(InterpreterConfig::default(), host).unwrap();
        interp.load_program(source).unwrap();
        interp.run_program().unwrap();
        (interp, screen, sound)
    }

    #[test]
    fn test_vdu_byte_forms() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.exec_thisline("VDU 65, 66; 67").unwrap();
        assert_eq!(interp.take_output(), "AB\0C");
        interp.exec_thisline("VDU 7|").unwrap();
        assert_eq!(interp.take_output().len(), 10);
    }

    #[test]
    fn test_graphics_requests() {
        let (_, screen, _) = run_with_devices(
            "10 MODE 1: GCOL 3, 2: MOVE 0, 0: DRAW 100, 200\n\
             20 CIRCLE FILL 640, 512, 100: RECTANGLE 10, 20, 30\n\
             30 ORIGIN 5, 6: ELLIPSE 1, 2, 3, 4: CLG",
        );
        let graphics = screen.borrow().graphics.clone();
        assert_eq!(
            graphics,
            vec![
                GraphicsOp::Mode(1),
                GraphicsOp::Colour { graphics: true, action: 3, colour: 2 },
                GraphicsOp::Plot { code: 4, x: 0, y: 0 },
                GraphicsOp::Plot { code: 5, x: 100, y: 200 },
                GraphicsOp::Circle { x: 640, y: 512, radius: 100, filled: true },
                GraphicsOp::Rectangle { x: 10, y: 20, width: 30, height: 30, filled: false },
                GraphicsOp::Origin { x: 5, y: 6 },
                GraphicsOp::Ellipse { x: 1, y: 2, a: 3, b: 4, filled: false },
                GraphicsOp::Clear,
            ]
        );
    }

    #[test]
    fn test_sound_and_envelope() {
        let (_, _, sound) = run_with_devices(
            "10 SOUND 1, -15, 53, 20\n\
             20 ENVELOPE 1,1,0,0,0,0,0,0,126,-1,0,-1,126,110",
        );
        let requests = sound.borrow().requests.clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0],
            SoundRequest::Note { channel: 1, amplitude: -15, pitch: 53, duration: 20 }
        );
    }

    #[test]
    fn test_synthesiser_settings() {
        let (_, _, sound) = run_with_devices(
            "10 VOICES 4: TEMPO 8: BEATS 4\n\
             20 STEREO 2, -64: VOICE 1, \"Piano\"",
        );
        assert_eq!(
            sound.borrow().requests,
            vec![
                SoundRequest::Voices(4),
                SoundRequest::Tempo(8),
                SoundRequest::Beats(4),
                SoundRequest::Stereo { channel: 2, position: -64 },
                SoundRequest::Voice { channel: 1, name: "Piano".to_string() },
            ]
        );
    }

    #[test]
    fn test_mouse_commands_and_position() {
        let keyboard = Rc::new(RefCell::new(ScriptedKeyboard::new()));
        let host = Host::new(
            Box::new(BufferScreen::new()),
            Box::new(keyboard.clone()),
            Box::new(MemoryFiles::new()),
            Box::new(NullSound::new()),
        );
        let mut interp = Interpreter::new(InterpreterConfig::default(), host).unwrap();
        interp
            .load_program(
                "10 MOUSE ON 3: MOUSE TO 100, 200: MOUSE STEP 2\n\
                 20 MOUSE RECTANGLE 0, 0, 640, 480: MOUSE RECTANGLE OFF\n\
                 30 MOUSE COLOUR 1, 255, 0, 0: MOUSE x, y%, b\n\
                 40 PRINT ;x;\" \";y%;\" \";b: MOUSE OFF",
            )
            .unwrap();
        keyboard.borrow_mut().pointer.buttons = 1;
        interp.run_program().unwrap();
        assert_eq!(interp.take_output(), "100 200 1\n");
        assert_eq!(
            keyboard.borrow().mouse_commands,
            vec![
                MouseCommand::On(3),
                MouseCommand::To { x: 100, y: 200 },
                MouseCommand::Step { x: 2, y: 2 },
                MouseCommand::Rectangle(Some([0, 0, 640, 480])),
                MouseCommand::Rectangle(None),
                MouseCommand::Colour { index: 1, red: 255, green: 0, blue: 0 },
                MouseCommand::Off,
            ]
        );
    }

    #[test]
    fn test_wrong_argument_count() {
        let mut interp = Interpreter::in_memory().unwrap();
        let err = interp.exec_thisline("PLOT 1, 2").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arguments);
    }

    #[test]
    fn test_bput_and_bget() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp
            .load_program(
                "10 h = OPENOUT \"f\": BPUT#h, 65: BPUT#h, \"BC\": CLOSE#h\n\
                 20 h = OPENIN \"f\"\n\
                 30 REPEAT: PRINT ;BGET#h;\" \";: UNTIL EOF#h\n\
                 40 CLOSE#h: PRINT",
            )
            .unwrap();
        interp.run_program().unwrap();
        assert_eq!(interp.take_output(), "65 66 67 10 \n");
    }

    #[test]
    fn test_bput_string_with_semicolon_has_no_newline() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp
            .load_program(
                "10 h = OPENOUT \"f\": BPUT#h, \"X\";: CLOSE#h\n\
                 20 h = OPENIN \"f\": n% = 0\n\
                 30 REPEAT: n% += 1: b% = BGET#h: UNTIL EOF#h\n\
                 40 CLOSE#h: PRINT ;n%",
            )
            .unwrap();
        interp.run_program().unwrap();
        assert_eq!(interp.take_output(), "1\n");
    }
}
