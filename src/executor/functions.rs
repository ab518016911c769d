//! Built-in functions and pseudo-variables
//!
//! Reached from `factor` for any token that is not an operand or unary
//! operator. Single arguments are taken as a factor (`SIN x`, `LEN(a$)`),
//! bracketed lists by the keywords that end in `(`.

use super::expression::{finite, truth};
use super::{Interpreter, Value};
use crate::error::{ErrorKind, Result};
use crate::filesystem::OpenMode;
use crate::format;
use crate::memory::PREFIX_SIZE;
use crate::tokenizer::{self, *};
use crate::variables::{Number, VarCell, FORMAT_SLOT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

impl Interpreter {
    pub(super) fn builtin(&mut self, token: u8) -> Result<Value> {
        match token {
            TOK_ABS | TOK_ACS | TOK_ASN | TOK_ATN | TOK_COS | TOK_DEG | TOK_EXP | TOK_INT_FN
            | TOK_LN | TOK_LOG | TOK_RAD | TOK_SGN | TOK_SIN | TOK_SQR | TOK_TAN => {
                let value = self.factor()?;
                let n = self.to_number(value)?;
                Ok(maths(token, n)?.into())
            }
            TOK_PI => Ok(Value::Float(std::f64::consts::PI)),
            TOK_TRUE => Ok(truth(true).into()),
            TOK_FALSE => Ok(truth(false).into()),
            TOK_RND => self.rnd(),
            TOK_ASC => {
                let text = self.factor_bytes()?;
                Ok(Value::Int(text.first().map_or(-1, |&b| b as i32)))
            }
            TOK_LEN => {
                let text = self.factor_bytes()?;
                Ok(Value::Int(text.len() as i32))
            }
            TOK_VAL => {
                let text = self.factor_bytes()?;
                Ok(val_number(&text).into())
            }
            TOK_EVAL => {
                let text = self.factor_bytes()?;
                self.eval_text(&text)
            }
            TOK_CHRS => {
                let code = self.factor_int()?;
                self.string_value(&[code as u8])
            }
            TOK_STRS => {
                let hex = self.accept(b'~')?;
                let value = self.factor()?;
                let n = self.to_number(value)?;
                let text = if hex {
                    format::format_hex(n)?
                } else {
                    format::str_number(self.vars.get_static(FORMAT_SLOT), n)
                };
                self.string_value(text.as_bytes())
            }
            TOK_LEFTS | TOK_RIGHTS => self.left_right(token == TOK_LEFTS),
            TOK_MIDS => self.mid(),
            TOK_INSTR => self.instr(),
            TOK_STRINGS => {
                let count = self.arg_int()?;
                self.expect(b',')?;
                let value = self.expr()?;
                let text = self.to_bytes(value)?;
                self.expect(b')')?;
                let count = usize::try_from(count).unwrap_or(0);
                if text.len().saturating_mul(count) > self.config.max_string_len {
                    return Err(ErrorKind::StringLen.into());
                }
                self.string_value(&text.repeat(count))
            }
            TOK_GET | TOK_GETS => {
                self.poll_escape()?;
                let key = self.host.keyboard.get_char().ok_or(ErrorKind::Escape)?;
                if token == TOK_GET {
                    Ok(Value::Int(key as i32))
                } else {
                    self.string_value(&[key])
                }
            }
            TOK_INKEY | TOK_INKEYS => {
                let wait = self.factor_int()?;
                if wait < 0 {
                    return Err(ErrorKind::Unsupported("INKEY key scan").into());
                }
                let key = self.host.keyboard.inkey(wait);
                if token == TOK_INKEY {
                    Ok(Value::Int(key.map_or(-1, i32::from)))
                } else {
                    let text: Vec<u8> = key.into_iter().collect();
                    self.string_value(&text)
                }
            }
            TOK_POS | TOK_COUNT => Ok(Value::Int(self.host.screen.pos())),
            TOK_VPOS => Ok(Value::Int(self.host.screen.vpos())),
            TOK_ERR => Ok(Value::Int(self.last_error.as_ref().map_or(0, |e| e.number()))),
            TOK_ERL => {
                let line = self.last_error.as_ref().and_then(|e| e.line).unwrap_or(0);
                Ok(Value::Int(line as i32))
            }
            TOK_TIME => {
                let centiseconds = self.time_base.elapsed().as_millis() / 10;
                Ok(Number::from_i64(centiseconds as i64).into())
            }
            TOK_PAGE => Ok(Value::Int(self.ws.page as i32)),
            TOK_LOMEM => Ok(Value::Int(self.ws.lomem as i32)),
            TOK_HIMEM => Ok(Value::Int(self.ws.himem as i32)),
            TOK_DIM => self.dim_function(),
            TOK_OPENIN | TOK_OPENOUT | TOK_OPENUP => {
                let name = self.factor_bytes()?;
                let mode = match token {
                    TOK_OPENIN => OpenMode::Read,
                    TOK_OPENOUT => OpenMode::Write,
                    _ => OpenMode::Update,
                };
                let handle = self.host.files.open(&String::from_utf8_lossy(&name), mode)?;
                Ok(Value::Int(handle))
            }
            TOK_BGET => {
                self.expect(b'#')?;
                let handle = self.channel()?;
                Ok(Value::Int(self.host.files.bget(handle)? as i32))
            }
            TOK_EOF => {
                self.expect(b'#')?;
                let handle = self.channel()?;
                Ok(truth(self.host.files.eof(handle)?).into())
            }
            PREFIX_FUNCTION => match self.next_byte()? {
                XFN_TOP => Ok(Value::Int(self.ws.top as i32)),
                XFN_REPORTS => {
                    let text = self.report_text();
                    self.string_value(text.as_bytes())
                }
                _ => Err(ErrorKind::Syntax.into()),
            },
            TOK_USR => Err(ErrorKind::Unsupported("USR").into()),
            TOK_ADVAL => Err(ErrorKind::Unsupported("ADVAL").into()),
            TOK_POINT => Err(ErrorKind::Unsupported("POINT").into()),
            TOK_PTR | TOK_EXT => Err(ErrorKind::Unsupported("PTR#").into()),
            _ => Err(ErrorKind::Syntax.into()),
        }
    }

    fn factor_bytes(&mut self) -> Result<Vec<u8>> {
        let value = self.factor()?;
        self.to_bytes(value)
    }

    fn factor_int(&mut self) -> Result<i32> {
        let value = self.factor()?;
        self.to_number(value)?.to_i32()
    }

    /// An argument inside a bracketed list
    fn arg_int(&mut self) -> Result<i32> {
        let value = self.expr()?;
        self.to_number(value)?.to_i32()
    }

    /// Evaluate a first argument and hold it on the stack while `rest`
    /// reads the others, so that a function called there cannot free it
    fn held_argument<T, F>(&mut self, rest: F) -> Result<(Value, T)>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let first = self.expr()?;
        self.push_value(first)?;
        let others = rest(self)?;
        let first = self.pop_value()?;
        self.expect(b')')?;
        Ok((first, others))
    }

    /// `LEFT$(s$, n)` and `RIGHT$(s$, n)`; without `n`, all but the last
    /// character and the last character
    fn left_right(&mut self, left: bool) -> Result<Value> {
        let (text, count) = self.held_argument(|this| {
            if this.accept(b',')? {
                Ok(Some(this.arg_int()?))
            } else {
                Ok(None)
            }
        })?;
        let text = self.to_bytes(text)?;
        let len = text.len();
        let part = match (left, count) {
            (true, None) => &text[..len.saturating_sub(1)],
            (false, None) => &text[len.saturating_sub(1)..],
            (true, Some(n)) => &text[..clamp_count(n, len)],
            (false, Some(n)) => &text[len - clamp_count(n, len)..],
        };
        self.string_value(part)
    }

    /// `MID$(s$, start [, count])`, `start` counting from 1
    fn mid(&mut self) -> Result<Value> {
        let (text, (start, count)) = self.held_argument(|this| {
            this.expect(b',')?;
            let start = this.arg_int()?;
            let count = if this.accept(b',')? {
                Some(this.arg_int()?)
            } else {
                None
            };
            Ok((start, count))
        })?;
        let text = self.to_bytes(text)?;
        let from = (start.max(1) as usize - 1).min(text.len());
        let rest = &text[from..];
        let take = count.map_or(rest.len(), |n| clamp_count(n, rest.len()));
        self.string_value(&rest[..take])
    }

    /// `INSTR(s$, t$ [, start])`: position of `t$` at or after `start`, or 0
    fn instr(&mut self) -> Result<Value> {
        let (haystack, (needle, start)) = self.held_argument(|this| {
            this.expect(b',')?;
            let value = this.expr()?;
            let needle = this.to_bytes(value)?;
            let start = if this.accept(b',')? {
                this.arg_int()?
            } else {
                1
            };
            Ok((needle, start))
        })?;
        let haystack = self.to_bytes(haystack)?;
        let from = start.max(1) as usize - 1;
        if from > haystack.len() {
            return Ok(Value::Int(0));
        }
        if needle.is_empty() {
            return Ok(Value::Int(from as i32 + 1));
        }
        let found = haystack[from..]
            .windows(needle.len())
            .position(|window| window == needle.as_slice());
        Ok(Value::Int(found.map_or(0, |at| (from + at + 1) as i32)))
    }

    /// `RND` random integer, `RND(n)` 1 to n, `RND(1)` fraction,
    /// `RND(0)` last fraction again, `RND(-n)` reseed
    fn rnd(&mut self) -> Result<Value> {
        if self.peek()? != b'(' {
            return Ok(Value::Int(self.rng.gen::<i32>()));
        }
        let n = self.factor_int()?;
        Ok(match n {
            n if n < 0 => {
                self.rng = StdRng::seed_from_u64(n as u64);
                Value::Int(n)
            }
            0 => Value::Float(self.last_rnd),
            1 => {
                self.last_rnd = self.rng.gen::<f64>();
                Value::Float(self.last_rnd)
            }
            n => Value::Int(self.rng.gen_range(1..=n)),
        })
    }

    /// `DIM(a())` is the number of dimensions, `DIM(a(), n)` the number of
    /// elements along dimension `n`
    fn dim_function(&mut self) -> Result<Value> {
        self.expect(b'(')?;
        let name = self.read_name()?;
        if !name.ends_with(b"(") {
            return Err(ErrorKind::TypeMismatch.into());
        }
        self.expect(b')')?;
        let id = self.vars.lookup(&name).ok_or(ErrorKind::NoSuchVar)?;
        let dims = match &self.vars.get(id).cell {
            VarCell::Array {
                desc: Some(desc), ..
            } => desc.dims.clone(),
            VarCell::Array { desc: None, .. } => return Err(ErrorKind::ArrayDim.into()),
            _ => return Err(ErrorKind::TypeMismatch.into()),
        };
        let result = if self.accept(b',')? {
            let n = self.arg_int()?;
            let count = usize::try_from(n)
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|index| dims.get(index))
                .ok_or(ErrorKind::Subscript)?;
            *count as i32
        } else {
            dims.len() as i32
        };
        self.expect(b')')?;
        Ok(Value::Int(result))
    }

    /// `EVAL`: tokenise the text as an expression in the scratch area and
    /// evaluate it there
    fn eval_text(&mut self, text: &[u8]) -> Result<Value> {
        let source = format!("={}", String::from_utf8_lossy(text));
        let line = tokenizer::tokenize(&source)?;
        let start = self.eval_top;
        let end = start + line.tokens.len() + 1;
        if end > PREFIX_SIZE {
            return Err(ErrorKind::StringLen.into());
        }
        self.ws.write_bytes(start, &line.tokens)?;
        self.ws.poke(end - 1, TOK_EOL)?;
        let saved = self.current;
        self.current = start + 1;
        self.eval_top = end;
        let result = self.expr();
        let finished = self.peek();
        self.current = saved;
        self.eval_top = start;
        let value = result?;
        if finished? != TOK_EOL {
            self.release(value);
            return Err(ErrorKind::Syntax.into());
        }
        Ok(value)
    }
}

fn clamp_count(n: i32, len: usize) -> usize {
    usize::try_from(n).map_or(len, |n| n.min(len))
}

fn maths(token: u8, n: Number) -> Result<Number> {
    let x = n.to_f64();
    match token {
        TOK_ABS => Ok(match n {
            Number::Int(v) => v.checked_abs().map_or(Number::Int64(-(v as i64)), Number::Int),
            Number::Int64(v) => v.checked_abs().map_or(Number::Float(-x), Number::Int64),
            Number::Float(v) => Number::Float(v.abs()),
        }),
        TOK_SGN => Ok(Number::Int(match n {
            Number::Int(v) => v.signum(),
            Number::Int64(v) => v.signum() as i32,
            Number::Float(v) if v > 0.0 => 1,
            Number::Float(v) if v < 0.0 => -1,
            Number::Float(_) => 0,
        })),
        TOK_INT_FN => match n {
            Number::Float(v) => {
                let floor = v.floor();
                if floor >= i32::MIN as f64 && floor <= i32::MAX as f64 {
                    Ok(Number::Int(floor as i32))
                } else if floor >= i64::MIN as f64 && floor < i64::MAX as f64 {
                    Ok(Number::Int64(floor as i64))
                } else {
                    Err(ErrorKind::NumRange.into())
                }
            }
            whole => Ok(whole),
        },
        TOK_SQR if x < 0.0 => Err(ErrorKind::NegRoot.into()),
        TOK_LN | TOK_LOG if x <= 0.0 => Err(ErrorKind::LogRange.into()),
        TOK_ACS | TOK_ASN if !(-1.0..=1.0).contains(&x) => Err(ErrorKind::NumRange.into()),
        TOK_SQR => finite(x.sqrt()),
        TOK_LN => finite(x.ln()),
        TOK_LOG => finite(x.log10()),
        TOK_ACS => finite(x.acos()),
        TOK_ASN => finite(x.asin()),
        TOK_ATN => finite(x.atan()),
        TOK_COS => finite(x.cos()),
        TOK_SIN => finite(x.sin()),
        TOK_TAN => finite(x.tan()),
        TOK_EXP => finite(x.exp()),
        TOK_DEG => finite(x.to_degrees()),
        _ => finite(x.to_radians()),
    }
}

/// The number at the start of `text`, as `VAL`, `READ` and `INPUT` read
/// it. Leading spaces are skipped and anything unreadable gives 0.
pub(super) fn val_number(text: &[u8]) -> Number {
    let start = text.iter().position(|&b| b != b' ').unwrap_or(text.len());
    let bytes = &text[start..];
    let digits_from = |mut i: usize| {
        while bytes.get(i).map_or(false, u8::is_ascii_digit) {
            i += 1;
        }
        i
    };
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let mantissa = end;
    end = digits_from(end);
    let mut is_float = false;
    if bytes.get(end) == Some(&b'.') {
        is_float = true;
        end = digits_from(end + 1);
    }
    if end - mantissa <= usize::from(is_float) {
        return Number::Int(0);
    }
    if matches!(bytes.get(end), Some(b'E' | b'e')) {
        let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exponent = digits_from(end + 1 + sign);
        if exponent > end + 1 + sign {
            end = exponent;
            is_float = true;
        }
    }
    let number = String::from_utf8_lossy(&bytes[..end]);
    if !is_float {
        if let Ok(v) = number.parse::<i32>() {
            return Number::Int(v);
        }
    }
    number.parse::<f64>().map_or(Number::Int(0), Number::Float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Host, InterpreterConfig};
    use crate::os::ScriptedKeyboard;
    use quickcheck::{QuickCheck, TestResult};

    fn print(expr: &str) -> String {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.exec_thisline(&format!("PRINT ;{}", expr)).unwrap();
        interp.take_output().trim_end_matches('\n').to_string()
    }

    fn fails(expr: &str) -> ErrorKind {
        let mut interp = Interpreter::in_memory().unwrap();
        interp
            .exec_thisline(&format!("x = {}", expr))
            .unwrap_err()
            .kind
    }

    #[test]
    fn test_maths() {
        assert_eq!(print("ABS -3;\" \";SQR 16;\" \";INT -2.5;\" \";SGN -7"), "3 4 -3 -1");
        assert_eq!(print("INT 7.9;\" \";DEG PI;\" \";EXP 0;\" \";LN 1"), "7 180 1 0");
        assert_eq!(print("ABS -2147483648"), "2147483648");
        assert_eq!(fails("SQR -1"), ErrorKind::NegRoot);
        assert_eq!(fails("LN 0"), ErrorKind::LogRange);
        assert_eq!(fails("ACS 2"), ErrorKind::NumRange);
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            print("LEFT$(\"hello\",2);MID$(\"hello\",2,3);RIGHT$(\"hello\",2);LEN\"abc\""),
            "heelllo3"
        );
        assert_eq!(print("LEFT$(\"hello\");\"|\";RIGHT$(\"hello\")"), "hell|o");
        assert_eq!(print("MID$(\"hello\",4);MID$(\"hello\",9);\"|\""), "lo|");
        assert_eq!(
            print("INSTR(\"banana\",\"an\");INSTR(\"banana\",\"an\",3);INSTR(\"banana\",\"x\")"),
            "240"
        );
        assert_eq!(print("STRING$(3,\"ab\");CHR$65;ASC\"A\";ASC\"\""), "abababA65-1");
        assert_eq!(print("STR$ 1.5;STR$~255"), "1.5FF");
        assert_eq!(print("VAL\"12abc\";\" \";VAL\" -2.5e1x\""), "12 -25");
    }

    #[test]
    fn test_held_argument_survives_reassignment() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.load_program("10 a$ = \"abcdef\"\n20 PRINT LEFT$(a$, FNclobber)\n30 END\n40 DEF FNclobber: a$ = \"\": = 3").unwrap();
        interp.run_program().unwrap();
        assert_eq!(interp.take_output(), "abc\n");
        assert_eq!(interp.strings().live_count(), 0);
    }

    #[test]
    fn test_eval() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.exec_thisline("x = 5: PRINT ;EVAL \"3*4+1\";\" \";EVAL(\"x*2\")").unwrap();
        assert_eq!(interp.take_output(), "13 10\n");
        let err = interp.exec_thisline("PRINT EVAL \"1 2\"").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_dim_function() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.exec_thisline("DIM a(2,3): PRINT ;DIM(a());DIM(a(),1);DIM(a(),2)").unwrap();
        assert_eq!(interp.take_output(), "234\n");
        let err = interp.exec_thisline("PRINT DIM(a(),3)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Subscript);
    }

    #[test]
    fn test_rnd_forms() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp.exec_thisline("x = RND(-7): a = RND(1): b = RND(0)").unwrap();
        interp.exec_thisline("PRINT ;x;\" \";a = b").unwrap();
        assert_eq!(interp.take_output(), "-7 -1\n");
        interp.exec_thisline("x = RND(-7): c = RND(1): PRINT ;a = c").unwrap();
        assert_eq!(interp.take_output(), "-1\n");
        for _ in 0..20 {
            interp.exec_thisline("PRINT ;RND(6) >= 1 AND RND(6) <= 6").unwrap();
            assert_eq!(interp.take_output(), "-1\n");
        }
    }

    #[test]
    fn test_keyboard_functions() {
        let config = InterpreterConfig::default();
        let mut keyboard = ScriptedKeyboard::new();
        keyboard.push_keys(b"AB");
        let mut interp =
            Interpreter::new(config.clone(), Host::with_input(&config, keyboard)).unwrap();
        interp.exec_thisline("PRINT GET$;GET;INKEY(0)").unwrap();
        assert_eq!(interp.take_output(), "A66-1\n");
        let err = interp.exec_thisline("k = GET").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Escape);
    }

    #[test]
    fn test_memory_pseudo_variables() {
        assert_eq!(print("TOP > PAGE;HIMEM > LOMEM;TRUE;FALSE"), "-1-1-10");
        assert_eq!(fails("USR 0"), ErrorKind::Unsupported("USR"));
    }

    #[test]
    fn test_val_number() {
        assert_eq!(val_number(b"42"), Number::Int(42));
        assert_eq!(val_number(b"  -7xyz"), Number::Int(-7));
        assert_eq!(val_number(b".5"), Number::Float(0.5));
        assert_eq!(val_number(b"1E3"), Number::Float(1000.0));
        assert_eq!(val_number(b"1E"), Number::Int(1));
        assert_eq!(val_number(b"3000000000"), Number::Float(3e9));
        assert_eq!(val_number(b"-"), Number::Int(0));
        assert_eq!(val_number(b"."), Number::Int(0));
        assert_eq!(val_number(b""), Number::Int(0));
    }

    #[test]
    fn prop_val_reads_back_str() {
        fn prop(v: i32) -> TestResult {
            let text = format::str_number(format::DEFAULT_FORMAT, Number::Int(v));
            TestResult::from_bool(val_number(text.as_bytes()) == Number::Int(v))
        }
        QuickCheck::new()
            .tests(500)
            .quickcheck(prop as fn(i32) -> TestResult);
    }
}
