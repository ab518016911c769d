//! Expression evaluation
//!
//! Operator precedence parsing over the token stream. Left operands wait
//! on the value stack and their operators on the operator stack frame of
//! the current expression; nested brackets and function arguments share
//! that frame and only reduce the operators they pushed themselves.

use super::Interpreter;
use crate::error::{ErrorKind, Result};
use crate::stack::Operator;
use crate::strings::StringDesc;
use crate::tokenizer::*;
use crate::variables::Number;
use std::cmp::Ordering;

/// Result of evaluating an expression
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Value {
    Int(i32),
    Int64(i64),
    Float(f64),
    /// An `owned` string is a temporary the receiver must free or keep;
    /// any other string belongs to a variable
    Str { desc: StringDesc, owned: bool },
}

impl From<Number> for Value {
    fn from(n: Number) -> Value {
        match n {
            Number::Int(v) => Value::Int(v),
            Number::Int64(v) => Value::Int64(v),
            Number::Float(v) => Value::Float(v),
        }
    }
}

impl Value {
    pub(crate) fn number(self) -> Option<Number> {
        match self {
            Value::Int(v) => Some(Number::Int(v)),
            Value::Int64(v) => Some(Number::Int64(v)),
            Value::Float(v) => Some(Number::Float(v)),
            Value::Str { .. } => None,
        }
    }
}

/// The all-ones truth value
pub(crate) const TRUE: i32 = -1;

pub(super) fn truth(flag: bool) -> Number {
    Number::Int(if flag { TRUE } else { 0 })
}

pub(super) fn finite(v: f64) -> Result<Number> {
    if v.is_finite() {
        Ok(Number::Float(v))
    } else {
        Err(ErrorKind::NumRange.into())
    }
}

/// Integer operand for the bitwise operators, `DIV` and `MOD`
fn integer(n: Number) -> Result<i64> {
    n.to_i64()
}

fn is_wide(a: Number, b: Number) -> bool {
    matches!(a, Number::Int64(_)) || matches!(b, Number::Int64(_))
}

/// Apply a binary operator to two numbers. Integer results widen from 32
/// to 64 bits and then to floating point rather than overflow.
pub(crate) fn arith(op: Operator, a: Number, b: Number) -> Result<Number> {
    use Number::{Float, Int, Int64};
    match op {
        Operator::Add | Operator::Sub | Operator::Mul => match (a, b) {
            (Int(x), Int(y)) => {
                let (x, y) = (x as i64, y as i64);
                let r = match op {
                    Operator::Add => x + y,
                    Operator::Sub => x - y,
                    _ => x * y,
                };
                Ok(Number::from_i64(r))
            }
            (Float(_), _) | (_, Float(_)) => {
                let (x, y) = (a.to_f64(), b.to_f64());
                finite(match op {
                    Operator::Add => x + y,
                    Operator::Sub => x - y,
                    _ => x * y,
                })
            }
            _ => {
                let (x, y) = (a.to_i64()?, b.to_i64()?);
                let r = match op {
                    Operator::Add => x.checked_add(y),
                    Operator::Sub => x.checked_sub(y),
                    _ => x.checked_mul(y),
                };
                match r {
                    Some(v) => Ok(Int64(v)),
                    None => arith(op, Float(x as f64), Float(y as f64)),
                }
            }
        },
        Operator::Divide => {
            let y = b.to_f64();
            if y == 0.0 {
                return Err(ErrorKind::DivZero.into());
            }
            finite(a.to_f64() / y)
        }
        Operator::IntDiv | Operator::Mod => {
            let (x, y) = (integer(a)?, integer(b)?);
            if y == 0 {
                return Err(ErrorKind::DivZero.into());
            }
            let r = if op == Operator::IntDiv {
                x.checked_div(y)
            } else {
                x.checked_rem(y)
            };
            let r = r.ok_or(ErrorKind::NumRange)?;
            Ok(if is_wide(a, b) { Int64(r) } else { Number::from_i64(r) })
        }
        Operator::Power => {
            if let (Int(x), Int(y)) = (a, b) {
                if (0..=62).contains(&y) {
                    if let Some(r) = (x as i64).checked_pow(y as u32) {
                        return Ok(Number::from_i64(r));
                    }
                }
            }
            let (x, y) = (a.to_f64(), b.to_f64());
            if x < 0.0 && y.fract() != 0.0 {
                return Err(ErrorKind::LogRange.into());
            }
            finite(x.powf(y))
        }
        Operator::And | Operator::Or | Operator::Eor => {
            if is_wide(a, b) {
                let (x, y) = (integer(a)?, integer(b)?);
                Ok(Int64(match op {
                    Operator::And => x & y,
                    Operator::Or => x | y,
                    _ => x ^ y,
                }))
            } else {
                let (x, y) = (a.to_i32()?, b.to_i32()?);
                Ok(Int(match op {
                    Operator::And => x & y,
                    Operator::Or => x | y,
                    _ => x ^ y,
                }))
            }
        }
        Operator::Lsl | Operator::Asr | Operator::Lsr => {
            let n = b.to_i32()?;
            if let Int64(x) = a {
                let n = (n & 63) as u32;
                return Ok(Int64(match op {
                    Operator::Lsl => x.wrapping_shl(n),
                    Operator::Asr => x >> n,
                    _ => ((x as u64) >> n) as i64,
                }));
            }
            let x = a.to_i32()?;
            let n = (n & 31) as u32;
            Ok(Int(match op {
                Operator::Lsl => x.wrapping_shl(n),
                Operator::Asr => x >> n,
                _ => ((x as u32) >> n) as i32,
            }))
        }
        Operator::Eq | Operator::Ne | Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge => {
            let ordering = match (a, b) {
                (Float(_), _) | (_, Float(_)) => a.to_f64().partial_cmp(&b.to_f64()),
                _ => Some(a.to_i64()?.cmp(&b.to_i64()?)),
            };
            Ok(truth(compare(op, ordering)))
        }
    }
}

fn compare(op: Operator, ordering: Option<Ordering>) -> bool {
    let ordering = match ordering {
        Some(o) => o,
        None => return op == Operator::Ne,
    };
    match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Le => ordering != Ordering::Greater,
        _ => ordering != Ordering::Less,
    }
}

pub(crate) fn negate(n: Number) -> Number {
    match n {
        Number::Int(v) => v
            .checked_neg()
            .map_or(Number::Int64(-(v as i64)), Number::Int),
        Number::Int64(v) => v
            .checked_neg()
            .map_or(Number::Float(-(v as f64)), Number::Int64),
        Number::Float(v) => Number::Float(-v),
    }
}

impl Interpreter {
    /// Evaluate a complete expression
    pub(super) fn eval(&mut self) -> Result<Value> {
        self.with_opstack(Self::expr)
    }

    pub(super) fn eval_number(&mut self) -> Result<Number> {
        let value = self.eval()?;
        self.to_number(value)
    }

    pub(super) fn eval_int(&mut self) -> Result<i32> {
        self.eval_number()?.to_i32()
    }

    pub(super) fn eval_i64(&mut self) -> Result<i64> {
        self.eval_number()?.to_i64()
    }

    pub(super) fn eval_bytes(&mut self) -> Result<Vec<u8>> {
        let value = self.eval()?;
        self.to_bytes(value)
    }

    /// Evaluate a single factor, as taken by `#channel` and indirection
    pub(super) fn eval_factor_number(&mut self) -> Result<Number> {
        let value = self.with_opstack(Self::factor)?;
        self.to_number(value)
    }

    pub(super) fn to_number(&mut self, value: Value) -> Result<Number> {
        match value.number() {
            Some(n) => Ok(n),
            None => {
                self.release(value);
                Err(ErrorKind::NumberWanted.into())
            }
        }
    }

    /// Copy the text of a string value, releasing it if temporary
    pub(super) fn to_bytes(&mut self, value: Value) -> Result<Vec<u8>> {
        match value {
            Value::Str { desc, owned } => {
                let text = self.strings.bytes(desc).to_vec();
                if owned {
                    self.strings.free(desc);
                }
                Ok(text)
            }
            _ => Err(ErrorKind::StringWanted.into()),
        }
    }

    /// A fresh temporary holding `text`
    pub(super) fn string_value(&mut self, text: &[u8]) -> Result<Value> {
        if text.len() > self.config.max_string_len {
            return Err(ErrorKind::StringLen.into());
        }
        Ok(Value::Str {
            desc: self.strings.store(text)?,
            owned: true,
        })
    }

    /// The expression loop. Must run with an operator stack frame active.
    pub(super) fn expr(&mut self) -> Result<Value> {
        let index = self
            .opstack
            .ok_or(ErrorKind::Broken("expression without operator stack"))?;
        let base = self.stack.opstack_mut(index)?.len();
        let mut lhs = self.factor()?;
        while let Some(op) = Operator::from_token(self.peek()?) {
            self.current += 1;
            loop {
                let ops = self.stack.opstack_mut(index)?;
                let pending = match ops.top() {
                    Some(prev) if ops.len() > base && prev.precedence() >= op.precedence() => prev,
                    _ => break,
                };
                ops.pop();
                let left = self.pop_value()?;
                lhs = self.apply(pending, left, lhs)?;
            }
            self.push_value(lhs)?;
            self.stack.opstack_mut(index)?.push(op)?;
            lhs = self.factor()?;
        }
        loop {
            let ops = self.stack.opstack_mut(index)?;
            if ops.len() <= base {
                break;
            }
            let op = match ops.pop() {
                Some(op) => op,
                None => break,
            };
            let left = self.pop_value()?;
            lhs = self.apply(op, left, lhs)?;
        }
        Ok(lhs)
    }

    pub(super) fn apply(&mut self, op: Operator, left: Value, right: Value) -> Result<Value> {
        match (left.number(), right.number()) {
            (Some(a), Some(b)) => Ok(arith(op, a, b)?.into()),
            (None, None) => self.apply_strings(op, left, right),
            _ => {
                self.release(left);
                self.release(right);
                Err(ErrorKind::TypeMismatch.into())
            }
        }
    }

    fn apply_strings(&mut self, op: Operator, left: Value, right: Value) -> Result<Value> {
        let (a, b) = match (left, right) {
            (Value::Str { desc: a, .. }, Value::Str { desc: b, .. }) => (a, b),
            _ => return Err(ErrorKind::TypeMismatch.into()),
        };
        let result = if op == Operator::Add {
            if (a.len + b.len) as usize > self.config.max_string_len {
                Err(ErrorKind::StringLen.into())
            } else {
                let mut text = self.strings.bytes(a).to_vec();
                text.extend_from_slice(self.strings.bytes(b));
                self.string_value(&text)
            }
        } else if op.is_comparison() {
            let ordering = self.strings.bytes(a).cmp(self.strings.bytes(b));
            Ok(truth(compare(op, Some(ordering))).into())
        } else {
            Err(ErrorKind::TypeMismatch.into())
        };
        self.release(left);
        self.release(right);
        result
    }

    /// One operand: a constant, variable, bracketed expression, unary
    /// operator applied to a factor, or function call
    pub(super) fn factor(&mut self) -> Result<Value> {
        let token = self.next_byte()?;
        match token {
            TOK_INT => {
                let v = self.ws.read_i32(self.current)?;
                self.current += 4;
                Ok(Value::Int(v))
            }
            TOK_INT64 => {
                let v = self.ws.read_i64(self.current)?;
                self.current += 8;
                Ok(Value::Int64(v))
            }
            TOK_FLOAT => {
                let v = self.ws.read_f64(self.current)?;
                self.current += 8;
                Ok(Value::Float(v))
            }
            TOK_STRCON => {
                let len = self.ws.read_u16(self.current)? as usize;
                let start = self.current + 2;
                self.current = start + len;
                let text = self.ws.bytes(start, len)?.to_vec();
                self.string_value(&text)
            }
            b'(' => {
                let value = self.expr()?;
                if let Err(err) = self.expect(b')') {
                    self.release(value);
                    return Err(err);
                }
                Ok(value)
            }
            b'-' => {
                let value = self.factor()?;
                Ok(negate(self.to_number(value)?).into())
            }
            b'+' => {
                let value = self.factor()?;
                Ok(self.to_number(value)?.into())
            }
            TOK_NOT => {
                let value = self.factor()?;
                Ok(match self.to_number(value)? {
                    Number::Int64(v) => Value::Int64(!v),
                    n => Value::Int(!n.to_i32()?),
                })
            }
            b'?' | b'!' | b'|' | b'$' | TOK_FLTIND => {
                self.current -= 1;
                let lv = self.resolve_lvalue(false)?;
                self.load_value(&lv)
            }
            TOK_FN => self.call_function(),
            b'@' => {
                self.current -= 1;
                let lv = self.resolve_lvalue(false)?;
                self.load_value(&lv)
            }
            c if c.is_ascii_alphabetic() || c == b'_' || c == b'`' => {
                self.current -= 1;
                let lv = self.resolve_lvalue(false)?;
                self.load_value(&lv)
            }
            TOK_EOL | b':' | b',' | b')' | b';' => Err(ErrorKind::Syntax.into()),
            other => self.builtin(other),
        }
    }
}
