//! Assignment targets and the statements that write through them

use super::{Flow, Interpreter, Value};
use crate::error::{ErrorKind, Result};
use crate::format;
use crate::lvalue::{Location, Lvalue, LvalueType, Stored};
use crate::stack::Operator;
use crate::tokenizer::*;
use crate::variables::{static_slot, ArrayDesc, Number, VarCell, VarType, FORMAT_SLOT};
use log::debug;
use std::time::{Duration, Instant};

impl Interpreter {
    /// Parse an assignable location: a variable, an array element, or an
    /// indirection (`?a`, `!a`, `|a`, `|.a`, `$a`, `b?n`, `b!n`).
    /// Variables are created on demand only when `create` is set.
    pub(super) fn resolve_lvalue(&mut self, create: bool) -> Result<Lvalue> {
        let lv = match self.peek()? {
            b'?' | b'!' | b'|' | b'$' | TOK_FLTIND => {
                let op = self.next_byte()?;
                let addr = self.eval_factor_number()?.to_i64()?;
                return self.indirection(op, addr);
            }
            _ => {
                let name = self.read_name()?;
                self.named_lvalue(&name, create)?
            }
        };
        let numeric = matches!(lv.ty, LvalueType::Scalar(ty) if ty.is_numeric());
        match self.peek()? {
            op @ (b'?' | b'!') if numeric => {
                self.current += 1;
                let value = self.load_value(&lv)?;
                let base = self.to_number(value)?.to_i64()?;
                let offset = self.eval_factor_number()?.to_i64()?;
                let addr = base.checked_add(offset).ok_or(ErrorKind::BadAddress)?;
                self.indirection(op, addr)
            }
            _ => Ok(lv),
        }
    }

    fn indirection(&self, op: u8, addr: i64) -> Result<Lvalue> {
        let (ty, len) = match op {
            b'?' => (LvalueType::Scalar(VarType::Byte), 1),
            b'!' => (LvalueType::Scalar(VarType::Integer), 4),
            b'|' => (LvalueType::Scalar(VarType::Integer64), 8),
            TOK_FLTIND => (LvalueType::Scalar(VarType::Real), 8),
            _ => (LvalueType::CrString, 1),
        };
        Ok(Lvalue::indirect(self.ws.address(addr, len)?, ty))
    }

    /// The location a name refers to; a trailing `(` means an array element
    /// whose subscripts follow
    pub(super) fn named_lvalue(&mut self, name: &[u8], create: bool) -> Result<Lvalue> {
        if let Some(slot) = static_slot(name) {
            return Ok(Lvalue::static_int(slot));
        }
        if name.ends_with(b"(") {
            return self.array_element(name);
        }
        let id = if create {
            self.vars.find_or_create(&mut self.ws, name)?
        } else {
            self.vars.lookup(name).ok_or(ErrorKind::NoSuchVar)?
        };
        Ok(Lvalue::variable(id, LvalueType::Scalar(VarType::from_name(name))))
    }

    /// A whole array, `name()`
    pub(super) fn array_lvalue(&mut self, name: &[u8], create: bool) -> Result<Lvalue> {
        let id = if create {
            self.vars.find_or_create(&mut self.ws, name)?
        } else {
            self.vars.lookup(name).ok_or(ErrorKind::NoSuchVar)?
        };
        match self.vars.get(id).cell {
            VarCell::Array { element, .. } => Ok(Lvalue::variable(id, LvalueType::Array(element))),
            _ => Err(ErrorKind::TypeMismatch.into()),
        }
    }

    fn array_element(&mut self, name: &[u8]) -> Result<Lvalue> {
        let id = self.vars.lookup(name).ok_or(ErrorKind::NoSuchVar)?;
        let desc = match &self.vars.get(id).cell {
            VarCell::Array {
                desc: Some(desc), ..
            } => desc.clone(),
            VarCell::Array { desc: None, .. } => return Err(ErrorKind::ArrayDim.into()),
            _ => return Err(ErrorKind::TypeMismatch.into()),
        };
        let mut indices = Vec::with_capacity(desc.dims.len());
        loop {
            indices.push(self.eval_i64()?);
            if !self.accept(b',')? {
                break;
            }
        }
        self.expect(b')')?;
        let offset = desc.element_offset(&indices)?;
        Ok(Lvalue::indirect(offset, LvalueType::Scalar(desc.element)))
    }

    /// Current value of a location; strings come back borrowed
    pub(super) fn load_value(&mut self, lv: &Lvalue) -> Result<Value> {
        match self.storage().load(lv)? {
            Stored::Byte(v) => Ok(Value::Int(v as i32)),
            Stored::Int(v) => Ok(Value::Int(v)),
            Stored::Int64(v) => Ok(Value::Int64(v)),
            Stored::Float(v) => Ok(Value::Float(v)),
            Stored::Str(desc) => Ok(Value::Str { desc, owned: false }),
            Stored::CrStr(text) => self.string_value(&text),
            Stored::Array(_) => Err(ErrorKind::TypeMismatch.into()),
        }
    }

    /// Assign with conversion. A string assigned to `@%` is read as a
    /// format description.
    pub(super) fn store_value(&mut self, lv: &Lvalue, value: Value) -> Result<()> {
        match value {
            Value::Str { .. } if lv.loc == Location::Static(FORMAT_SLOT) => {
                let text = self.to_bytes(value)?;
                let current = self.vars.get_static(FORMAT_SLOT);
                let word = format::parse_format(&String::from_utf8_lossy(&text), current)?;
                self.vars.set_static(FORMAT_SLOT, word);
                Ok(())
            }
            Value::Str { desc, owned } => self.storage().store_string(lv, desc, owned),
            _ => {
                let n = self.to_number(value)?;
                self.storage().store_number(lv, n)
            }
        }
    }

    /// `[LET] target = expr`, `target += expr`, `target -= expr`
    pub(super) fn assignment(&mut self) -> Result<Flow> {
        let lv = self.resolve_lvalue(true)?;
        let op = self.peek()?;
        match op {
            b'=' => {
                self.current += 1;
                let value = self.eval()?;
                self.store_value(&lv, value)?;
            }
            TOK_PLUSAB if lv.ty == LvalueType::Scalar(VarType::String) => {
                self.current += 1;
                let rhs = self.eval()?;
                let text = self.to_bytes(rhs)?;
                self.storage().append_string(&lv, &text)?;
            }
            TOK_PLUSAB | TOK_MINUSAB => {
                self.current += 1;
                let rhs = self.eval()?;
                let current = match self.load_value(&lv) {
                    Ok(v) => v,
                    Err(err) => {
                        self.release(rhs);
                        return Err(err);
                    }
                };
                let operator = if op == TOK_PLUSAB {
                    Operator::Add
                } else {
                    Operator::Sub
                };
                let result = self.apply(operator, current, rhs)?;
                self.store_value(&lv, result)?;
            }
            _ => return Err(ErrorKind::Syntax.into()),
        }
        Ok(Flow::Continue)
    }

    /// `TIME=`, `HIMEM=`, `LOMEM=` and `PAGE=`
    pub(super) fn pseudo_assignment(&mut self, token: u8) -> Result<Flow> {
        self.expect(b'=')?;
        let value = self.eval_i64()?;
        match token {
            TOK_TIME => {
                let elapsed = Duration::from_millis(value.max(0) as u64 * 10);
                self.time_base = Instant::now()
                    .checked_sub(elapsed)
                    .unwrap_or_else(Instant::now);
            }
            TOK_HIMEM | TOK_LOMEM => {
                if !self.stack.safe_to_relocate() {
                    return Err(ErrorKind::Command.into());
                }
                let addr = self.ws.address(value, 0)?;
                if token == TOK_HIMEM {
                    self.ws.set_himem(addr)?;
                } else {
                    self.ws.set_lomem(addr)?;
                    self.clear_varlists();
                    self.clear_strings();
                }
                debug!("HIMEM {:#x} LOMEM {:#x}", self.ws.himem, self.ws.lomem);
            }
            _ => return Err(ErrorKind::Unsupported("PAGE=").into()),
        }
        Ok(Flow::Continue)
    }

    /// `DIM a(bounds)` and `DIM p% size`, in a comma-separated list
    pub(super) fn dim_statement(&mut self) -> Result<Flow> {
        loop {
            let name = self.read_name()?;
            if name.ends_with(b"(") {
                self.dim_array(&name)?;
            } else {
                let lv = self.named_lvalue(&name, true)?;
                if lv.is_string() {
                    return Err(ErrorKind::ArrayDim.into());
                }
                let size = self.eval_i64()?;
                if size < -1 {
                    return Err(ErrorKind::ArrayDim.into());
                }
                let addr = self.ws.alloc_heap((size + 1) as usize)?;
                self.storage()
                    .store_number(&lv, Number::from_i64(addr as i64))?;
            }
            if !self.accept(b',')? {
                break;
            }
        }
        Ok(Flow::Continue)
    }

    fn dim_array(&mut self, name: &[u8]) -> Result<()> {
        let id = self.vars.find_or_create(&mut self.ws, name)?;
        let variable = self.vars.get(id);
        let element = match variable.cell {
            VarCell::Array { element, desc: None } => element,
            VarCell::Array { desc: Some(_), .. } => return Err(ErrorKind::ArrayDim.into()),
            _ => return Err(ErrorKind::TypeMismatch.into()),
        };
        let local = variable.local_array;
        let mut bounds = Vec::new();
        loop {
            bounds.push(self.eval_i64()?);
            if !self.accept(b',')? {
                break;
            }
        }
        self.expect(b')')?;
        let (mut desc, bytes) = ArrayDesc::layout(element, &bounds)?;
        desc.base = if local {
            self.stack
                .push_local_array(&mut self.ws, bytes, element == VarType::String)?
        } else {
            self.ws.alloc_heap(bytes)?
        };
        debug!(
            "DIM {}{:?} at {:#x}",
            String::from_utf8_lossy(name),
            desc.dims,
            desc.base
        );
        if let VarCell::Array { desc: slot, .. } = &mut self.vars.get_mut(id).cell {
            *slot = Some(desc);
        }
        Ok(())
    }

    /// `SWAP a, b` for two numbers, two strings or two whole arrays
    pub(super) fn swap_statement(&mut self) -> Result<Flow> {
        let a = self.swap_target()?;
        self.expect(b',')?;
        let b = self.swap_target()?;
        let compatible = match (a.ty, b.ty) {
            (LvalueType::Array(x), LvalueType::Array(y)) => x == y,
            (LvalueType::Array(_), _) | (_, LvalueType::Array(_)) => false,
            _ => a.is_string() == b.is_string(),
        };
        if !compatible {
            return Err(ErrorKind::TypeMismatch.into());
        }
        if a != b {
            let first = self.storage().take(&a)?;
            let second = self.storage().take(&b)?;
            self.storage().store(&a, second)?;
            self.storage().store(&b, first)?;
        }
        Ok(Flow::Continue)
    }

    fn swap_target(&mut self) -> Result<Lvalue> {
        let (name, end) = self.name_at(self.current, true)?;
        if name.ends_with(b"(") && self.ws.peek(end)? == b')' {
            self.current = end + 1;
            return self.array_lvalue(&name, false);
        }
        self.resolve_lvalue(true)
    }
}
