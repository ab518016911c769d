//! Moving values on and off the stack, and unwinding it
//!
//! Popping a frame is where its meaning lives: a `LOCAL` frame puts the
//! saved value back, a `RETURN` parameter hands its final value to the
//! caller's variable, handler frames reinstate the handlers they shadowed
//! and string temporaries are released.

use super::{Interpreter, Value};
use crate::error::{ErrorKind, Result};
use crate::lvalue::{Location, Lvalue, LvalueType, Stored};
use crate::stack::{Frame, OpStack};
use log::trace;

impl Interpreter {
    /// Push an intermediate value. Borrowed strings are copied so that the
    /// frame owns what it holds.
    pub(super) fn push_value(&mut self, value: Value) -> Result<()> {
        if let Err(err) = self.stack.check_stack(&self.ws, 1) {
            self.release(value);
            return Err(err);
        }
        let frame = match value {
            Value::Int(v) => Frame::Int(v),
            Value::Int64(v) => Frame::Int64(v),
            Value::Float(v) => Frame::Float(v),
            Value::Str { desc, owned } => {
                let desc = if owned {
                    desc
                } else {
                    let text = self.strings.bytes(desc).to_vec();
                    self.strings.store(&text)?
                };
                Frame::StrTemp(desc)
            }
        };
        self.stack.push(&mut self.ws, frame)
    }

    pub(super) fn pop_value(&mut self) -> Result<Value> {
        match self.stack.pop(&mut self.ws) {
            Some(Frame::Int(v)) => Ok(Value::Int(v)),
            Some(Frame::Int64(v)) => Ok(Value::Int64(v)),
            Some(Frame::Float(v)) => Ok(Value::Float(v)),
            Some(Frame::StrTemp(desc)) => Ok(Value::Str { desc, owned: true }),
            Some(other) => {
                let tag = other.tag().name();
                self.stack.push(&mut self.ws, other)?;
                trace!("expected a value on the stack, found {}", tag);
                Err(ErrorKind::Broken("value stack out of step").into())
            }
            None => Err(ErrorKind::Broken("value stack empty").into()),
        }
    }

    /// Give back a temporary string
    pub(super) fn release(&mut self, value: Value) {
        if let Value::Str { desc, owned: true } = value {
            self.strings.free(desc);
        }
    }

    /// Make sure a string value is a temporary the caller may keep
    pub(super) fn own(&mut self, value: Value) -> Result<Value> {
        match value {
            Value::Str { desc, owned: false } => {
                let text = self.strings.bytes(desc).to_vec();
                Ok(Value::Str {
                    desc: self.strings.store(&text)?,
                    owned: true,
                })
            }
            other => Ok(other),
        }
    }

    /// Run `f` with an operator stack available, creating one for the
    /// duration when no expression is in progress
    pub(super) fn with_opstack<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.opstack.is_some() {
            return f(self);
        }
        let index = self.stack.depth();
        self.stack.push(&mut self.ws, Frame::OpStack(OpStack::new()))?;
        self.opstack = Some(index);
        let result = f(self);
        if result.is_ok() {
            self.unwind_to(index, false)?;
        }
        self.opstack = None;
        result
    }

    /// Pop frames until `depth` remain, undoing what each one stands for.
    /// `RETURN` parameters are written back after every frame is gone,
    /// and only when `write_back` is set.
    pub(super) fn unwind_to(&mut self, depth: usize, write_back: bool) -> Result<()> {
        let mut pending = Vec::new();
        let mut failure = None;
        while self.stack.depth() > depth {
            let frame = match self.stack.pop(&mut self.ws) {
                Some(frame) => frame,
                None => break,
            };
            if let Err(err) = self.discard_frame(frame, &mut pending) {
                failure.get_or_insert(err);
            }
        }
        if let Some(err) = failure {
            self.drop_pending(pending);
            return Err(err);
        }
        if !write_back {
            self.drop_pending(pending);
            return Ok(());
        }
        // collected innermost first, so apply in reverse to follow the
        // order the parameters were written
        while let Some((dest, value)) = pending.pop() {
            self.storage().store(&dest, value)?;
        }
        Ok(())
    }

    fn drop_pending(&mut self, pending: Vec<(Lvalue, Stored)>) {
        for (_, value) in pending {
            if let Stored::Str(desc) = value {
                self.strings.free(desc);
            }
        }
    }

    fn discard_frame(&mut self, frame: Frame, pending: &mut Vec<(Lvalue, Stored)>) -> Result<()> {
        let index = self.stack.depth();
        match frame {
            Frame::OpStack(_) => {
                if self.opstack == Some(index) {
                    self.opstack = None;
                }
            }
            Frame::StrTemp(desc) => self.strings.free(desc),
            Frame::LocString { base, size } => {
                let region = self.ws.bytes(base, size)?;
                self.strings.discard_descriptors(region);
            }
            Frame::Local { target, saved } => {
                self.storage().restore(&target, saved)?;
                if let (LvalueType::Array(_), Location::Variable(id)) = (target.ty, target.loc) {
                    self.vars.get_mut(id).local_array = false;
                }
            }
            Frame::RetParm { target, saved, dest } => {
                let value = self.storage().take(&target)?;
                self.storage().restore(&target, saved)?;
                pending.push((dest, value));
            }
            Frame::Restart(restart) => self.local_handler = restart.previous,
            Frame::Error(saved) => {
                self.error_handler = saved.global;
                self.local_handler = saved.local;
            }
            Frame::Data(cursor) => self.data_cursor = cursor,
            Frame::Fn(call) => {
                self.opstack = call.saved_opstack;
                self.local_handler = call.saved_handler;
                self.call_chain = call.call.prev;
            }
            Frame::Proc(call) => self.call_chain = call.prev,
            Frame::Gosub { prev, .. } => self.gosub_chain = prev,
            Frame::Int(_)
            | Frame::Int64(_)
            | Frame::Float(_)
            | Frame::Array(_)
            | Frame::LocArray { .. }
            | Frame::While { .. }
            | Frame::Repeat { .. }
            | Frame::IntFor(_)
            | Frame::FloatFor(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::FrameTag;

    #[test]
    fn test_borrowed_string_is_copied_on_push() {
        let mut interp = Interpreter::in_memory().unwrap();
        let desc = interp.strings.store(b"held").unwrap();
        interp
            .push_value(Value::Str { desc, owned: false })
            .unwrap();
        assert_eq!(interp.strings.live_count(), 2);
        match interp.pop_value().unwrap() {
            Value::Str { desc: copy, owned } => {
                assert!(owned);
                assert_ne!(copy, desc);
                assert_eq!(interp.strings.bytes(copy), b"held");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unwind_frees_temporaries() {
        let mut interp = Interpreter::in_memory().unwrap();
        let top = interp.ws.stacktop;
        interp.push_value(Value::Int(1)).unwrap();
        let desc = interp.strings.store(b"temporary").unwrap();
        interp.push_value(Value::Str { desc, owned: true }).unwrap();
        interp.unwind_to(0, false).unwrap();
        assert_eq!(interp.strings.live_count(), 0);
        assert_eq!(interp.ws.stacktop, top);
    }

    #[test]
    fn test_pop_value_rejects_control_frames() {
        let mut interp = Interpreter::in_memory().unwrap();
        interp
            .stack
            .push(&mut interp.ws, Frame::Repeat { body: 0 })
            .unwrap();
        assert!(matches!(
            interp.pop_value().unwrap_err().kind,
            ErrorKind::Broken(_)
        ));
        assert_eq!(interp.stack.top().map(Frame::tag), Some(FrameTag::Repeat));
    }

    #[test]
    fn test_with_opstack_leaves_stack_as_found() {
        let mut interp = Interpreter::in_memory().unwrap();
        let value = interp
            .with_opstack(|interp| {
                assert!(interp.opstack.is_some());
                Ok(interp.stack.depth())
            })
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(interp.stack.depth(), 0);
        assert!(interp.opstack.is_none());
    }
}
