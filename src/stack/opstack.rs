//! Operator stack for the shunting-yard evaluator
//!
//! Each pending binary operator waits here until an operator of equal or
//! lower precedence arrives. The stack is a fixed-size array carried
//! inside a single frame on the value stack.

use crate::error::{ErrorKind, Result};
use crate::tokenizer::{
    TOK_AND, TOK_ASR, TOK_DIV, TOK_EOR, TOK_GE, TOK_LE, TOK_LSL, TOK_LSR, TOK_MOD, TOK_NE, TOK_OR,
};

/// Operators one frame can hold
pub const OPSTACK_SIZE: usize = 32;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Or,
    Eor,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Lsl,
    Asr,
    Lsr,
    Add,
    Sub,
    Mul,
    Divide,
    IntDiv,
    Mod,
    Power,
}

impl Operator {
    /// Decode the operator starting at a token byte
    pub fn from_token(token: u8) -> Option<Operator> {
        let op = match token {
            TOK_OR => Operator::Or,
            TOK_EOR => Operator::Eor,
            TOK_AND => Operator::And,
            b'=' => Operator::Eq,
            TOK_NE => Operator::Ne,
            b'<' => Operator::Lt,
            b'>' => Operator::Gt,
            TOK_LE => Operator::Le,
            TOK_GE => Operator::Ge,
            TOK_LSL => Operator::Lsl,
            TOK_ASR => Operator::Asr,
            TOK_LSR => Operator::Lsr,
            b'+' => Operator::Add,
            b'-' => Operator::Sub,
            b'*' => Operator::Mul,
            b'/' => Operator::Divide,
            TOK_DIV => Operator::IntDiv,
            TOK_MOD => Operator::Mod,
            b'^' => Operator::Power,
            _ => return None,
        };
        Some(op)
    }

    /// Binding strength; every level is left-associative
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Or | Operator::Eor => 1,
            Operator::And => 2,
            Operator::Eq
            | Operator::Ne
            | Operator::Lt
            | Operator::Gt
            | Operator::Le
            | Operator::Ge
            | Operator::Lsl
            | Operator::Asr
            | Operator::Lsr => 3,
            Operator::Add | Operator::Sub => 4,
            Operator::Mul | Operator::Divide | Operator::IntDiv | Operator::Mod => 5,
            Operator::Power => 6,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge
        )
    }
}

/// A fixed-capacity stack of pending operators
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpStack {
    ops: Vec<Operator>,
}

impl OpStack {
    pub fn new() -> Self {
        Self {
            ops: Vec::with_capacity(OPSTACK_SIZE),
        }
    }

    pub fn push(&mut self, op: Operator) -> Result<()> {
        if self.ops.len() >= OPSTACK_SIZE {
            return Err(ErrorKind::StackFull.into());
        }
        self.ops.push(op);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Operator> {
        self.ops.pop()
    }

    pub fn top(&self) -> Option<Operator> {
        self.ops.last().copied()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_order() {
        assert!(Operator::Power.precedence() > Operator::Mul.precedence());
        assert!(Operator::Mul.precedence() > Operator::Add.precedence());
        assert!(Operator::Add.precedence() > Operator::Eq.precedence());
        assert!(Operator::Eq.precedence() > Operator::And.precedence());
        assert!(Operator::And.precedence() > Operator::Or.precedence());
        assert_eq!(Operator::Or.precedence(), Operator::Eor.precedence());
    }

    #[test]
    fn test_token_decoding() {
        assert_eq!(Operator::from_token(b'+'), Some(Operator::Add));
        assert_eq!(Operator::from_token(TOK_DIV), Some(Operator::IntDiv));
        assert_eq!(Operator::from_token(TOK_LE), Some(Operator::Le));
        assert_eq!(Operator::from_token(b':'), None);
    }

    #[test]
    fn test_capacity_is_fixed() {
        let mut ops = OpStack::new();
        for _ in 0..OPSTACK_SIZE {
            ops.push(Operator::Add).unwrap();
        }
        assert_eq!(ops.push(Operator::Add).unwrap_err().kind, ErrorKind::StackFull);
        assert_eq!(ops.pop(), Some(Operator::Add));
        assert_eq!(ops.len(), OPSTACK_SIZE - 1);
    }
}
