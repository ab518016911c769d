//! Assignable locations
//!
//! An `Lvalue` names a place a value can be read from or written to: a
//! variable record, one of the static integer slots, or a workspace offset
//! reached through an array subscript or an indirection operator. `Storage`
//! bundles the three stores an access may touch and implements the
//! conversions assignment performs.

use crate::error::{ErrorKind, Result};
use crate::memory::Workspace;
use crate::strings::{StringDesc, StringHeap, DESC_SIZE};
use crate::variables::{ArrayDesc, Number, VarCell, VarId, VarType, VariableStore};

/// What kind of value an lvalue holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LvalueType {
    Scalar(VarType),
    /// `$addr`, a CR-terminated string held directly in the workspace
    CrString,
    /// A whole array, `name()`
    Array(VarType),
}

/// Where the value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Static(usize),
    Variable(VarId),
    /// Workspace offset: array elements and indirection targets
    Offset(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lvalue {
    pub ty: LvalueType,
    pub loc: Location,
}

impl Lvalue {
    pub fn variable(id: VarId, ty: LvalueType) -> Self {
        Self {
            ty,
            loc: Location::Variable(id),
        }
    }

    pub fn static_int(slot: usize) -> Self {
        Self {
            ty: LvalueType::Scalar(VarType::Integer),
            loc: Location::Static(slot),
        }
    }

    pub fn indirect(addr: usize, ty: LvalueType) -> Self {
        Self {
            ty,
            loc: Location::Offset(addr),
        }
    }

    /// Addresses workspace bytes rather than a record
    pub fn is_pointer(&self) -> bool {
        matches!(self.loc, Location::Offset(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self.ty,
            LvalueType::Scalar(VarType::String) | LvalueType::CrString
        )
    }
}

/// A value read out of (or saved from) an lvalue
#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    Byte(u8),
    Int(i32),
    Int64(i64),
    Float(f64),
    /// Descriptor of a heap string; ownership depends on where it came from
    Str(StringDesc),
    /// Copy of a `$addr` string
    CrStr(Vec<u8>),
    Array(Option<ArrayDesc>),
}

impl Stored {
    pub fn number(&self) -> Option<Number> {
        match *self {
            Stored::Byte(v) => Some(Number::Int(v as i32)),
            Stored::Int(v) => Some(Number::Int(v)),
            Stored::Int64(v) => Some(Number::Int64(v)),
            Stored::Float(v) => Some(Number::Float(v)),
            _ => None,
        }
    }
}

fn byte_of(n: Number) -> Result<u8> {
    Ok((n.to_i64()? & 0xFF) as u8)
}

/// Mutable access to everything an lvalue can reach
pub struct Storage<'a> {
    pub ws: &'a mut Workspace,
    pub vars: &'a mut VariableStore,
    pub strings: &'a mut StringHeap,
    pub max_string: usize,
}

impl<'a> Storage<'a> {
    /// Read the current value; string descriptors are borrowed, not copied
    pub fn load(&self, lv: &Lvalue) -> Result<Stored> {
        match lv.loc {
            Location::Static(slot) => Ok(Stored::Int(self.vars.get_static(slot))),
            Location::Variable(id) => match &self.vars.get(id).cell {
                VarCell::Byte(v) => Ok(Stored::Byte(*v)),
                VarCell::Integer(v) => Ok(Stored::Int(*v)),
                VarCell::Integer64(v) => Ok(Stored::Int64(*v)),
                VarCell::Real(v) => Ok(Stored::Float(*v)),
                VarCell::String(desc) => Ok(Stored::Str(*desc)),
                VarCell::Array { desc, .. } => Ok(Stored::Array(desc.clone())),
                VarCell::Definition(_) => Err(ErrorKind::TypeMismatch.into()),
            },
            Location::Offset(addr) => match lv.ty {
                LvalueType::Scalar(VarType::Byte) => Ok(Stored::Byte(self.ws.peek(addr)?)),
                LvalueType::Scalar(VarType::Integer) => Ok(Stored::Int(self.ws.read_i32(addr)?)),
                LvalueType::Scalar(VarType::Integer64) => {
                    Ok(Stored::Int64(self.ws.read_i64(addr)?))
                }
                LvalueType::Scalar(VarType::Real) => Ok(Stored::Float(self.ws.read_f64(addr)?)),
                LvalueType::Scalar(VarType::String) => Ok(Stored::Str(StringDesc::from_bytes(
                    self.ws.bytes(addr, DESC_SIZE)?,
                ))),
                LvalueType::CrString => Ok(Stored::CrStr(
                    self.ws.read_cr_string(addr, self.max_string)?,
                )),
                LvalueType::Array(_) => Err(ErrorKind::Broken("array through pointer").into()),
            },
        }
    }

    /// Assign a number, converting to the lvalue's type
    pub fn store_number(&mut self, lv: &Lvalue, n: Number) -> Result<()> {
        match lv.loc {
            Location::Static(slot) => {
                self.vars.set_static(slot, n.to_i32()?);
                Ok(())
            }
            Location::Variable(id) => {
                let cell = &mut self.vars.get_mut(id).cell;
                match cell {
                    VarCell::Byte(v) => *v = byte_of(n)?,
                    VarCell::Integer(v) => *v = n.to_i32()?,
                    VarCell::Integer64(v) => *v = n.to_i64()?,
                    VarCell::Real(v) => *v = n.to_f64(),
                    VarCell::String(_) => return Err(ErrorKind::StringWanted.into()),
                    VarCell::Array { .. } | VarCell::Definition(_) => {
                        return Err(ErrorKind::TypeMismatch.into())
                    }
                }
                Ok(())
            }
            Location::Offset(addr) => match lv.ty {
                LvalueType::Scalar(VarType::Byte) => self.ws.poke(addr, byte_of(n)?),
                LvalueType::Scalar(VarType::Integer) => self.ws.write_i32(addr, n.to_i32()?),
                LvalueType::Scalar(VarType::Integer64) => self.ws.write_i64(addr, n.to_i64()?),
                LvalueType::Scalar(VarType::Real) => self.ws.write_f64(addr, n.to_f64()),
                LvalueType::Scalar(VarType::String) | LvalueType::CrString => {
                    Err(ErrorKind::StringWanted.into())
                }
                LvalueType::Array(_) => Err(ErrorKind::TypeMismatch.into()),
            },
        }
    }

    /// Assign a string. An `owned` descriptor is taken over by the target;
    /// a borrowed one is copied unless it already is the target's value.
    pub fn store_string(&mut self, lv: &Lvalue, desc: StringDesc, owned: bool) -> Result<()> {
        let current = match (lv.loc, lv.ty) {
            (Location::Variable(id), _) => match self.vars.get(id).cell {
                VarCell::String(old) => Some(old),
                _ => None,
            },
            (Location::Offset(addr), LvalueType::Scalar(VarType::String)) => {
                Some(StringDesc::from_bytes(self.ws.bytes(addr, DESC_SIZE)?))
            }
            (Location::Offset(addr), LvalueType::CrString) => {
                let text = self.strings.bytes(desc).to_vec();
                if owned {
                    self.strings.free(desc);
                }
                return self.ws.write_cr_string(addr, &text);
            }
            _ => None,
        };
        let old = match current {
            Some(old) => old,
            None => {
                if owned {
                    self.strings.free(desc);
                }
                return Err(ErrorKind::NumberWanted.into());
            }
        };
        if !owned && old == desc {
            return Ok(());
        }
        let new = if owned {
            desc
        } else {
            let text = self.strings.bytes(desc).to_vec();
            self.strings.store(&text)?
        };
        self.strings.free(old);
        self.set_desc(lv, new)
    }

    /// `s$ += text`, growing the held string where the heap allows
    pub fn append_string(&mut self, lv: &Lvalue, text: &[u8]) -> Result<()> {
        let old = match self.load(lv)? {
            Stored::Str(desc) => desc,
            _ => return Err(ErrorKind::StringWanted.into()),
        };
        let start = old.len as usize;
        if start + text.len() > self.max_string {
            return Err(ErrorKind::StringLen.into());
        }
        let grown = self.strings.resize(old, start + text.len())?;
        self.strings.bytes_mut(grown)[start..].copy_from_slice(text);
        self.set_desc(lv, grown)
    }

    fn set_desc(&mut self, lv: &Lvalue, desc: StringDesc) -> Result<()> {
        match lv.loc {
            Location::Variable(id) => {
                self.vars.get_mut(id).cell = VarCell::String(desc);
                Ok(())
            }
            Location::Offset(addr) => self.ws.write_bytes(addr, &desc.to_bytes()),
            Location::Static(_) => Err(ErrorKind::NumberWanted.into()),
        }
    }

    /// Write a value previously produced by `load` or `take`, taking over
    /// any string it holds
    pub fn store(&mut self, lv: &Lvalue, value: Stored) -> Result<()> {
        match value {
            Stored::Str(desc) => self.store_string(lv, desc, true),
            Stored::CrStr(text) => {
                let desc = self.strings.store(&text)?;
                self.store_string(lv, desc, true)
            }
            Stored::Array(desc) => match lv.loc {
                Location::Variable(id) => match &mut self.vars.get_mut(id).cell {
                    VarCell::Array { desc: slot, .. } => {
                        *slot = desc;
                        Ok(())
                    }
                    _ => Err(ErrorKind::TypeMismatch.into()),
                },
                _ => Err(ErrorKind::TypeMismatch.into()),
            },
            other => match other.number() {
                Some(n) => self.store_number(lv, n),
                None => Err(ErrorKind::Broken("unconvertible stored value").into()),
            },
        }
    }

    /// Move the current value out, leaving zero, an empty string or an
    /// undimensioned array behind
    pub fn take(&mut self, lv: &Lvalue) -> Result<Stored> {
        match lv.loc {
            Location::Static(slot) => {
                let v = self.vars.get_static(slot);
                self.vars.set_static(slot, 0);
                Ok(Stored::Int(v))
            }
            Location::Variable(id) => {
                let var = self.vars.get_mut(id);
                let saved = match &mut var.cell {
                    VarCell::Byte(v) => Stored::Byte(std::mem::take(v)),
                    VarCell::Integer(v) => Stored::Int(std::mem::take(v)),
                    VarCell::Integer64(v) => Stored::Int64(std::mem::take(v)),
                    VarCell::Real(v) => Stored::Float(std::mem::take(v)),
                    VarCell::String(desc) => Stored::Str(std::mem::take(desc)),
                    VarCell::Array { desc, .. } => Stored::Array(desc.take()),
                    VarCell::Definition(_) => return Err(ErrorKind::TypeMismatch.into()),
                };
                Ok(saved)
            }
            Location::Offset(_) => {
                let value = self.load(lv)?;
                if let Stored::Str(_) = value {
                    self.set_desc(lv, StringDesc::EMPTY)?;
                } else if value.number().is_some() {
                    self.store_number(lv, Number::Int(0))?;
                }
                Ok(value)
            }
        }
    }

    /// Put a saved value back, releasing whatever string the lvalue holds now
    pub fn restore(&mut self, lv: &Lvalue, saved: Stored) -> Result<()> {
        if let Stored::Str(desc) = saved {
            if let Stored::Str(current) = self.load(lv)? {
                self.strings.free(current);
            }
            return self.set_desc(lv, desc);
        }
        self.store(lv, saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DEFAULT_MARGIN, DEFAULT_WORKSPACE, PREFIX_SIZE};
    use quickcheck::{QuickCheck, TestResult};

    struct Fixture {
        ws: Workspace,
        vars: VariableStore,
        strings: StringHeap,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                ws: Workspace::new(DEFAULT_WORKSPACE, DEFAULT_MARGIN).unwrap(),
                vars: VariableStore::new(),
                strings: StringHeap::default(),
            }
        }

        fn storage(&mut self) -> Storage<'_> {
            Storage {
                ws: &mut self.ws,
                vars: &mut self.vars,
                strings: &mut self.strings,
                max_string: 65535,
            }
        }

        fn var(&mut self, name: &[u8]) -> Lvalue {
            let id = self.vars.find_or_create(&mut self.ws, name).unwrap();
            Lvalue::variable(id, LvalueType::Scalar(VarType::from_name(name)))
        }
    }

    #[test]
    fn test_integer_assignment_truncates() {
        let mut fx = Fixture::new();
        let lv = fx.var(b"n%");
        let mut st = fx.storage();
        st.store_number(&lv, Number::Float(-7.9)).unwrap();
        assert_eq!(st.load(&lv).unwrap(), Stored::Int(-7));
        let err = st.store_number(&lv, Number::Float(1e12)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NumRange);
    }

    #[test]
    fn test_byte_assignment_masks() {
        let mut fx = Fixture::new();
        let lv = Lvalue::indirect(PREFIX_SIZE + 100, LvalueType::Scalar(VarType::Byte));
        let mut st = fx.storage();
        st.store_number(&lv, Number::Int(300)).unwrap();
        assert_eq!(st.load(&lv).unwrap(), Stored::Byte(44));
    }

    #[test]
    fn test_string_into_number_is_mismatch() {
        let mut fx = Fixture::new();
        let lv = fx.var(b"x");
        let mut st = fx.storage();
        let desc = st.strings.store(b"HI").unwrap();
        let err = st.store_string(&lv, desc, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NumberWanted);
        assert_eq!(st.strings.live_count(), 0);
    }

    #[test]
    fn test_borrowed_string_is_copied() {
        let mut fx = Fixture::new();
        let a = fx.var(b"a$");
        let b = fx.var(b"b$");
        let mut st = fx.storage();
        let desc = st.strings.store(b"TEXT").unwrap();
        st.store_string(&a, desc, true).unwrap();
        st.store_string(&b, desc, false).unwrap();
        let (Stored::Str(da), Stored::Str(db)) = (st.load(&a).unwrap(), st.load(&b).unwrap())
        else {
            panic!("expected strings");
        };
        assert_ne!(da.addr, db.addr);
        assert_eq!(st.strings.bytes(db), b"TEXT");
        assert_eq!(st.strings.live_count(), 2);
    }

    #[test]
    fn test_append_grows_string() {
        let mut fx = Fixture::new();
        let a = fx.var(b"a$");
        let mut st = fx.storage();
        st.append_string(&a, b"AB").unwrap();
        st.append_string(&a, b"CDE").unwrap();
        let Stored::Str(desc) = st.load(&a).unwrap() else {
            panic!("expected a string");
        };
        assert_eq!(st.strings.bytes(desc), b"ABCDE");
        assert_eq!(st.strings.live_count(), 1);
        st.max_string = 6;
        assert_eq!(st.append_string(&a, b"FG").unwrap_err().kind, ErrorKind::StringLen);
    }

    #[test]
    fn test_cr_string_indirection() {
        let mut fx = Fixture::new();
        let lv = Lvalue::indirect(PREFIX_SIZE + 64, LvalueType::CrString);
        let mut st = fx.storage();
        let desc = st.strings.store(b"ABC").unwrap();
        st.store_string(&lv, desc, true).unwrap();
        assert_eq!(st.ws.peek(PREFIX_SIZE + 67).unwrap(), b'\r');
        assert_eq!(st.load(&lv).unwrap(), Stored::CrStr(b"ABC".to_vec()));
        assert_eq!(st.strings.live_count(), 0);
    }

    #[test]
    fn test_take_and_restore() {
        let mut fx = Fixture::new();
        let lv = fx.var(b"s$");
        let mut st = fx.storage();
        let desc = st.strings.store(b"OUTER").unwrap();
        st.store_string(&lv, desc, true).unwrap();

        let saved = st.take(&lv).unwrap();
        assert_eq!(st.load(&lv).unwrap(), Stored::Str(StringDesc::EMPTY));
        let inner = st.strings.store(b"INNER").unwrap();
        st.store_string(&lv, inner, true).unwrap();

        st.restore(&lv, saved).unwrap();
        let Stored::Str(back) = st.load(&lv).unwrap() else {
            panic!("expected string");
        };
        assert_eq!(st.strings.bytes(back), b"OUTER");
        assert_eq!(st.strings.live_count(), 1);
    }

    #[test]
    fn test_static_slots() {
        let mut fx = Fixture::new();
        let lv = Lvalue::static_int(3);
        let mut st = fx.storage();
        st.store_number(&lv, Number::Int(42)).unwrap();
        assert_eq!(st.take(&lv).unwrap(), Stored::Int(42));
        assert_eq!(st.load(&lv).unwrap(), Stored::Int(0));
    }

    #[test]
    fn prop_word_indirection_is_exact() {
        fn prop(offset: u8, value: i32) -> TestResult {
            let mut fx = Fixture::new();
            let lv = Lvalue::indirect(
                PREFIX_SIZE + offset as usize,
                LvalueType::Scalar(VarType::Integer),
            );
            let mut st = fx.storage();
            st.store_number(&lv, Number::Int(value)).unwrap();
            TestResult::from_bool(st.load(&lv).unwrap() == Stored::Int(value))
        }
        QuickCheck::new()
            .tests(10)
            .quickcheck(prop as fn(u8, i32) -> TestResult);
    }
}
