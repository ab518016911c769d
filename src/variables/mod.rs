//! Variable storage system
//!
//! Named variables live in an arena of records reached through a 64-bucket
//! hash table. `@%` and `A%`..`Z%` live in a fixed static table and never
//! appear in the hash table. Creating a record charges its size to the
//! variable heap in the workspace, and array elements are stored in
//! workspace bytes so that indirection can reach them.

use crate::error::{ErrorKind, Result};
use crate::format::DEFAULT_FORMAT;
use crate::memory::Workspace;
use crate::strings::DESC_SIZE;
use log::trace;
use std::rc::Rc;

/// Number of hash chains
pub const HASH_BUCKETS: usize = 64;
/// `@%` plus `A%`..`Z%`
pub const STATIC_COUNT: usize = 27;
/// Static slot holding the print format `@%`
pub const FORMAT_SLOT: usize = 0;
/// Bytes charged to the heap for a record, on top of its name
const RECORD_OVERHEAD: usize = 24;

/// Scalar types a variable, array element or indirection can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    /// Unsigned byte (`name&`, `?addr`)
    Byte,
    /// 32-bit signed integer (`name%`, `!addr`)
    Integer,
    /// 64-bit signed integer (`name%%`, `|addr`)
    Integer64,
    /// IEEE 754 double precision real (`name`, `|.addr`)
    Real,
    /// String (`name$`)
    String,
}

impl VarType {
    /// Infer the type from a variable name's suffix
    pub fn from_name(name: &[u8]) -> VarType {
        let base = name.strip_suffix(b"(").unwrap_or(name);
        if base.ends_with(b"%%") {
            VarType::Integer64
        } else if base.ends_with(b"%") {
            VarType::Integer
        } else if base.ends_with(b"&") {
            VarType::Byte
        } else if base.ends_with(b"$") {
            VarType::String
        } else {
            VarType::Real
        }
    }

    /// Bytes one element occupies in workspace storage
    pub fn element_size(self) -> usize {
        match self {
            VarType::Byte => 1,
            VarType::Integer => 4,
            VarType::Integer64 | VarType::Real => 8,
            VarType::String => DESC_SIZE,
        }
    }

    pub fn is_numeric(self) -> bool {
        self != VarType::String
    }
}

/// A numeric value in one of the evaluator's three widths
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i32),
    Int64(i64),
    Float(f64),
}

/// Truncate toward zero, failing when the result does not fit 32 bits
pub fn float_to_i32(value: f64) -> Result<i32> {
    let t = value.trunc();
    if t.is_nan() || t < i32::MIN as f64 || t > i32::MAX as f64 {
        return Err(ErrorKind::NumRange.into());
    }
    Ok(t as i32)
}

/// Truncate toward zero, failing when the result does not fit 64 bits
pub fn float_to_i64(value: f64) -> Result<i64> {
    let t = value.trunc();
    if t.is_nan() || t < -9.223_372_036_854_775_808e18 || t >= 9.223_372_036_854_775_808e18 {
        return Err(ErrorKind::NumRange.into());
    }
    Ok(t as i64)
}

impl Number {
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Int64(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    pub fn to_i32(self) -> Result<i32> {
        match self {
            Number::Int(v) => Ok(v),
            Number::Int64(v) => i32::try_from(v).map_err(|_| ErrorKind::NumRange.into()),
            Number::Float(v) => float_to_i32(v),
        }
    }

    pub fn to_i64(self) -> Result<i64> {
        match self {
            Number::Int(v) => Ok(v as i64),
            Number::Int64(v) => Ok(v),
            Number::Float(v) => float_to_i64(v),
        }
    }

    /// Narrow a 64-bit result back to 32 bits when it fits
    pub fn from_i64(value: i64) -> Number {
        match i32::try_from(value) {
            Ok(v) => Number::Int(v),
            Err(_) => Number::Int64(value),
        }
    }

    pub fn is_true(self) -> bool {
        match self {
            Number::Float(v) => v != 0.0,
            Number::Int(v) => v != 0,
            Number::Int64(v) => v != 0,
        }
    }
}

/// Shape and storage of a dimensioned array
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDesc {
    pub element: VarType,
    /// Element count of each dimension (upper bound plus one)
    pub dims: Vec<u32>,
    pub total: u32,
    /// Workspace offset of element zero
    pub base: usize,
}

impl ArrayDesc {
    /// Work out the shape for `DIM name(bounds...)`, returning the descriptor
    /// without storage and the number of bytes the elements need
    pub fn layout(element: VarType, bounds: &[i64]) -> Result<(ArrayDesc, usize)> {
        if bounds.is_empty() {
            return Err(ErrorKind::ArrayDim.into());
        }
        let mut dims = Vec::with_capacity(bounds.len());
        let mut total: u64 = 1;
        for &bound in bounds {
            if bound < 0 || bound >= u32::MAX as i64 {
                return Err(ErrorKind::ArrayDim.into());
            }
            let count = bound as u64 + 1;
            total = total.checked_mul(count).ok_or(ErrorKind::NoRoom)?;
            if total > u32::MAX as u64 {
                return Err(ErrorKind::NoRoom.into());
            }
            dims.push(count as u32);
        }
        let bytes = (total as usize)
            .checked_mul(element.element_size())
            .ok_or(ErrorKind::NoRoom)?;
        let desc = ArrayDesc {
            element,
            dims,
            total: total as u32,
            base: 0,
        };
        Ok((desc, bytes))
    }

    /// Row-major offset of the element at `indices`
    pub fn element_offset(&self, indices: &[i64]) -> Result<usize> {
        if indices.len() != self.dims.len() {
            return Err(ErrorKind::ArrayDim.into());
        }
        let mut index: usize = 0;
        for (&i, &count) in indices.iter().zip(self.dims.iter()) {
            if i < 0 || i >= count as i64 {
                return Err(ErrorKind::Subscript.into());
            }
            index = index * count as usize + i as usize;
        }
        Ok(self.base + index * self.element.element_size())
    }
}

/// What a formal parameter binds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Scalar(VarType),
    Array(VarType),
}

/// One formal parameter of a `DEF PROC`/`DEF FN`
#[derive(Debug, Clone, PartialEq)]
pub struct FormalParam {
    /// Variable name including suffix, with `(` for array parameters
    pub name: Vec<u8>,
    pub kind: ParamKind,
    pub is_return: bool,
}

/// A scanned procedure or function definition
#[derive(Debug, Clone, PartialEq)]
pub struct ProcDef {
    /// Address of the first statement of the body
    pub entry: usize,
    pub params: Vec<FormalParam>,
    /// A single by-value 32-bit integer parameter
    pub simple: bool,
    pub is_fn: bool,
}

impl ProcDef {
    pub fn new(entry: usize, params: Vec<FormalParam>, is_fn: bool) -> Self {
        let simple = params.len() == 1
            && !params[0].is_return
            && params[0].kind == ParamKind::Scalar(VarType::Integer);
        Self {
            entry,
            params,
            simple,
            is_fn,
        }
    }
}

/// The value slot of a variable record
#[derive(Debug, Clone, PartialEq)]
pub enum VarCell {
    Byte(u8),
    Integer(i32),
    Integer64(i64),
    Real(f64),
    String(crate::strings::StringDesc),
    /// `None` until the array is dimensioned
    Array {
        element: VarType,
        desc: Option<ArrayDesc>,
    },
    Definition(Rc<ProcDef>),
}

impl VarCell {
    /// The value a freshly created variable of this name holds
    pub fn initial(name: &[u8]) -> VarCell {
        let var_type = VarType::from_name(name);
        if name.ends_with(b"(") {
            return VarCell::Array {
                element: var_type,
                desc: None,
            };
        }
        match var_type {
            VarType::Byte => VarCell::Byte(0),
            VarType::Integer => VarCell::Integer(0),
            VarType::Integer64 => VarCell::Integer64(0),
            VarType::Real => VarCell::Real(0.0),
            VarType::String => VarCell::String(crate::strings::StringDesc::EMPTY),
        }
    }
}

/// Index of a record in the arena
pub type VarId = usize;

/// One named variable
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: Vec<u8>,
    pub hash: u32,
    pub cell: VarCell,
    /// Set by `LOCAL name()` so that the next `DIM` allocates on the stack
    pub local_array: bool,
}

impl Variable {
    pub fn is_definition(&self) -> bool {
        matches!(self.cell, VarCell::Definition(_))
    }
}

fn hash_name(name: &[u8]) -> u32 {
    name.iter()
        .fold(0x811c_9dc5u32, |h, &b| (h ^ b as u32).wrapping_mul(0x0100_0193))
}

/// Map `@%` and `A%`..`Z%` to their static slot
pub fn static_slot(name: &[u8]) -> Option<usize> {
    match name {
        b"@%" => Some(FORMAT_SLOT),
        [letter @ b'A'..=b'Z', b'%'] => Some((letter - b'A') as usize + 1),
        _ => None,
    }
}

/// Variable storage system
#[derive(Debug, Clone)]
pub struct VariableStore {
    records: Vec<Variable>,
    buckets: Vec<Vec<VarId>>,
    statics: [i32; STATIC_COUNT],
}

impl VariableStore {
    /// Create a new variable store; `@%` starts at `&90A`
    pub fn new() -> Self {
        let mut statics = [0; STATIC_COUNT];
        statics[FORMAT_SLOT] = DEFAULT_FORMAT;
        Self {
            records: Vec::new(),
            buckets: vec![Vec::new(); HASH_BUCKETS],
            statics,
        }
    }

    /// Find a record by its full name
    pub fn lookup(&self, name: &[u8]) -> Option<VarId> {
        let hash = hash_name(name);
        self.buckets[hash as usize % HASH_BUCKETS]
            .iter()
            .copied()
            .find(|&id| self.records[id].hash == hash && self.records[id].name == name)
    }

    /// Add a record, charging it to the variable heap
    pub fn create(&mut self, ws: &mut Workspace, name: &[u8], cell: VarCell) -> Result<VarId> {
        ws.alloc_heap(RECORD_OVERHEAD + name.len())?;
        let hash = hash_name(name);
        let id = self.records.len();
        self.records.push(Variable {
            name: name.to_vec(),
            hash,
            cell,
            local_array: false,
        });
        self.buckets[hash as usize % HASH_BUCKETS].push(id);
        trace!("created variable {}", String::from_utf8_lossy(name));
        Ok(id)
    }

    /// Find a record or create it with the initial value for its name
    pub fn find_or_create(&mut self, ws: &mut Workspace, name: &[u8]) -> Result<VarId> {
        match self.lookup(name) {
            Some(id) => Ok(id),
            None => self.create(ws, name, VarCell::initial(name)),
        }
    }

    pub fn get(&self, id: VarId) -> &Variable {
        &self.records[id]
    }

    pub fn get_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.records[id]
    }

    pub fn get_static(&self, slot: usize) -> i32 {
        self.statics[slot]
    }

    pub fn set_static(&mut self, slot: usize, value: i32) {
        self.statics[slot] = value;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.records.iter()
    }

    /// Drop every record; the static table survives
    pub fn clear_varlists(&mut self) {
        self.records.clear();
        for bucket in self.buckets.iter_mut() {
            bucket.clear();
        }
    }

    /// Drop the scanned PROC/FN definitions, which hold program addresses.
    /// Record ids change, so nothing may hold a `VarId` across this call.
    pub fn clear_definitions(&mut self) {
        self.records.retain(|var| !var.is_definition());
        for bucket in self.buckets.iter_mut() {
            bucket.clear();
        }
        for (id, var) in self.records.iter().enumerate() {
            self.buckets[var.hash as usize % HASH_BUCKETS].push(id);
        }
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}
