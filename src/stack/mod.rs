//! Value and control stack
//!
//! A single stack of tagged frames holds both intermediate values and the
//! continuations of loops, calls and handlers. Frames are kept as a vector
//! of variants while their byte sizes are charged against the stack area
//! of the workspace, so `stacktop` moves exactly as a byte stack would and
//! collides with `stacklimit` the same way. Local arrays claim their
//! element storage from the same area, directly below their frame.
//!
//! Frames carry no behaviour of their own; the interpreter decides what
//! popping each one means.

pub mod opstack;

pub use opstack::{OpStack, Operator, OPSTACK_SIZE};

use crate::error::{ErrorKind, Result};
use crate::lvalue::{Lvalue, Stored};
use crate::memory::Workspace;
use crate::program::DataCursor;
use crate::strings::StringDesc;
use crate::variables::ArrayDesc;
use log::trace;

/// Bytes charged for a scalar or descriptor value frame
pub const VALUE_FRAME_SIZE: usize = 16;

/// Discriminant of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTag {
    OpStack,
    Restart,
    Int,
    Int64,
    Float,
    StrTemp,
    Array,
    LocArray,
    LocString,
    Gosub,
    Proc,
    Fn,
    Local,
    RetParm,
    While,
    Repeat,
    IntFor,
    FloatFor,
    Data,
    Error,
}

impl FrameTag {
    /// Fixed size of a frame with this tag, excluding trailing storage
    pub fn size(self) -> usize {
        match self {
            FrameTag::OpStack => 8 + 4 * OPSTACK_SIZE,
            FrameTag::Int
            | FrameTag::Int64
            | FrameTag::Float
            | FrameTag::StrTemp
            | FrameTag::Array => VALUE_FRAME_SIZE,
            FrameTag::LocArray | FrameTag::LocString => 16,
            FrameTag::Gosub | FrameTag::Repeat | FrameTag::Data => 16,
            FrameTag::While | FrameTag::Error => 24,
            FrameTag::Restart | FrameTag::Proc | FrameTag::Local => 32,
            FrameTag::Fn | FrameTag::IntFor | FrameTag::FloatFor => 40,
            FrameTag::RetParm => 48,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FrameTag::OpStack => "OPSTACK",
            FrameTag::Restart => "RESTART",
            FrameTag::Int => "INT",
            FrameTag::Int64 => "INT64",
            FrameTag::Float => "FLOAT",
            FrameTag::StrTemp => "STRTEMP",
            FrameTag::Array => "ARRAY",
            FrameTag::LocArray => "LOCARRAY",
            FrameTag::LocString => "LOCSTRING",
            FrameTag::Gosub => "GOSUB",
            FrameTag::Proc => "PROC",
            FrameTag::Fn => "FN",
            FrameTag::Local => "LOCAL",
            FrameTag::RetParm => "RETPARM",
            FrameTag::While => "WHILE",
            FrameTag::Repeat => "REPEAT",
            FrameTag::IntFor => "INTFOR",
            FrameTag::FloatFor => "FLOATFOR",
            FrameTag::Data => "DATA",
            FrameTag::Error => "ERROR",
        }
    }

    /// Frames a loop search may drop on its way to the loop frame
    pub fn is_disposable(self) -> bool {
        !matches!(
            self,
            FrameTag::While
                | FrameTag::Repeat
                | FrameTag::IntFor
                | FrameTag::FloatFor
                | FrameTag::Fn
                | FrameTag::Restart
        )
    }
}

/// An `ON ERROR LOCAL` handler: where to resume and what to reset
#[derive(Debug, Clone, PartialEq)]
pub struct LocalHandler {
    /// First token of the handler statements
    pub address: usize,
    /// Stack depth just above the handler's `Restart` frame
    pub depth: usize,
    /// DATA cursor when the handler was installed
    pub data: DataCursor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestartFrame {
    pub handler: LocalHandler,
    /// The handler this one shadows
    pub previous: Option<LocalHandler>,
}

/// Both error handlers, as saved by `LOCAL ERROR`
#[derive(Debug, Clone, PartialEq)]
pub struct SavedHandlers {
    pub global: Option<usize>,
    pub local: Option<LocalHandler>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// Where execution resumes in the caller
    pub ret: usize,
    pub name: Vec<u8>,
    pub param_count: usize,
    /// Index of the enclosing PROC/FN frame
    pub prev: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnFrame {
    pub call: CallFrame,
    /// Operator stack of the expression that made the call
    pub saved_opstack: Option<usize>,
    pub saved_handler: Option<LocalHandler>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntForFrame {
    pub var: Lvalue,
    pub body: usize,
    pub limit: i64,
    pub step: i64,
    /// Integer control variable stepping by literal 1
    pub simple: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatForFrame {
    pub var: Lvalue,
    pub body: usize,
    pub limit: f64,
    pub step: f64,
}

/// One stack frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    OpStack(OpStack),
    Restart(RestartFrame),
    Int(i32),
    Int64(i64),
    Float(f64),
    /// An owned string, freed when the frame is dropped
    StrTemp(StringDesc),
    /// A whole array passed by reference
    Array(ArrayDesc),
    /// Storage of a `LOCAL` numeric array
    LocArray { base: usize, size: usize },
    /// Storage of a `LOCAL` string array; its descriptors are freed on drop
    LocString { base: usize, size: usize },
    Gosub { ret: usize, prev: Option<usize> },
    Proc(CallFrame),
    Fn(FnFrame),
    Local { target: Lvalue, saved: Stored },
    RetParm { target: Lvalue, saved: Stored, dest: Lvalue },
    While { cond: usize, body: usize },
    Repeat { body: usize },
    IntFor(IntForFrame),
    FloatFor(FloatForFrame),
    Data(DataCursor),
    Error(SavedHandlers),
}

impl Frame {
    pub fn tag(&self) -> FrameTag {
        match self {
            Frame::OpStack(_) => FrameTag::OpStack,
            Frame::Restart(_) => FrameTag::Restart,
            Frame::Int(_) => FrameTag::Int,
            Frame::Int64(_) => FrameTag::Int64,
            Frame::Float(_) => FrameTag::Float,
            Frame::StrTemp(_) => FrameTag::StrTemp,
            Frame::Array(_) => FrameTag::Array,
            Frame::LocArray { .. } => FrameTag::LocArray,
            Frame::LocString { .. } => FrameTag::LocString,
            Frame::Gosub { .. } => FrameTag::Gosub,
            Frame::Proc(_) => FrameTag::Proc,
            Frame::Fn(_) => FrameTag::Fn,
            Frame::Local { .. } => FrameTag::Local,
            Frame::RetParm { .. } => FrameTag::RetParm,
            Frame::While { .. } => FrameTag::While,
            Frame::Repeat { .. } => FrameTag::Repeat,
            Frame::IntFor(_) => FrameTag::IntFor,
            Frame::FloatFor(_) => FrameTag::FloatFor,
            Frame::Data(_) => FrameTag::Data,
            Frame::Error(_) => FrameTag::Error,
        }
    }

    /// Bytes the frame occupies, trailing storage included
    pub fn size(&self) -> usize {
        match self {
            Frame::LocArray { size, .. } | Frame::LocString { size, .. } => {
                self.tag().size() + size
            }
            _ => self.tag().size(),
        }
    }
}

/// The value/control stack
#[derive(Debug, Clone, Default)]
pub struct ValueStack {
    frames: Vec<Frame>,
}

impl ValueStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Push a frame, claiming its bytes below `stacktop`
    pub fn push(&mut self, ws: &mut Workspace, frame: Frame) -> Result<()> {
        ws.claim_stack(frame.size())?;
        trace!("push {} at depth {}", frame.tag().name(), self.frames.len());
        self.frames.push(frame);
        Ok(())
    }

    /// Pop the top frame and give its bytes back
    pub fn pop(&mut self, ws: &mut Workspace) -> Option<Frame> {
        let frame = self.frames.pop()?;
        ws.release_stack(frame.size());
        trace!("pop {} to depth {}", frame.tag().name(), self.frames.len());
        Some(frame)
    }

    /// Claim zeroed storage for a local array and push its frame.
    /// Returns the workspace offset of the first element.
    pub fn push_local_array(&mut self, ws: &mut Workspace, bytes: usize, strings: bool) -> Result<usize> {
        let top = ws.claim_stack(FrameTag::LocArray.size() + bytes)?;
        ws.bytes_mut(top, bytes)?.fill(0);
        let frame = if strings {
            Frame::LocString { base: top, size: bytes }
        } else {
            Frame::LocArray { base: top, size: bytes }
        };
        trace!("push {} of {} bytes at {:#x}", frame.tag().name(), bytes, top);
        self.frames.push(frame);
        Ok(top)
    }

    pub fn push_int(&mut self, ws: &mut Workspace, value: i32) -> Result<()> {
        self.push(ws, Frame::Int(value))
    }

    pub fn push_float(&mut self, ws: &mut Workspace, value: f64) -> Result<()> {
        self.push(ws, Frame::Float(value))
    }

    pub fn push_strtemp(&mut self, ws: &mut Workspace, desc: StringDesc) -> Result<()> {
        self.push(ws, Frame::StrTemp(desc))
    }

    /// Fail unless `n` more value frames would fit
    pub fn check_stack(&self, ws: &Workspace, n: usize) -> Result<()> {
        if ws.stack_room() < n * VALUE_FRAME_SIZE {
            return Err(ErrorKind::StackFull.into());
        }
        Ok(())
    }

    /// True when nothing but a single operator stack is live, so the
    /// variable heap may move
    pub fn safe_to_relocate(&self) -> bool {
        match self.frames.as_slice() {
            [] => true,
            [only] => only.tag() == FrameTag::OpStack,
            _ => false,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.frames.get_mut(index)
    }

    /// The operator stack held in frame `index`
    pub fn opstack_mut(&mut self, index: usize) -> Result<&mut OpStack> {
        match self.frames.get_mut(index) {
            Some(Frame::OpStack(ops)) => Ok(ops),
            _ => Err(ErrorKind::Broken("operator stack frame missing").into()),
        }
    }

    /// Index of the innermost frame satisfying `pred`, searching no lower
    /// than `floor`
    pub fn find_innermost<F>(&self, floor: usize, pred: F) -> Option<usize>
    where
        F: Fn(&Frame) -> bool,
    {
        (floor..self.frames.len()).rev().find(|&i| pred(&self.frames[i]))
    }

    /// Index of the innermost loop frame with one of `tags`. Only
    /// disposable frames may lie above it; any other loop or call boundary
    /// stops the search.
    pub fn find_loop(&self, tags: &[FrameTag]) -> Result<usize> {
        for index in (0..self.frames.len()).rev() {
            let found = self.frames[index].tag();
            if tags.contains(&found) {
                return Ok(index);
            }
            if !found.is_disposable() {
                break;
            }
        }
        let keyword = tags.first().map_or("loop", |&tag| tag_keyword(tag));
        Err(ErrorKind::NoMatching(keyword).into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
}

fn tag_keyword(tag: FrameTag) -> &'static str {
    match tag {
        FrameTag::IntFor | FrameTag::FloatFor => "FOR",
        FrameTag::Repeat => "REPEAT",
        FrameTag::While => "WHILE",
        FrameTag::Gosub => "GOSUB",
        other => other.name(),
    }
}
