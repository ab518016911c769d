//! String heap
//!
//! Strings live in their own arena, addressed by `StringDesc` values
//! (offset and length). Short strings come from per-size-class free lists
//! of fixed slots; longer strings come from a best-fit free list whose
//! blocks are split on allocation and coalesced on release.

use crate::error::{ErrorKind, Result};
use log::{trace, warn};
use std::collections::HashMap;

/// Slot sizes used for short strings
pub const SIZE_CLASSES: [usize; 6] = [8, 16, 32, 64, 128, 256];
/// Strings longer than this go to the best-fit list
pub const SHORT_LIMIT: usize = 256;
/// Large blocks are rounded to this granularity
const GRANULE: usize = 8;
/// Offset of the first real block; offset 0 is the empty string
const FIRST_BLOCK: usize = GRANULE;

/// Handle to a string: offset into the heap and length in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StringDesc {
    pub addr: u32,
    pub len: u32,
}

/// Bytes a descriptor occupies when stored in the workspace
pub const DESC_SIZE: usize = 8;

impl StringDesc {
    /// The empty string owns no storage
    pub const EMPTY: StringDesc = StringDesc { addr: 0, len: 0 };

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn to_bytes(self) -> [u8; DESC_SIZE] {
        let mut out = [0u8; DESC_SIZE];
        out[..4].copy_from_slice(&self.addr.to_le_bytes());
        out[4..].copy_from_slice(&self.len.to_le_bytes());
        out
    }

    pub fn from_bytes(raw: &[u8]) -> Self {
        let mut addr = [0u8; 4];
        let mut len = [0u8; 4];
        addr.copy_from_slice(&raw[..4]);
        len.copy_from_slice(&raw[4..DESC_SIZE]);
        Self {
            addr: u32::from_le_bytes(addr),
            len: u32::from_le_bytes(len),
        }
    }
}

/// Allocation statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    /// Bytes held by live strings (slot or block capacity)
    pub allocated: usize,
    /// Bytes sitting on free lists
    pub free: usize,
    /// Number of separate large free blocks
    pub fragments: usize,
    /// Highest offset ever handed out
    pub high_water: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeBlock {
    addr: usize,
    size: usize,
}

/// The string arena and its free lists
#[derive(Debug, Clone)]
pub struct StringHeap {
    mem: Vec<u8>,
    limit: usize,
    bump: usize,
    slabs: [Vec<usize>; SIZE_CLASSES.len()],
    large: Vec<FreeBlock>,
    live: HashMap<usize, usize>,
}

fn size_class(len: usize) -> Option<usize> {
    SIZE_CLASSES.iter().position(|&size| size >= len)
}

impl StringHeap {
    pub fn new(limit: usize) -> Self {
        Self {
            mem: vec![0; FIRST_BLOCK],
            limit,
            bump: FIRST_BLOCK,
            slabs: Default::default(),
            large: Vec::new(),
            live: HashMap::new(),
        }
    }

    /// Allocate storage for `len` bytes; the contents are unspecified
    pub fn alloc(&mut self, len: usize) -> Result<StringDesc> {
        if len == 0 {
            return Ok(StringDesc::EMPTY);
        }
        if len > u32::MAX as usize {
            return Err(ErrorKind::StringLen.into());
        }
        let (addr, capacity) = match size_class(len) {
            Some(class) => {
                let size = SIZE_CLASSES[class];
                match self.slabs[class].pop() {
                    Some(addr) => (addr, size),
                    None => (self.bump_alloc(size)?, size),
                }
            }
            None => {
                let size = (len + GRANULE - 1) / GRANULE * GRANULE;
                match self.take_best_fit(size) {
                    Some(addr) => (addr, size),
                    None => (self.bump_alloc(size)?, size),
                }
            }
        };
        self.live.insert(addr, capacity);
        trace!("string alloc {} bytes at {:#x}", len, addr);
        Ok(StringDesc {
            addr: addr as u32,
            len: len as u32,
        })
    }

    fn bump_alloc(&mut self, size: usize) -> Result<usize> {
        let addr = self.bump;
        let end = addr + size;
        if end > self.limit {
            return Err(ErrorKind::NoRoom.into());
        }
        if end > self.mem.len() {
            self.mem.resize(end, 0);
        }
        self.bump = end;
        Ok(addr)
    }

    fn take_best_fit(&mut self, size: usize) -> Option<usize> {
        let index = self
            .large
            .iter()
            .enumerate()
            .filter(|(_, block)| block.size >= size)
            .min_by_key(|(_, block)| block.size)
            .map(|(index, _)| index)?;
        let block = self.large[index];
        if block.size - size >= GRANULE {
            self.large[index] = FreeBlock {
                addr: block.addr + size,
                size: block.size - size,
            };
        } else {
            self.large.remove(index);
        }
        Some(block.addr)
    }

    /// Release a string; freeing the empty string is a no-op
    pub fn free(&mut self, desc: StringDesc) {
        if desc.addr == 0 {
            return;
        }
        let addr = desc.addr as usize;
        let capacity = match self.live.remove(&addr) {
            Some(capacity) => capacity,
            None => {
                warn!("free of unknown string at {:#x}", addr);
                return;
            }
        };
        trace!("string free {} bytes at {:#x}", capacity, addr);
        match SIZE_CLASSES.iter().position(|&size| size == capacity) {
            Some(class) => self.slabs[class].push(addr),
            None => self.release_block(addr, capacity),
        }
    }

    fn release_block(&mut self, addr: usize, size: usize) {
        let pos = self.large.partition_point(|block| block.addr < addr);
        self.large.insert(pos, FreeBlock { addr, size });

        // Merge with the following block, then with the preceding one
        if pos + 1 < self.large.len() {
            let next = self.large[pos + 1];
            if addr + size == next.addr {
                self.large[pos].size += next.size;
                self.large.remove(pos + 1);
            }
        }
        let mut pos = pos;
        if pos > 0 {
            let prev = self.large[pos - 1];
            if prev.addr + prev.size == self.large[pos].addr {
                self.large[pos - 1].size += self.large[pos].size;
                self.large.remove(pos);
                pos -= 1;
            }
        }

        // A block touching the wilderness is returned to it
        let block = self.large[pos];
        if block.addr + block.size == self.bump {
            self.bump = block.addr;
            self.large.remove(pos);
        }
    }

    /// Change the length of a string, keeping its contents up to the new length
    pub fn resize(&mut self, desc: StringDesc, new_len: usize) -> Result<StringDesc> {
        if desc.addr == 0 {
            return self.alloc(new_len);
        }
        if new_len == 0 {
            self.free(desc);
            return Ok(StringDesc::EMPTY);
        }
        let capacity = self.live.get(&(desc.addr as usize)).copied().unwrap_or(0);
        let same_class = match (size_class(new_len), size_class(desc.len as usize)) {
            (Some(new), Some(old)) => new == old,
            (None, None) => new_len <= capacity,
            _ => false,
        };
        if same_class && new_len <= capacity {
            return Ok(StringDesc {
                addr: desc.addr,
                len: new_len as u32,
            });
        }
        let fresh = self.alloc(new_len)?;
        let keep = new_len.min(desc.len as usize);
        let (src, dst) = (desc.addr as usize, fresh.addr as usize);
        self.mem.copy_within(src..src + keep, dst);
        self.free(desc);
        Ok(fresh)
    }

    /// Allocate a copy of `text`
    pub fn store(&mut self, text: &[u8]) -> Result<StringDesc> {
        let desc = self.alloc(text.len())?;
        self.bytes_mut(desc).copy_from_slice(text);
        Ok(desc)
    }

    pub fn bytes(&self, desc: StringDesc) -> &[u8] {
        let start = desc.addr as usize;
        self.mem
            .get(start..start + desc.len as usize)
            .unwrap_or(&[])
    }

    pub fn bytes_mut(&mut self, desc: StringDesc) -> &mut [u8] {
        let start = desc.addr as usize;
        self.mem
            .get_mut(start..start + desc.len as usize)
            .unwrap_or(&mut [])
    }

    /// Free every descriptor stored in a block of workspace bytes
    pub fn discard_descriptors(&mut self, region: &[u8]) {
        for raw in region.chunks_exact(DESC_SIZE) {
            self.free(StringDesc::from_bytes(raw));
        }
    }

    /// Forget every string
    pub fn clear(&mut self) {
        self.mem.truncate(FIRST_BLOCK);
        self.bump = FIRST_BLOCK;
        for slab in self.slabs.iter_mut() {
            slab.clear();
        }
        self.large.clear();
        self.live.clear();
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn stats(&self) -> HeapStats {
        let slab_free: usize = self
            .slabs
            .iter()
            .zip(SIZE_CLASSES.iter())
            .map(|(slab, size)| slab.len() * size)
            .sum();
        let large_free: usize = self.large.iter().map(|block| block.size).sum();
        HeapStats {
            allocated: self.live.values().sum(),
            free: slab_free + large_free,
            fragments: self.large.len(),
            high_water: self.mem.len(),
        }
    }
}

impl Default for StringHeap {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}
