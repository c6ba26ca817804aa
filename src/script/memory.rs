//! Scratch memory arena for script decoders.
//!
//! Scripts allocate byte buffers through integer handles instead of raw
//! pointers. Every access is bounds checked and failures are soft: reads
//! return empty, writes report how many bytes landed.

use std::collections::HashMap;

/// Handle-addressed byte buffers owned by the host.
#[derive(Debug, Default)]
pub struct MemoryArena {
    buffers: HashMap<i64, Vec<u8>>,
    next_handle: i64,
}

impl MemoryArena {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Allocate a zeroed buffer and return its handle, or 0 on failure.
    pub fn alloc(&mut self, size: i64) -> i64 {
        if size <= 0 {
            return 0;
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.buffers.insert(handle, vec![0u8; size as usize]);
        handle
    }

    /// Free a buffer. Unknown handles are ignored.
    pub fn free(&mut self, handle: i64) -> bool {
        self.buffers.remove(&handle).is_some()
    }

    /// Size of the buffer behind `handle`, or 0 if unknown.
    pub fn size(&self, handle: i64) -> i64 {
        self.buffers.get(&handle).map_or(0, |b| b.len() as i64)
    }

    /// Read up to `count` bytes starting at `offset`, clamped to the buffer.
    pub fn read(&self, handle: i64, offset: i64, count: i64) -> Vec<u8> {
        let Some(buf) = self.buffers.get(&handle) else {
            return Vec::new();
        };
        if offset < 0 || count <= 0 || offset as usize >= buf.len() {
            return Vec::new();
        }
        let start = offset as usize;
        let end = buf.len().min(start + count as usize);
        buf[start..end].to_vec()
    }

    /// Write `data` at `offset`, clamped to the buffer. Returns bytes written.
    pub fn write(&mut self, handle: i64, offset: i64, data: &[u8]) -> i64 {
        let Some(buf) = self.buffers.get_mut(&handle) else {
            return 0;
        };
        if offset < 0 || offset as usize >= buf.len() {
            return 0;
        }
        let start = offset as usize;
        let n = data.len().min(buf.len() - start);
        buf[start..start + n].copy_from_slice(&data[..n]);
        n as i64
    }

    /// Drop every buffer, keeping handle numbering monotonic.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_free_roundtrip() {
        let mut arena = MemoryArena::new();
        let h = arena.alloc(16);
        assert!(h > 0);
        assert_eq!(arena.size(h), 16);
        assert!(arena.free(h));
        assert_eq!(arena.size(h), 0);
        assert!(!arena.free(h));
    }

    #[test]
    fn test_alloc_rejects_nonpositive() {
        let mut arena = MemoryArena::new();
        assert_eq!(arena.alloc(0), 0);
        assert_eq!(arena.alloc(-4), 0);
        assert_eq!(arena.buffer_count(), 0);
    }

    #[test]
    fn test_handles_not_reused_after_free() {
        let mut arena = MemoryArena::new();
        let a = arena.alloc(4);
        arena.free(a);
        let b = arena.alloc(4);
        assert_ne!(a, b);
    }

    #[test]
    fn test_read_write_clamped() {
        let mut arena = MemoryArena::new();
        let h = arena.alloc(8);
        assert_eq!(arena.write(h, 6, &[1, 2, 3, 4]), 2);
        assert_eq!(arena.read(h, 6, 100), vec![1, 2]);
        assert_eq!(arena.read(h, 8, 1), Vec::<u8>::new());
        assert_eq!(arena.read(h, -1, 1), Vec::<u8>::new());
        assert_eq!(arena.write(h, 8, &[9]), 0);
    }

    #[test]
    fn test_unknown_handle_is_soft() {
        let mut arena = MemoryArena::new();
        assert_eq!(arena.read(42, 0, 4), Vec::<u8>::new());
        assert_eq!(arena.write(42, 0, &[1]), 0);
        assert_eq!(arena.size(42), 0);
    }
}
