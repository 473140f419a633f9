//! Reference-counted immutable snapshot of a record array
//!
//! A [`RecordStore`](crate::store::RecordStore) keeps its records in
//! fixed-size blocks, each block an `Arc<Vec<u8>>`. A [`SharedBuffer`] is an
//! `Arc` over the list of block `Arc`s taken at one moment, so:
//!
//! - cloning a handle is one atomic increment;
//! - taking a handle costs one `Arc` clone per block, never a byte copy;
//! - the store copies a block before writing to it while any handle still
//!   references it (`Arc::make_mut`), so a handle's bytes never change;
//! - when the last handle referencing a block is dropped, the block is freed
//!   (or becomes writable in place again for the store).
//!
//! Growing the store produces new blocks and a new handle. Handles taken
//! before the growth keep reading the old geometry.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use bytemuck::Pod;

struct Snapshot {
    blocks: Vec<Arc<Vec<u8>>>,
    record_size: usize,
    block_size: usize,
    capacity: usize,
}

/// Immutable, cheaply clonable view of a record array's bytes
///
/// # Example
///
/// ```
/// use graphsync::io::SharedBuffer;
///
/// let buffer = SharedBuffer::from_vec(4, vec![1, 2, 3, 4, 5, 6, 7, 8]);
/// assert_eq!(buffer.capacity(), 2);
/// assert_eq!(buffer.slot_bytes(1), &[5, 6, 7, 8]);
///
/// let other = buffer.clone();
/// assert_eq!(buffer.handle_count(), 2);
/// drop(other);
/// assert_eq!(buffer.handle_count(), 1);
/// ```
#[derive(Clone)]
pub struct SharedBuffer(Arc<Snapshot>);

impl SharedBuffer {
    /// Take ownership of a single contiguous block of records
    ///
    /// Trailing bytes that do not form a whole record are ignored.
    ///
    /// # Panics
    ///
    /// Panics if `record_size` is zero.
    #[must_use]
    pub fn from_vec(record_size: usize, bytes: Vec<u8>) -> Self {
        assert!(record_size > 0, "record size must be positive");
        let capacity = bytes.len() / record_size;
        Self::from_blocks(vec![Arc::new(bytes)], record_size, capacity.max(1), capacity)
    }

    /// Build a handle over already shared blocks
    ///
    /// Every block but the last holds exactly `block_size` records; the last
    /// one holds the remainder up to `capacity`.
    pub(crate) fn from_blocks(
        blocks: Vec<Arc<Vec<u8>>>,
        record_size: usize,
        block_size: usize,
        capacity: usize,
    ) -> Self {
        debug_assert!(
            blocks.iter().map(|b| b.len()).sum::<usize>() >= capacity * record_size,
            "blocks are smaller than the declared capacity"
        );
        Self(Arc::new(Snapshot {
            blocks,
            record_size,
            block_size,
            capacity,
        }))
    }

    /// Handle over zero records
    #[must_use]
    pub fn empty(record_size: usize) -> Self {
        Self::from_blocks(Vec::new(), record_size, 1, 0)
    }

    /// Number of record slots in the snapshot
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.0.capacity
    }

    #[must_use]
    pub fn record_size(&self) -> usize {
        self.0.record_size
    }

    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.0.capacity * self.0.record_size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.capacity == 0
    }

    /// Number of live handles to this snapshot
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Bytes of one record
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not below [`capacity`](Self::capacity).
    #[must_use]
    pub fn slot_bytes(&self, slot: usize) -> &[u8] {
        assert!(
            slot < self.0.capacity,
            "slot {slot} out of bounds (capacity {})",
            self.0.capacity
        );
        let snapshot = &*self.0;
        let offset = (slot % snapshot.block_size) * snapshot.record_size;
        &snapshot.blocks[slot / snapshot.block_size][offset..offset + snapshot.record_size]
    }

    /// Copy one record out of the snapshot
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of bounds or `T` is not the record size.
    #[must_use]
    pub fn read<T: Pod>(&self, slot: usize) -> T {
        bytemuck::pod_read_unaligned(self.slot_bytes(slot))
    }

    /// Byte slices covering the slots `start..end`, one slice per block
    ///
    /// The range is clamped to the capacity.
    pub fn chunks(&self, start: usize, end: usize) -> impl Iterator<Item = &[u8]> + '_ {
        let snapshot = &*self.0;
        let end = end.min(snapshot.capacity);
        let mut pos = start.min(end);
        std::iter::from_fn(move || {
            if pos >= end {
                return None;
            }
            let block = pos / snapshot.block_size;
            let block_end = ((block + 1) * snapshot.block_size).min(end);
            let range = snapshot.byte_range_in_block(pos, block_end);
            pos = block_end;
            Some(&snapshot.blocks[block][range])
        })
    }

    /// Copy the slots `start..end` into `dst`
    ///
    /// Returns the number of bytes copied.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is shorter than the clamped range.
    pub fn copy_range_into(&self, start: usize, end: usize, dst: &mut [u8]) -> usize {
        let mut written = 0;
        for chunk in self.chunks(start, end) {
            dst[written..written + chunk.len()].copy_from_slice(chunk);
            written += chunk.len();
        }
        written
    }

    /// All bytes of the snapshot in slot order
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len_bytes());
        for chunk in self.chunks(0, self.capacity()) {
            out.extend_from_slice(chunk);
        }
        out
    }
}

impl Snapshot {
    fn byte_range_in_block(&self, start: usize, end: usize) -> Range<usize> {
        let first = (start % self.block_size) * self.record_size;
        first..first + (end - start) * self.record_size
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("capacity", &self.0.capacity)
            .field("record_size", &self.0.record_size)
            .field("blocks", &self.0.blocks.len())
            .field("handles", &self.handle_count())
            .finish()
    }
}
