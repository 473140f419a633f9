//! Consumer-side copy of the record arrays
//!
//! A [`Mirror`] reproduces one record array from the events the store
//! publishes. It never looks at the store itself: `BufferReplaced` gives a
//! new baseline, range and slot updates patch it from the handle carried by
//! the event.

use bytemuck::Pod;

use crate::events::GraphEvent;
use crate::record::BufferKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MirrorError {
    #[error("{kind:?} update for slots {start}..{end} beyond mirrored capacity {capacity}")]
    OutOfBounds {
        kind: BufferKind,
        start: usize,
        end: usize,
        capacity: usize,
    },

    #[error("{kind:?} update carries {actual}-byte records, mirror holds {expected}-byte records")]
    RecordSize {
        kind: BufferKind,
        expected: usize,
        actual: usize,
    },
}

impl From<MirrorError> for crate::GraphError {
    fn from(e: MirrorError) -> Self {
        crate::GraphError::Other(e.to_string())
    }
}

/// Byte copy of one record array
#[derive(Debug, Clone)]
pub struct Mirror {
    kind: BufferKind,
    record_size: usize,
    bytes: Vec<u8>,
}

impl Mirror {
    #[must_use]
    pub fn new(kind: BufferKind, record_size: usize) -> Self {
        Self {
            kind,
            record_size,
            bytes: Vec::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.len() / self.record_size
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes of the slots `start..end`
    ///
    /// # Panics
    ///
    /// Panics if the range is beyond the mirrored capacity.
    #[must_use]
    pub fn slot_bytes(&self, start: usize, end: usize) -> &[u8] {
        &self.bytes[start * self.record_size..end * self.record_size]
    }

    /// Decode the record at `slot`
    ///
    /// Returns `None` if `slot` is beyond the mirrored capacity.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the mirrored record size.
    #[must_use]
    pub fn record<T: Pod>(&self, slot: usize) -> Option<T> {
        if slot >= self.capacity() {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(self.slot_bytes(slot, slot + 1)))
    }

    /// Apply one event
    ///
    /// Events for the other record kind and status events are ignored.
    /// Returns whether the event changed the mirror.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::OutOfBounds`] for an update addressed beyond the
    /// mirrored capacity, which means a `BufferReplaced` was missed.
    pub fn apply(&mut self, event: &GraphEvent) -> Result<bool, MirrorError> {
        if event.kind() != Some(self.kind) {
            return Ok(false);
        }
        let (Some(buffer), Some(slots)) = (event.buffer(), event.slots()) else {
            return Ok(false);
        };
        if buffer.record_size() != self.record_size {
            return Err(MirrorError::RecordSize {
                kind: self.kind,
                expected: self.record_size,
                actual: buffer.record_size(),
            });
        }

        if let GraphEvent::BufferReplaced { capacity, .. } = event {
            log::debug!("mirror.apply({:?}): new baseline, capacity {capacity}", self.kind);
            self.bytes = buffer.to_vec();
            self.bytes.resize(capacity * self.record_size, 0);
            return Ok(true);
        }

        if slots.end > self.capacity() || slots.end > buffer.capacity() {
            log::warn!(
                "mirror.apply({:?}): slots {slots:?} beyond capacity {}",
                self.kind,
                self.capacity()
            );
            return Err(MirrorError::OutOfBounds {
                kind: self.kind,
                start: slots.start,
                end: slots.end,
                capacity: self.capacity(),
            });
        }

        let dst = &mut self.bytes[slots.start * self.record_size..slots.end * self.record_size];
        buffer.copy_range_into(slots.start, slots.end, dst);
        Ok(true)
    }
}

/// Node and edge mirrors plus the name of the running long task
#[derive(Debug, Clone)]
pub struct GraphMirror {
    pub nodes: Mirror,
    pub edges: Mirror,
    task: Option<String>,
    applied: usize,
}

impl Default for GraphMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphMirror {
    #[must_use]
    pub fn new() -> Self {
        use crate::record::{EdgeRecord, NodeRecord, Record};
        Self {
            nodes: Mirror::new(BufferKind::Node, NodeRecord::SIZE),
            edges: Mirror::new(BufferKind::Edge, EdgeRecord::SIZE),
            task: None,
            applied: 0,
        }
    }

    /// # Errors
    ///
    /// Propagates [`Mirror::apply`] errors.
    pub fn apply(&mut self, event: &GraphEvent) -> Result<(), MirrorError> {
        match event {
            GraphEvent::TaskStatusChanged { name } => {
                self.task.clone_from(name);
            }
            _ => {
                self.nodes.apply(event)?;
                self.edges.apply(event)?;
            }
        }
        self.applied += 1;
        Ok(())
    }

    /// Long task the producer reported as running
    #[must_use]
    pub fn running_task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    /// Events applied so far
    #[must_use]
    pub fn applied(&self) -> usize {
        self.applied
    }
}
