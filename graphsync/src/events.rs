//! Boundary events delivered to renderers and remote clients
//!
//! The byte-level codec that ships these across a process boundary lives
//! outside this crate; here the events carry a [`SharedBuffer`] handle the
//! consumer reads the changed records from.

use crate::io::SharedBuffer;
use crate::record::BufferKind;

#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// The whole backing array was reallocated. Consumers resize their
    /// mirror to `capacity` and treat the buffer as a new baseline.
    BufferReplaced {
        kind: BufferKind,
        capacity: usize,
        buffer: SharedBuffer,
    },
    /// Slots `start..end` changed
    RangeUpdate {
        kind: BufferKind,
        start: usize,
        end: usize,
        buffer: SharedBuffer,
    },
    /// Exactly one slot changed
    SlotUpdate {
        kind: BufferKind,
        slot: usize,
        buffer: SharedBuffer,
    },
    /// `Some(name)` when a long task starts, `None` when it ends
    TaskStatusChanged { name: Option<String> },
}

impl GraphEvent {
    /// Record array the event refers to, `None` for status events
    #[must_use]
    pub fn kind(&self) -> Option<BufferKind> {
        match self {
            GraphEvent::BufferReplaced { kind, .. }
            | GraphEvent::RangeUpdate { kind, .. }
            | GraphEvent::SlotUpdate { kind, .. } => Some(*kind),
            GraphEvent::TaskStatusChanged { .. } => None,
        }
    }

    #[must_use]
    pub fn buffer(&self) -> Option<&SharedBuffer> {
        match self {
            GraphEvent::BufferReplaced { buffer, .. }
            | GraphEvent::RangeUpdate { buffer, .. }
            | GraphEvent::SlotUpdate { buffer, .. } => Some(buffer),
            GraphEvent::TaskStatusChanged { .. } => None,
        }
    }

    /// Slot range the consumer has to re-read, `None` for status events
    #[must_use]
    pub fn slots(&self) -> Option<std::ops::Range<usize>> {
        match self {
            GraphEvent::BufferReplaced { capacity, .. } => Some(0..*capacity),
            GraphEvent::RangeUpdate { start, end, .. } => Some(*start..*end),
            GraphEvent::SlotUpdate { slot, .. } => Some(*slot..*slot + 1),
            GraphEvent::TaskStatusChanged { .. } => None,
        }
    }
}
