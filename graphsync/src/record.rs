//! Fixed byte layouts of the records shipped to the renderer
//!
//! The layouts are agreed between producer and consumer out of band. They
//! are `#[repr(C)]` without padding so that a record is exactly its bytes:
//!
//! ```text
//! NodeRecord (16 bytes)   pos: 2 x f32 | radius: f32 | fill: 3 x u8 | flags: u8
//! EdgeRecord (24 bytes)   from: 2 x f32 | to: 2 x f32 | width: f32 | color: 3 x u8 | flags: u8
//! ```
//!
//! Changing either layout is a breaking protocol change.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Flag bits shared by node and edge records
pub mod flags {
    pub const HIGHLIGHTED: u8 = 1;
    pub const DELETED: u8 = 2;
}

/// Which record array an event or a store refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    Node,
    Edge,
}

/// A fixed-layout record stored in a [`RecordStore`](crate::store::RecordStore)
pub trait Record: Pod {
    const KIND: BufferKind;
    const SIZE: usize = std::mem::size_of::<Self>();

    fn flags(&self) -> u8;
    fn flags_mut(&mut self) -> &mut u8;

    fn mark_deleted(&mut self) {
        *self.flags_mut() |= flags::DELETED;
    }

    fn is_deleted(&self) -> bool {
        self.flags() & flags::DELETED != 0
    }

    fn is_highlighted(&self) -> bool {
        self.flags() & flags::HIGHLIGHTED != 0
    }

    fn set_highlighted(&mut self, on: bool) {
        if on {
            *self.flags_mut() |= flags::HIGHLIGHTED;
        } else {
            *self.flags_mut() &= !flags::HIGHLIGHTED;
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct NodeRecord {
    pub pos: [f32; 2],
    pub radius: f32,
    pub fill: [u8; 3],
    pub flags: u8,
}

impl NodeRecord {
    #[must_use]
    pub fn new(pos: [f32; 2], radius: f32, fill: [u8; 3]) -> Self {
        Self {
            pos,
            radius,
            fill,
            flags: 0,
        }
    }
}

impl Record for NodeRecord {
    const KIND: BufferKind = BufferKind::Node;

    fn flags(&self) -> u8 {
        self.flags
    }

    fn flags_mut(&mut self) -> &mut u8 {
        &mut self.flags
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct EdgeRecord {
    pub from: [f32; 2],
    pub to: [f32; 2],
    pub width: f32,
    pub color: [u8; 3],
    pub flags: u8,
}

impl EdgeRecord {
    #[must_use]
    pub fn new(from: [f32; 2], to: [f32; 2], width: f32, color: [u8; 3]) -> Self {
        Self {
            from,
            to,
            width,
            color,
            flags: 0,
        }
    }
}

impl Record for EdgeRecord {
    const KIND: BufferKind = BufferKind::Edge;

    fn flags(&self) -> u8 {
        self.flags
    }

    fn flags_mut(&mut self) -> &mut u8 {
        &mut self.flags
    }
}

/// Side data of a node slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeData {
    /// Incident edge slots
    pub adj_edges: Vec<usize>,
    /// Bumped every time the slot receives a new node
    pub generation: u64,
}

/// Side data of an edge slot: endpoint node slots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeData {
    pub from: usize,
    pub to: usize,
}
