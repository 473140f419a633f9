//! Everything that crosses the boundary between the graph and its consumers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  RecordStore (producer side)        │
//! │  - per-block Arc<Vec<u8>> memory    │
//! │  - flush_changes() emits diffs      │
//! └─────────────────────────────────────┘
//!          │
//!          │ GraphEvent carrying a SharedBuffer
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  Outbox (thread boundary)           │
//! │  - sink of the graph's emitter      │
//! │  - tokio unbounded mpsc queue       │
//! └─────────────────────────────────────┘
//!          │
//!          │ recv().await
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  Mirror (consumer side)             │
//! │  - byte copy of each record array   │
//! │  - applies replace/range/slot diffs │
//! └─────────────────────────────────────┘
//! ```

pub mod buffer;
pub mod mirror;
pub mod outbox;

pub use buffer::SharedBuffer;
pub use mirror::{GraphMirror, Mirror, MirrorError};
pub use outbox::Outbox;
