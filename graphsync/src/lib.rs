pub mod animation;
pub mod attributes;
pub mod config;
pub mod emitter;
pub mod error;
pub mod events;
pub mod graph;
pub mod io;
pub mod lock;
pub mod pool;
pub mod record;
pub mod store;

// Re-export error types for convenience
pub use error::{ErrorKind, GraphError};

// Re-export the graph aggregate
pub use graph::{EdgeStore, Graph, GraphData, NodeStore};

// Re-export record layouts and boundary events
pub use events::GraphEvent;
pub use record::{BufferKind, EdgeData, EdgeRecord, NodeData, NodeRecord, Record};

// Re-export building blocks
pub use config::{GraphConfig, StoreConfig};
pub use emitter::Emitter;
pub use io::{GraphMirror, Mirror, Outbox, SharedBuffer};
pub use lock::{LockStatus, LongGuard, TaskLock};
pub use store::RecordStore;
