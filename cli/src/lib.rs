pub mod highlight;
pub mod layout;

pub use layout::{random_graph, relax_once, run_layout, LayoutParams, LayoutReport};
