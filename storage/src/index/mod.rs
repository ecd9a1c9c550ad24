pub mod graph;

pub use graph::EdgeIndex;
