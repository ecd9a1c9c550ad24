pub mod linker;
pub mod normalize;
pub mod persist;
pub mod processor;
pub mod scoring;
pub mod sources;

pub use linker::CrossReferenceBuilder;
pub use normalize::{NormalizationError, Normalizer};
pub use persist::PersistenceCoordinator;
pub use processor::{IndexerError, IndexingPipeline, RunReport};
pub use scoring::PriorityScorer;
pub use sources::{build_adapters, AdapterError, FetchBatch, SourceAdapter};
