pub mod dsl;
pub mod engine;

pub use dsl::{DocumentFilters, DocumentQuery, QueryValidationError};
pub use engine::{Neighbor, QueryError, RelatedDocument, SearchEngine, SearchHit, SearchResponse};
