pub mod chunker;
pub mod ingest;
pub mod retriever;
pub mod sqlite;
pub mod store;

pub use ingest::{IngestReport, IngestService};
pub use retriever::Retriever;
pub use sqlite::SqliteVectorStore;
pub use store::{Chunk, RetrievalResult, ScoredChunk, VectorStore};
