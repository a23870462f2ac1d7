// Database module
// LanceDB storage for the tool chunk vector index

pub mod lancedb;

pub use self::lancedb::vector_store::VectorIndex;
pub use self::lancedb::{IndexedEntry, RetrievedChunk};
