// LanceDB vector database module
// Handles vector storage and nearest-neighbour search over tool chunks


pub mod vector_store;

use std::cmp::Ordering;

use crate::embeddings::Chunk;

/// A chunk as stored in the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEntry {
    pub chunk: Chunk,
    /// The embedding of `chunk.text`
    pub vector: Vec<f32>,
    /// Insertion position, used to break distance ties
    pub position: u32,
}

impl IndexedEntry {
    #[inline]
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// A search hit returned by [`vector_store::VectorIndex::query`]
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// Squared Euclidean distance to the query embedding
    pub distance: f32,
    pub position: u32,
}

impl RetrievedChunk {
    /// Nearest first, then earliest inserted
    #[inline]
    pub fn nearest_first(a: &Self, b: &Self) -> Ordering {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.position.cmp(&b.position))
    }
}
