//! Retrieval primitives: chunking, embeddings, and the per-run vector index.

pub mod chunker;
pub mod embedder;
pub mod similarity;
pub mod store;

pub use chunker::chunk_text;
pub use embedder::{EmbeddingClient, EmbeddingTask, GeminiEmbeddings};
pub use store::{Chunk, ScoredChunk, VectorStore};
