//! Embedding pipeline: a socket-based client backed by a durable overflow queue. Embedding
//! generation itself is delegated to an external provider reachable over that socket; this
//! crate never runs inference in-process.

mod client;
mod math;
mod queue;

pub use client::EmbeddingClient;
pub use math::{average_and_normalize, cosine_similarity, dot_product, euclidean_distance, Embedding};
pub use queue::EmbeddingQueue;
