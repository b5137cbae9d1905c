//! Vector storage backends

pub mod mock;
pub mod qdrant;
pub mod traits;

pub use mock::MockVectorStorage;
pub use qdrant::QdrantStorage;
pub use traits::{VectorRecord, VectorStorage};
