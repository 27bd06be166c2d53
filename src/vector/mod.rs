//! Vector index family (spec §4.6): HNSW approximate search, quantizers,
//! and multi-vector scoring strategies.

pub mod distance;
pub mod hnsw;
pub mod maintainer;
pub mod multi;
pub mod quantize;

pub use distance::Metric;
pub use hnsw::HnswIndex;
pub use maintainer::VectorMaintainer;
pub use multi::MultiVectorScoring;
pub use quantize::{BinaryQuantizer, ProductQuantizer, Quantizer, ScalarQuantizer};
