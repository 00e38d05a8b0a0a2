//! Model Module - artifact loading, feature encoding and inference
//!
//! The classifier is opaque to the rest of the service: handlers only see
//! `ModelStore` and `Verdict`.

pub mod artifacts;
pub mod classifier;
pub mod encoder;
pub mod inference;

// Re-export common types
pub use artifacts::ModelStore;
pub use encoder::RawRecord;
pub use inference::{Label, PredictError, Verdict};
