//! Persistence for learned relevance.
//!
//! - **[`relevance_file`]**: atomic load/save of the relevance snapshot blob.
//! - **[`saver`]**: background thread flushing the shared store on a timer.

pub mod relevance_file;
pub mod saver;

pub use relevance_file::RelevanceFile;
pub use saver::RelevanceSaver;
