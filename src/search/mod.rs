//! Search layer facade.
//!
//! - **[`abbrev`]**: memoryless abbreviation scorer (`score(name, query)`).
//! - **[`relevance`]**: learned per-candidate usage blended with the score.
//! - **[`rank`]**: deterministic ordering and truncation of scored candidates.
//! - **[`context`]**: per-keystroke and drill-in context chains.

pub mod abbrev;
pub mod context;
pub mod rank;
pub mod relevance;
