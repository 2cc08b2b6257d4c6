//! AssisText Shared Types
//!
//! Wire types and request validation shared by the AssisText billing client crates.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
