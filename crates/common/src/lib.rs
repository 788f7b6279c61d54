//! Common types for glowctl

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
