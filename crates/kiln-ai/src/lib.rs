//! kiln-ai: text-completion provider layer
//!
//! This crate provides the message types and the `TextGenerator` seam used to
//! talk to a generative model, plus a Gemini implementation.

pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use providers::TextGenerator;
pub use stream::{TextEvent, TextEventStream};
pub use types::*;
