//! Model-assisted extraction: capability client and instruction contract.

pub mod client;
pub mod extractor;

pub use client::{ContentBlock, ModelClient};
pub use extractor::{AiExtractor, AiInput, extract_json_array};
