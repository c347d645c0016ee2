//! Tokenizers for text pipelines.
//!
//! A [`Tokenizer`] is loaded from a HF `tokenizer.json` file and bound to one
//! of two engines: the compiled `tokenizers` library ([`TokenizerRuntime::Native`],
//! feature `native`) or the implementation in this crate
//! ([`TokenizerRuntime::InProcess`]). Both produce the same ids, byte
//! offsets, type ids and special-token placement.

pub mod added;
pub mod byte_level;
pub mod config;
pub mod decoder;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod pre_tokenizer;
pub mod processor;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod tokenizer;
pub mod truncation;

pub use encoding::Encoding;
pub use error::{Result, TokenizerError};
pub use tokenizer::{TimingSnapshot, Tokenizer, TokenizerRuntime};
pub use truncation::TruncationPolicy;
