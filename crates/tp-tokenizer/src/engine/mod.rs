pub mod in_process;
#[cfg(feature = "native")]
pub mod native;

use crate::encoding::Encoding;
use crate::error::Result;
use crate::truncation::TruncationPolicy;

pub use in_process::InProcessEngine;
#[cfg(feature = "native")]
pub use native::NativeEngine;

/// Operations every tokenizer engine provides.
pub trait TokenizerEngine: Send + Sync + std::fmt::Debug {
    /// Encode one string with boundary special tokens. Content is
    /// right-truncated to `max_len` minus the special tokens.
    fn encode(&self, text: &str, max_len: Option<usize>, policy: TruncationPolicy)
        -> Result<Encoding>;

    /// Map ids back to text through the configured decoder.
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String>;

    /// Special tokens the post-processor adds around a single sequence.
    fn added_special_tokens(&self) -> usize;

    fn token_to_id(&self, token: &str) -> Option<u32>;
}

/// The engine selected for a tokenizer, fixed at load time.
#[derive(Debug)]
pub enum Engine {
    InProcess(InProcessEngine),
    #[cfg(feature = "native")]
    Native(NativeEngine),
}

impl Engine {
    pub fn as_dyn(&self) -> &dyn TokenizerEngine {
        match self {
            Engine::InProcess(e) => e,
            #[cfg(feature = "native")]
            Engine::Native(e) => e,
        }
    }
}
