use tokenizers::processors::PostProcessorWrapper;
use tokenizers::{PostProcessor, TruncationDirection};

use crate::encoding::Encoding;
use crate::error::{Result, TokenizerError};
use crate::truncation::{content_budget, TruncationPolicy};

use super::TokenizerEngine;

/// The compiled HF `tokenizers` implementation.
///
/// The file's own truncation and padding settings are cleared; length
/// limits come from the caller and padding is done by the batch builder.
/// Content is encoded by a copy without post-processor so that offset
/// trimming runs exactly once, after truncation.
pub struct NativeEngine {
    inner: tokenizers::Tokenizer,
    bare: tokenizers::Tokenizer,
}

impl std::fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEngine").finish_non_exhaustive()
    }
}

fn engine_err(e: impl std::fmt::Display) -> TokenizerError {
    TokenizerError::Engine(e.to_string())
}

impl NativeEngine {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut inner = tokenizers::Tokenizer::from_bytes(bytes)
            .map_err(|e| TokenizerError::Malformed(e.to_string()))?;
        inner.with_truncation(None).map_err(engine_err)?;
        inner.with_padding(None);
        let mut bare = inner.clone();
        bare.with_post_processor(None::<PostProcessorWrapper>);
        Ok(NativeEngine { inner, bare })
    }
}

impl TokenizerEngine for NativeEngine {
    fn encode(
        &self,
        text: &str,
        max_len: Option<usize>,
        policy: TruncationPolicy,
    ) -> Result<Encoding> {
        let mut encoding = self.bare.encode(text, false).map_err(engine_err)?;
        if let Some(keep) =
            content_budget(encoding.len(), self.added_special_tokens(), max_len, policy)?
        {
            encoding.truncate(keep, 0, TruncationDirection::Right);
        }
        let encoding = self
            .inner
            .post_process(encoding, None, true)
            .map_err(engine_err)?;
        Ok(Encoding::from(&encoding))
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        // Some decoders index the last token unchecked, so an empty token
        // list never reaches the library.
        let added = self.inner.get_added_vocabulary();
        let any_kept = ids.iter().any(|&id| {
            self.inner
                .id_to_token(id)
                .is_some_and(|t| !skip_special_tokens || !added.is_special_token(&t))
        });
        if !any_kept {
            return Ok(String::new());
        }
        self.inner.decode(ids, skip_special_tokens).map_err(engine_err)
    }

    fn added_special_tokens(&self) -> usize {
        self.inner
            .get_post_processor()
            .map_or(0, |p| p.added_tokens(false))
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }
}
