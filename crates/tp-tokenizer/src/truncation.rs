use serde::{Deserialize, Serialize};

use crate::error::{Result, TokenizerError};

/// What to do with an input longer than the model accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TruncationPolicy {
    /// Drop content tokens from the right, keeping boundary special tokens.
    #[default]
    Truncate,
    /// Fail with [`TokenizerError::SequenceTooLong`].
    Error,
}

/// Number of content tokens to keep so that `content_len + added` fits in
/// `max_len`, or `None` when no truncation is needed.
pub fn content_budget(
    content_len: usize,
    added: usize,
    max_len: Option<usize>,
    policy: TruncationPolicy,
) -> Result<Option<usize>> {
    let Some(max) = max_len else {
        return Ok(None);
    };
    let total = content_len + added;
    if total <= max {
        return Ok(None);
    }
    match policy {
        TruncationPolicy::Truncate => Ok(Some(max.saturating_sub(added))),
        TruncationPolicy::Error => Err(TokenizerError::SequenceTooLong { len: total, max }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget() {
        assert_eq!(content_budget(3, 2, None, TruncationPolicy::Truncate).unwrap(), None);
        assert_eq!(content_budget(3, 2, Some(5), TruncationPolicy::Error).unwrap(), None);
        assert_eq!(content_budget(10, 2, Some(5), TruncationPolicy::Truncate).unwrap(), Some(3));
        assert_eq!(content_budget(10, 2, Some(1), TruncationPolicy::Truncate).unwrap(), Some(0));
        assert!(matches!(
            content_budget(10, 2, Some(5), TruncationPolicy::Error),
            Err(TokenizerError::SequenceTooLong { len: 12, max: 5 })
        ));
    }
}
