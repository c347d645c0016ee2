use crate::config::WordPieceConfig;
use crate::error::Result;

use super::vocab::Vocab;
use super::ModelToken;

/// Greedy longest-match-first WordPiece model.
#[derive(Debug, Clone)]
pub struct WordPiece {
    pub vocab: Vocab,
    unk_id: u32,
    unk_token: String,
    prefix: String,
    max_input_chars_per_word: usize,
}

impl WordPiece {
    pub fn from_config(config: WordPieceConfig) -> Result<WordPiece> {
        let vocab = Vocab::from_map(config.vocab)?;
        let unk_id = vocab.require(&config.unk_token, "unk token")?;
        Ok(WordPiece {
            vocab,
            unk_id,
            unk_token: config.unk_token,
            prefix: config.continuing_subword_prefix,
            max_input_chars_per_word: config.max_input_chars_per_word,
        })
    }

    /// Split one word into vocabulary pieces.
    ///
    /// Starting at the left, the longest vocabulary entry (with the
    /// continuation prefix after the first piece) is taken until the word is
    /// consumed. If some position has no match, or the word is longer than
    /// `max_input_chars_per_word`, the whole word becomes the unk token.
    pub fn tokenize(&self, word: &[char]) -> Vec<ModelToken> {
        let n = word.len();
        if n > self.max_input_chars_per_word {
            return vec![self.unk(n)];
        }

        let mut tokens = Vec::new();
        let mut start = 0;
        while start < n {
            let mut end = n;
            let mut found = None;
            while start < end {
                let mut candidate: String = word[start..end].iter().collect();
                if start > 0 {
                    candidate.insert_str(0, &self.prefix);
                }
                if let Some(id) = self.vocab.get(&candidate) {
                    found = Some((id, candidate));
                    break;
                }
                end -= 1;
            }
            match found {
                Some((id, value)) => {
                    tokens.push(ModelToken {
                        id,
                        value,
                        range: start..end,
                    });
                    start = end;
                }
                None => return vec![self.unk(n)],
            }
        }
        tokens
    }

    fn unk(&self, n: usize) -> ModelToken {
        ModelToken {
            id: self.unk_id,
            value: self.unk_token.clone(),
            range: 0..n,
        }
    }
}
