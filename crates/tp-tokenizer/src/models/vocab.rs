use std::collections::HashMap;

use crate::error::{Result, TokenizerError};

/// Bidirectional token vocabulary of a subword model.
#[derive(Debug, Clone)]
pub struct Vocab {
    /// Token string to id.
    pub token_to_id: HashMap<String, u32>,
    /// Id to token string. Ids in `tokenizer.json` may be sparse.
    pub id_to_token: HashMap<u32, String>,
}

impl Vocab {
    /// Build a vocabulary from the `vocab` object of a model section.
    ///
    /// Two tokens sharing one id make the reverse mapping ambiguous and are
    /// rejected.
    pub fn from_map(token_to_id: HashMap<String, u32>) -> Result<Vocab> {
        let mut id_to_token = HashMap::with_capacity(token_to_id.len());
        for (tok, &id) in &token_to_id {
            if let Some(prev) = id_to_token.insert(id, tok.clone()) {
                return Err(TokenizerError::Malformed(format!(
                    "tokens {:?} and {:?} share id {}",
                    prev, tok, id
                )));
            }
        }
        Ok(Vocab {
            token_to_id,
            id_to_token,
        })
    }

    pub fn get(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    /// Id of `token`, or a malformed-file error naming its role.
    pub fn require(&self, token: &str, role: &str) -> Result<u32> {
        self.get(token).ok_or_else(|| {
            TokenizerError::Malformed(format!("{} {:?} is not in the vocabulary", role, token))
        })
    }

    /// Number of tokens in the vocabulary.
    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    /// Returns true if the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }
}
