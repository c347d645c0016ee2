use crate::normalizer::Span;

/// The result of encoding one input string.
///
/// All vectors have the same length. `offsets` are byte ranges into the
/// original string; special tokens inserted by the post-processor carry
/// `(0, 0)` and a 1 in `special_tokens_mask`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    pub ids: Vec<u32>,
    pub type_ids: Vec<u32>,
    pub tokens: Vec<String>,
    pub offsets: Vec<Span>,
    pub special_tokens_mask: Vec<u32>,
}

impl Encoding {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn push(&mut self, id: u32, token: String, offsets: Span, special: bool) {
        self.ids.push(id);
        self.type_ids.push(0);
        self.tokens.push(token);
        self.offsets.push(offsets);
        self.special_tokens_mask.push(u32::from(special));
    }

    /// Keeps the first `max_len` tokens.
    pub fn truncate(&mut self, max_len: usize) {
        self.ids.truncate(max_len);
        self.type_ids.truncate(max_len);
        self.tokens.truncate(max_len);
        self.offsets.truncate(max_len);
        self.special_tokens_mask.truncate(max_len);
    }

    pub(crate) fn set_type_id(&mut self, type_id: u32) {
        self.type_ids.iter_mut().for_each(|t| *t = type_id);
    }

    pub(crate) fn extend(&mut self, other: Encoding) {
        self.ids.extend(other.ids);
        self.type_ids.extend(other.type_ids);
        self.tokens.extend(other.tokens);
        self.offsets.extend(other.offsets);
        self.special_tokens_mask.extend(other.special_tokens_mask);
    }

    /// Number of tokens that came from the input text.
    pub fn content_len(&self) -> usize {
        self.special_tokens_mask.iter().filter(|&&m| m == 0).count()
    }
}

#[cfg(feature = "native")]
impl From<&tokenizers::Encoding> for Encoding {
    fn from(enc: &tokenizers::Encoding) -> Self {
        Encoding {
            ids: enc.get_ids().to_vec(),
            type_ids: enc.get_type_ids().to_vec(),
            tokens: enc.get_tokens().to_vec(),
            offsets: enc.get_offsets().to_vec(),
            special_tokens_mask: enc.get_special_tokens_mask().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_and_content_len() {
        let mut e = Encoding::default();
        e.push(1, "[CLS]".into(), (0, 0), true);
        e.push(5, "a".into(), (0, 1), false);
        e.push(6, "b".into(), (2, 3), false);
        assert_eq!(e.len(), 3);
        assert_eq!(e.content_len(), 2);
        e.truncate(2);
        assert_eq!(e.ids, vec![1, 5]);
        assert_eq!(e.offsets, vec![(0, 0), (0, 1)]);
        assert_eq!(e.special_tokens_mask, vec![1, 0]);
    }
}
