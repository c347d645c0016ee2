use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::config::BpeConfig;
use crate::error::{Result, TokenizerError};

use super::vocab::Vocab;
use super::ModelToken;

/// Byte-Pair Encoding model loaded from a `tokenizer.json` model section.
#[derive(Debug, Clone)]
pub struct Bpe {
    /// The token vocabulary.
    pub vocab: Vocab,
    /// Map from a pair of token ids to (rank, merged id). Lower rank merges
    /// first.
    merges: HashMap<(u32, u32), (usize, u32)>,
    unk_id: Option<u32>,
    continuing_subword_prefix: Option<String>,
    end_of_word_suffix: Option<String>,
    fuse_unk: bool,
    byte_fallback: bool,
    ignore_merges: bool,
}

/// A symbol of a word being merged: a token id covering a char range,
/// linked to its neighbours. Merged-away symbols have `len == 0`.
#[derive(Debug, Clone, Copy)]
struct Symbol {
    id: u32,
    start: usize,
    len: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Bpe {
    /// Load a BPE model.
    ///
    /// Each merge `(a, b)` must name two vocabulary entries whose
    /// concatenation (with `b`'s continuation prefix removed) is also in the
    /// vocabulary. Merge order defines the rank.
    pub fn from_config(config: BpeConfig) -> Result<Bpe> {
        if config.dropout.is_some_and(|p| p > 0.0) {
            return Err(TokenizerError::UnsupportedComponent {
                kind: "model option",
                name: "BPE dropout".to_string(),
            });
        }
        let vocab = Vocab::from_map(config.vocab)?;

        let mut merges = HashMap::with_capacity(config.merges.len());
        for (rank, entry) in config.merges.iter().enumerate() {
            let (a, b) = entry.pair()?;
            let a_id = vocab.require(&a, "merge part")?;
            let b_id = vocab.require(&b, "merge part")?;
            let b_tail = match &config.continuing_subword_prefix {
                Some(prefix) => b.strip_prefix(prefix.as_str()).unwrap_or(&b),
                None => &b,
            };
            let merged = format!("{}{}", a, b_tail);
            let merged_id = vocab.require(&merged, "merge result")?;
            merges.insert((a_id, b_id), (rank, merged_id));
        }

        let unk_id = match &config.unk_token {
            Some(tok) => Some(vocab.require(tok, "unk token")?),
            None => None,
        };

        Ok(Bpe {
            vocab,
            merges,
            unk_id,
            continuing_subword_prefix: config.continuing_subword_prefix,
            end_of_word_suffix: config.end_of_word_suffix,
            fuse_unk: config.fuse_unk,
            byte_fallback: config.byte_fallback,
            ignore_merges: config.ignore_merges,
        })
    }

    /// Encode one pre-tokenized word.
    ///
    /// Algorithm:
    /// 1. If `ignore_merges` is set and the whole word is a vocabulary entry,
    ///    return it as a single token.
    /// 2. Map every char to its vocabulary entry (continuation prefix on all
    ///    but the first, end-of-word suffix on the last). Chars without an
    ///    entry fall back to `<0xHH>` byte tokens when enabled, else to the
    ///    unk token (consecutive unks fused when `fuse_unk`), else are
    ///    dropped.
    /// 3. Repeatedly apply the lowest-rank merge among adjacent symbols,
    ///    leftmost first on ties, until no merge applies.
    pub fn tokenize(&self, word: &[char]) -> Vec<ModelToken> {
        if word.is_empty() {
            return Vec::new();
        }
        if self.ignore_merges {
            let whole: String = word.iter().collect();
            if let Some(id) = self.vocab.get(&whole) {
                return vec![ModelToken {
                    id,
                    value: whole,
                    range: 0..word.len(),
                }];
            }
        }

        let mut symbols = self.initial_symbols(word);
        self.merge_all(&mut symbols);

        symbols
            .into_iter()
            .filter(|s| s.len > 0)
            .map(|s| ModelToken {
                id: s.id,
                value: self.vocab.token(s.id).unwrap_or_default().to_string(),
                range: s.start..s.start + s.len,
            })
            .collect()
    }

    fn initial_symbols(&self, word: &[char]) -> Vec<Symbol> {
        fn push(symbols: &mut Vec<Symbol>, id: u32, start: usize, len: usize) {
            let prev = symbols.len().checked_sub(1);
            if let Some(p) = prev {
                symbols[p].next = Some(symbols.len());
            }
            symbols.push(Symbol {
                id,
                start,
                len,
                prev,
                next: None,
            });
        }

        let mut symbols: Vec<Symbol> = Vec::with_capacity(word.len());

        // Symbols are laid end to end in push order, so a pending unk
        // flushed after byte tokens starts where they end.
        let mut cursor = 0;
        let flush = |symbols: &mut Vec<Symbol>, cursor: &mut usize, id: u32, len: usize| {
            push(symbols, id, *cursor, len);
            *cursor += len;
        };
        // Pending unk as (id, len).
        let mut pending: Option<(u32, usize)> = None;
        for (i, &c) in word.iter().enumerate() {
            let mut s = c.to_string();
            if i > 0 {
                if let Some(prefix) = &self.continuing_subword_prefix {
                    s.insert_str(0, prefix);
                }
            }
            if i + 1 == word.len() {
                if let Some(suffix) = &self.end_of_word_suffix {
                    s.push_str(suffix);
                }
            }

            if let Some(id) = self.vocab.get(&s) {
                if let Some((uid, ulen)) = pending.take() {
                    flush(&mut symbols, &mut cursor, uid, ulen);
                }
                flush(&mut symbols, &mut cursor, id, 1);
                continue;
            }

            if self.byte_fallback {
                let ids: Option<Vec<u32>> = s
                    .bytes()
                    .map(|b| self.vocab.get(&format!("<0x{:02X}>", b)))
                    .collect();
                if let Some(ids) = ids {
                    // A pending unk stays pending across byte tokens, and
                    // every byte token covers the originating char.
                    for id in ids {
                        push(&mut symbols, id, cursor, 1);
                    }
                    cursor += 1;
                    continue;
                }
            }

            if let Some(unk_id) = self.unk_id {
                pending = match pending {
                    Some((uid, ulen)) if self.fuse_unk => Some((uid, ulen + 1)),
                    Some((uid, ulen)) => {
                        flush(&mut symbols, &mut cursor, uid, ulen);
                        Some((unk_id, 1))
                    }
                    None => Some((unk_id, 1)),
                };
            }
        }
        if let Some((uid, ulen)) = pending {
            flush(&mut symbols, &mut cursor, uid, ulen);
        }
        symbols
    }

    fn merge_all(&self, symbols: &mut [Symbol]) {
        // Heap entries: (rank, left position, merged id), smallest first.
        let mut queue: BinaryHeap<Reverse<(usize, usize, u32)>> = BinaryHeap::new();
        for pos in 0..symbols.len().saturating_sub(1) {
            if let Some(&(rank, new_id)) = self.merges.get(&(symbols[pos].id, symbols[pos + 1].id)) {
                queue.push(Reverse((rank, pos, new_id)));
            }
        }

        while let Some(Reverse((_, pos, new_id))) = queue.pop() {
            let left = symbols[pos];
            if left.len == 0 {
                continue;
            }
            let Some(right_pos) = left.next else {
                continue;
            };
            let right = symbols[right_pos];
            // Skip entries made stale by an earlier merge.
            match self.merges.get(&(left.id, right.id)) {
                Some(&(_, id)) if id == new_id => {}
                _ => continue,
            }

            symbols[pos].id = new_id;
            symbols[pos].len += right.len;
            symbols[pos].next = right.next;
            symbols[right_pos].len = 0;
            if let Some(after) = right.next {
                symbols[after].prev = Some(pos);
            }

            let current = symbols[pos];
            if let Some(prev) = current.prev {
                if let Some(&(rank, id)) = self.merges.get(&(symbols[prev].id, current.id)) {
                    queue.push(Reverse((rank, prev, id)));
                }
            }
            if let Some(next) = current.next {
                if let Some(&(rank, id)) = self.merges.get(&(current.id, symbols[next].id)) {
                    queue.push(Reverse((rank, pos, id)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeEntry;

    fn config(tokens: &[&str], merges: &[&str]) -> BpeConfig {
        BpeConfig {
            vocab: tokens
                .iter()
                .enumerate()
                .map(|(i, t)| (t.to_string(), i as u32))
                .collect(),
            merges: merges.iter().map(|m| MergeEntry::Joined(m.to_string())).collect(),
            unk_token: None,
            continuing_subword_prefix: None,
            end_of_word_suffix: None,
            fuse_unk: false,
            byte_fallback: false,
            ignore_merges: false,
            dropout: None,
        }
    }

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn ids(toks: &[ModelToken]) -> Vec<u32> {
        toks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_merges_by_rank() {
        // 0:a 1:b 2:c 3:ab 4:bc 5:abc ; "b c" outranks "a b".
        let bpe = Bpe::from_config(config(
            &["a", "b", "c", "ab", "bc", "abc"],
            &["b c", "a bc", "a b"],
        ))
        .unwrap();
        let toks = bpe.tokenize(&chars("abc"));
        assert_eq!(ids(&toks), vec![5]);
        assert_eq!(toks[0].range, 0..3);

        let toks = bpe.tokenize(&chars("abab"));
        assert_eq!(ids(&toks), vec![3, 3]);
        assert_eq!(toks[1].range, 2..4);
    }

    #[test]
    fn test_leftmost_on_ties() {
        let bpe = Bpe::from_config(config(&["a", "aa"], &["a a"])).unwrap();
        let toks = bpe.tokenize(&chars("aaa"));
        assert_eq!(ids(&toks), vec![1, 0]);
    }

    #[test]
    fn test_unknown_chars() {
        let mut c = config(&["<unk>", "a"], &[]);
        let dropped = Bpe::from_config(c.clone()).unwrap();
        assert_eq!(ids(&dropped.tokenize(&chars("axa"))), vec![1, 1]);

        c.unk_token = Some("<unk>".into());
        let bpe = Bpe::from_config(c.clone()).unwrap();
        assert_eq!(ids(&bpe.tokenize(&chars("axxa"))), vec![1, 0, 0, 1]);

        c.fuse_unk = true;
        let fused = Bpe::from_config(c).unwrap();
        let toks = fused.tokenize(&chars("axxa"));
        assert_eq!(ids(&toks), vec![1, 0, 1]);
        assert_eq!(toks[1].range, 1..3);
    }

    #[test]
    fn test_byte_fallback() {
        let mut c = config(&["a", "<0xC3>", "<0xA9>"], &[]);
        c.byte_fallback = true;
        let bpe = Bpe::from_config(c).unwrap();
        let toks = bpe.tokenize(&chars("aé"));
        assert_eq!(ids(&toks), vec![0, 1, 2]);
        assert_eq!(toks[2].range, 1..2);
    }

    #[test]
    fn test_byte_fallback_leaves_unk_pending() {
        let mut c = config(&["<unk>", "<0x7A>", "a"], &[]);
        c.unk_token = Some("<unk>".into());
        c.byte_fallback = true;
        let bpe = Bpe::from_config(c).unwrap();
        let toks = bpe.tokenize(&chars("xyz"));
        assert_eq!(ids(&toks), vec![0, 1, 0]);
        let ranges: Vec<_> = toks.iter().map(|t| t.range.clone()).collect();
        assert_eq!(ranges, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_prefix_and_suffix() {
        let mut c = config(&["a", "##b", "b</w>", "##b</w>", "ab</w>"], &["a ##b</w>"]);
        c.continuing_subword_prefix = Some("##".into());
        c.end_of_word_suffix = Some("</w>".into());
        let bpe = Bpe::from_config(c).unwrap();
        let toks = bpe.tokenize(&chars("ab"));
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].value, "ab</w>");
    }

    #[test]
    fn test_ignore_merges() {
        let mut c = config(&["a", "b", "ab", "abb"], &["a b"]);
        c.ignore_merges = true;
        let bpe = Bpe::from_config(c).unwrap();
        assert_eq!(ids(&bpe.tokenize(&chars("abb"))), vec![3]);
    }

    #[test]
    fn test_invalid_merges_rejected() {
        assert!(Bpe::from_config(config(&["a", "b"], &["a b"])).is_err());
        let mut c = config(&["a"], &[]);
        c.dropout = Some(0.1);
        assert!(matches!(
            Bpe::from_config(c),
            Err(TokenizerError::UnsupportedComponent { .. })
        ));
    }
}
