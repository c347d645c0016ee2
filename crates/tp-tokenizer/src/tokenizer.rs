use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TokenizerJson;
use crate::encoding::Encoding;
use crate::engine::{Engine, InProcessEngine, TokenizerEngine};
use crate::error::{Result, TokenizerError};
use crate::truncation::TruncationPolicy;

/// Which engine runs a [`Tokenizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenizerRuntime {
    /// The compiled HF `tokenizers` library.
    Native,
    /// The implementation in this crate.
    InProcess,
}

impl TokenizerRuntime {
    /// Whether this runtime is compiled into the current build.
    pub fn is_available(self) -> bool {
        match self {
            TokenizerRuntime::Native => cfg!(feature = "native"),
            TokenizerRuntime::InProcess => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenizerRuntime::Native => "native",
            TokenizerRuntime::InProcess => "in-process",
        }
    }
}

impl fmt::Display for TokenizerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenizerRuntime {
    type Err = TokenizerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "native" => Ok(TokenizerRuntime::Native),
            "in-process" | "in_process" | "inprocess" => Ok(TokenizerRuntime::InProcess),
            other => Err(TokenizerError::UnknownRuntime(other.to_string())),
        }
    }
}

/// Cumulative tokenizer call statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingSnapshot {
    pub calls: u64,
    pub total: Duration,
}

#[derive(Debug, Default)]
struct Timings {
    calls: AtomicU64,
    nanos: AtomicU64,
}

impl Timings {
    fn record(&self, start: Instant) {
        let nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TimingSnapshot {
        TimingSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            total: Duration::from_nanos(self.nanos.load(Ordering::Relaxed)),
        }
    }
}

/// A tokenizer loaded from `tokenizer.json`, bound to one engine.
#[derive(Debug)]
pub struct Tokenizer {
    runtime: TokenizerRuntime,
    engine: Engine,
    pad_id: u32,
    timings: Timings,
}

impl Tokenizer {
    /// Parse a `tokenizer.json` document with the given engine.
    pub fn from_bytes(runtime: TokenizerRuntime, bytes: &[u8]) -> Result<Self> {
        let config = TokenizerJson::from_bytes(bytes)?;
        let engine = match runtime {
            TokenizerRuntime::InProcess => Engine::InProcess(InProcessEngine::from_config(&config)?),
            #[cfg(feature = "native")]
            TokenizerRuntime::Native => {
                Engine::Native(crate::engine::NativeEngine::from_bytes(bytes)?)
            }
            #[cfg(not(feature = "native"))]
            TokenizerRuntime::Native => {
                return Err(TokenizerError::RuntimeUnavailable(runtime.to_string()))
            }
        };
        let pad_id = config.pad_id();
        debug!(%runtime, pad_id, "tokenizer loaded");
        Ok(Tokenizer {
            runtime,
            engine,
            pad_id,
            timings: Timings::default(),
        })
    }

    pub fn from_file(runtime: TokenizerRuntime, path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(runtime, &bytes)
    }

    pub fn runtime(&self) -> TokenizerRuntime {
        self.runtime
    }

    fn engine(&self) -> &dyn TokenizerEngine {
        self.engine.as_dyn()
    }

    /// Encode one string. See [`Tokenizer::encode_batch`].
    pub fn encode(
        &self,
        text: &str,
        max_len: Option<usize>,
        policy: TruncationPolicy,
    ) -> Result<Encoding> {
        let start = Instant::now();
        let result = self.engine().encode(text, max_len, policy);
        self.timings.record(start);
        result
    }

    /// Encode every input in order.
    ///
    /// With `max_len`, content tokens are dropped from the right so the
    /// encoding including its boundary special tokens fits, or the call
    /// fails under [`TruncationPolicy::Error`].
    pub fn encode_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        max_len: Option<usize>,
        policy: TruncationPolicy,
    ) -> Result<Vec<Encoding>> {
        let start = Instant::now();
        let result = texts
            .iter()
            .map(|t| self.engine().encode(t.as_ref(), max_len, policy))
            .collect();
        self.timings.record(start);
        result
    }

    /// Decode ids to text, optionally dropping special tokens.
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        let start = Instant::now();
        let result = self.engine().decode(ids, skip_special_tokens);
        self.timings.record(start);
        result
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    /// Special tokens added around every sequence.
    pub fn added_special_tokens(&self) -> usize {
        self.engine().added_special_tokens()
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.engine().token_to_id(token)
    }

    pub fn timings(&self) -> TimingSnapshot {
        self.timings.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bert_tokenizer_json, roberta_tokenizer_json};

    fn bert(runtime: TokenizerRuntime) -> Tokenizer {
        Tokenizer::from_bytes(runtime, bert_tokenizer_json().as_bytes()).unwrap()
    }

    fn roberta(runtime: TokenizerRuntime) -> Tokenizer {
        Tokenizer::from_bytes(runtime, roberta_tokenizer_json().as_bytes()).unwrap()
    }

    fn ids(tk: &Tokenizer, words: &[&str]) -> Vec<u32> {
        words.iter().map(|w| tk.token_to_id(w).unwrap()).collect()
    }

    #[cfg(feature = "native")]
    const BERT_INPUTS: &[&str] = &[
        "Hello, world!",
        "The movie was GREAT.",
        "unbelievable",
        "Café [MASK] good",
        "  multiple   spaces\tand\nnewlines ",
        "中文 good",
        "xyz it's",
        "",
    ];

    #[cfg(feature = "native")]
    const ROBERTA_INPUTS: &[&str] = &[
        "hello world",
        "hello  world good",
        " bad good",
        "good\nbad!",
        "héllo",
        "",
    ];

    #[test]
    fn test_runtime_parse() {
        assert_eq!("native".parse::<TokenizerRuntime>().unwrap(), TokenizerRuntime::Native);
        assert_eq!(
            "in-process".parse::<TokenizerRuntime>().unwrap(),
            TokenizerRuntime::InProcess
        );
        assert!(matches!(
            "sentencepiece".parse::<TokenizerRuntime>(),
            Err(TokenizerError::UnknownRuntime(_))
        ));
        assert_eq!(TokenizerRuntime::InProcess.to_string(), "in-process");
    }

    #[test]
    fn test_bert_encode() {
        let tk = bert(TokenizerRuntime::InProcess);
        let enc = tk.encode("Hello, world!", None, TruncationPolicy::Truncate).unwrap();
        assert_eq!(enc.ids, ids(&tk, &["[CLS]", "hello", ",", "world", "!", "[SEP]"]));
        assert_eq!(enc.offsets, vec![(0, 0), (0, 5), (5, 6), (7, 12), (12, 13), (0, 0)]);
        assert_eq!(enc.special_tokens_mask, vec![1, 0, 0, 0, 0, 1]);
        assert_eq!(enc.type_ids, vec![0; 6]);
        assert_eq!(tk.added_special_tokens(), 2);
        assert_eq!(tk.pad_id(), 0);
    }

    #[test]
    fn test_bert_subwords_and_unknowns() {
        let tk = bert(TokenizerRuntime::InProcess);
        let enc = tk.encode("unbelievable xyz", None, TruncationPolicy::Truncate).unwrap();
        assert_eq!(
            enc.ids,
            ids(&tk, &["[CLS]", "un", "##believ", "##able", "[UNK]", "[SEP]"])
        );
        assert_eq!(enc.offsets[2], (2, 8));
        assert_eq!(enc.offsets[4], (13, 16));
    }

    #[test]
    fn test_added_token_in_text() {
        let tk = bert(TokenizerRuntime::InProcess);
        let enc = tk.encode("Café [MASK] good", None, TruncationPolicy::Truncate).unwrap();
        assert_eq!(
            enc.ids,
            ids(&tk, &["[CLS]", "cafe", "[MASK]", "good", "[SEP]"])
        );
        assert_eq!(enc.offsets[1], (0, 5));
        assert_eq!(enc.offsets[2], (6, 12));
    }

    #[test]
    fn test_truncation_keeps_specials() {
        let tk = bert(TokenizerRuntime::InProcess);
        let enc = tk
            .encode("hello world good bad", Some(4), TruncationPolicy::Truncate)
            .unwrap();
        assert_eq!(enc.ids, ids(&tk, &["[CLS]", "hello", "world", "[SEP]"]));

        let err = tk
            .encode("hello world good bad", Some(4), TruncationPolicy::Error)
            .unwrap_err();
        assert!(matches!(err, TokenizerError::SequenceTooLong { len: 6, max: 4 }));

        let fits = tk.encode("hello world", Some(4), TruncationPolicy::Error).unwrap();
        assert_eq!(fits.len(), 4);
    }

    #[test]
    fn test_bert_decode_round_trip() {
        let tk = bert(TokenizerRuntime::InProcess);
        let enc = tk
            .encode("Hello, World! The movie was GREAT.", None, TruncationPolicy::Truncate)
            .unwrap();
        assert_eq!(
            tk.decode(&enc.ids, true).unwrap(),
            "hello, world! the movie was great."
        );
        assert_eq!(
            tk.decode(&enc.ids, false).unwrap(),
            "[CLS] hello, world! the movie was great. [SEP]"
        );
        let enc = tk.encode("unbelievable", None, TruncationPolicy::Truncate).unwrap();
        assert_eq!(tk.decode(&enc.ids, true).unwrap(), "unbelievable");
    }

    #[test]
    fn test_roberta_encode_and_decode() {
        let tk = roberta(TokenizerRuntime::InProcess);
        let enc = tk.encode("hello world", None, TruncationPolicy::Truncate).unwrap();
        assert_eq!(enc.ids, ids(&tk, &["<s>", "hello", "Ġworld", "</s>"]));
        assert_eq!(enc.offsets, vec![(0, 0), (0, 5), (6, 11), (0, 0)]);
        assert_eq!(tk.decode(&enc.ids, true).unwrap(), "hello world");
        assert_eq!(tk.pad_id(), 1);
    }

    #[test]
    fn test_batch_preserves_order_and_counts_calls() {
        let tk = bert(TokenizerRuntime::InProcess);
        let batch = tk
            .encode_batch(&["good", "bad", "hello world"], None, TruncationPolicy::Truncate)
            .unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].ids[1], tk.token_to_id("good").unwrap());
        assert_eq!(batch[1].ids[1], tk.token_to_id("bad").unwrap());
        assert_eq!(batch[2].len(), 4);
        tk.decode(&batch[0].ids, true).unwrap();
        assert_eq!(tk.timings().calls, 2);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, bert_tokenizer_json()).unwrap();
        let tk = Tokenizer::from_file(TokenizerRuntime::InProcess, &path).unwrap();
        assert_eq!(tk.runtime(), TokenizerRuntime::InProcess);
        assert!(matches!(
            Tokenizer::from_file(TokenizerRuntime::InProcess, dir.path().join("missing.json")),
            Err(TokenizerError::Io(_))
        ));
    }

    #[test]
    fn test_unsupported_component_rejected() {
        let mut json: serde_json::Value = serde_json::from_str(&bert_tokenizer_json()).unwrap();
        json["post_processor"] = serde_json::json!({"type": "Custom"});
        let err = Tokenizer::from_bytes(TokenizerRuntime::InProcess, json.to_string().as_bytes())
            .unwrap_err();
        assert!(matches!(err, TokenizerError::UnsupportedComponent { .. }));

        let err = Tokenizer::from_bytes(TokenizerRuntime::InProcess, b"[]").unwrap_err();
        assert!(matches!(err, TokenizerError::Malformed(_)));
    }

    #[cfg(feature = "native")]
    fn assert_engines_agree(json: &str, inputs: &[&str], max_len: Option<usize>) {
        let native = Tokenizer::from_bytes(TokenizerRuntime::Native, json.as_bytes()).unwrap();
        let local = Tokenizer::from_bytes(TokenizerRuntime::InProcess, json.as_bytes()).unwrap();
        assert_eq!(native.added_special_tokens(), local.added_special_tokens());
        for text in inputs {
            let a = native.encode(text, max_len, TruncationPolicy::Truncate).unwrap();
            let b = local.encode(text, max_len, TruncationPolicy::Truncate).unwrap();
            assert_eq!(a.ids, b.ids, "ids differ for {:?}", text);
            assert_eq!(a.offsets, b.offsets, "offsets differ for {:?}", text);
            assert_eq!(a.type_ids, b.type_ids, "type ids differ for {:?}", text);
            assert_eq!(
                a.special_tokens_mask, b.special_tokens_mask,
                "special masks differ for {:?}",
                text
            );
            for skip in [true, false] {
                assert_eq!(
                    native.decode(&a.ids, skip).unwrap(),
                    local.decode(&b.ids, skip).unwrap(),
                    "decode differs for {:?}",
                    text
                );
            }
        }
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_engines_agree_wordpiece() {
        let json = bert_tokenizer_json();
        assert_engines_agree(&json, BERT_INPUTS, None);
        assert_engines_agree(&json, BERT_INPUTS, Some(4));
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_engines_agree_byte_level_bpe() {
        let json = roberta_tokenizer_json();
        assert_engines_agree(&json, ROBERTA_INPUTS, None);
        assert_engines_agree(&json, ROBERTA_INPUTS, Some(3));
    }

    /// A whitespace-split BPE tokenizer without post-processor.
    fn bpe_json(tokens: &[&str], merges: &[&str], model: serde_json::Value, decoder: serde_json::Value) -> String {
        let vocab: serde_json::Map<String, serde_json::Value> = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), serde_json::json!(i)))
            .collect();
        let mut model_json = serde_json::json!({
            "type": "BPE",
            "dropout": null,
            "unk_token": "<unk>",
            "continuing_subword_prefix": null,
            "end_of_word_suffix": null,
            "fuse_unk": false,
            "byte_fallback": false,
            "vocab": vocab,
            "merges": merges
        });
        if let (Some(target), Some(extra)) = (model_json.as_object_mut(), model.as_object()) {
            target.extend(extra.clone());
        }
        serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [{
                "id": 0,
                "content": "<unk>",
                "single_word": false,
                "lstrip": false,
                "rstrip": false,
                "normalized": false,
                "special": true
            }],
            "normalizer": null,
            "pre_tokenizer": {"type": "Whitespace"},
            "post_processor": null,
            "decoder": decoder,
            "model": model_json
        })
        .to_string()
    }

    fn suffix_bpe_json() -> String {
        bpe_json(
            &["<unk>", "a", "b", "a</w>", "b</w>", "ab</w>"],
            &["a b</w>"],
            serde_json::json!({"end_of_word_suffix": "</w>"}),
            serde_json::json!({"type": "BPEDecoder", "suffix": "</w>"}),
        )
    }

    #[test]
    fn test_empty_decode() {
        let json = suffix_bpe_json();
        let mut runtimes = vec![TokenizerRuntime::InProcess];
        if TokenizerRuntime::Native.is_available() {
            runtimes.push(TokenizerRuntime::Native);
        }
        for runtime in runtimes {
            let tok = Tokenizer::from_bytes(runtime, json.as_bytes()).unwrap();
            let empty = tok.encode("", None, TruncationPolicy::Truncate).unwrap();
            assert!(empty.ids.is_empty());
            assert_eq!(tok.decode(&empty.ids, true).unwrap(), "", "{}", runtime);
            assert_eq!(tok.decode(&[0], true).unwrap(), "", "{}", runtime);

            let ids = tok.encode("ab a", None, TruncationPolicy::Truncate).unwrap().ids;
            assert_eq!(ids, vec![5, 3]);
            assert_eq!(tok.decode(&ids, true).unwrap(), "ab a", "{}", runtime);
        }
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_engines_agree_bpe_suffix_decoder() {
        assert_engines_agree(&suffix_bpe_json(), &["ab a", "b", "", "ab c"], None);
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_engines_agree_byte_fallback() {
        // Only "z" has a byte token; "x" and "y" fall through to unk.
        let json = bpe_json(
            &["<unk>", "<0x7A>", "a", "b", "c", "q", "ab"],
            &["a b"],
            serde_json::json!({"byte_fallback": true}),
            serde_json::Value::Null,
        );
        assert_engines_agree(&json, &["xyz abc q", "zxz", "yyz", "zz a", ""], None);
    }

    #[cfg(not(feature = "native"))]
    #[test]
    fn test_native_unavailable() {
        let err = Tokenizer::from_bytes(TokenizerRuntime::Native, bert_tokenizer_json().as_bytes())
            .unwrap_err();
        assert!(matches!(err, TokenizerError::RuntimeUnavailable(_)));
    }
}
