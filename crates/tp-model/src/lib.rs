//! `tp-model` - model containers and encoder architectures for text pipelines.
//!
//! - [`gguf`]: memory-mapped GGUF reader with dequantization
//! - [`bert`]: BERT-family encoder forward pass on a `ComputeBackend`
//! - [`metadata`]: `config.json` labels, capacity and problem type

pub mod architecture;
pub mod bert;
pub mod error;
pub mod gguf;
pub mod metadata;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use architecture::{Encoder, EncoderInput, EncoderOutput};
pub use bert::{BertConfig, BertModel};
pub use error::{ModelError, Result};
pub use metadata::{ModelMetadata, ProblemType};

use std::path::Path;

/// Opens a GGUF file and builds the encoder named by
/// `general.architecture`.
pub fn load_encoder(path: &Path) -> Result<Box<dyn Encoder>> {
    let gguf = gguf::GgufFile::open(path)?;
    let arch = gguf.metadata.get_string("general.architecture")?;
    match arch {
        "bert" => Ok(Box::new(BertModel::from_gguf(&gguf)?)),
        other => Err(ModelError::UnsupportedArchitecture(other.to_string())),
    }
}
