//! Token counting for chunk sizing

use crate::error::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::{debug, info};
use unicode_segmentation::UnicodeSegmentation;

/// Name that selects [`WordTokenizer`] instead of a model tokenizer
pub const WORD_TOKENIZER: &str = "words";

/// Counts tokens the way the embedding model will see them
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> Result<usize>;

    fn name(&self) -> &str;
}

/// Tokenizer loaded from a `tokenizer.json`, locally or from the model hub
pub struct HfTokenizer {
    name: String,
    inner: Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = Tokenizer::from_file(path)
            .map_err(|e| Error::Tokenizer(format!("{}: {}", path.display(), e)))?;
        Self::new(path.display().to_string(), inner)
    }

    #[cfg(feature = "hub-tokenizers")]
    pub fn from_pretrained(identifier: &str) -> Result<Self> {
        let inner = Tokenizer::from_pretrained(identifier, None)
            .map_err(|e| Error::Tokenizer(format!("{}: {}", identifier, e)))?;
        Self::new(identifier.to_string(), inner)
    }

    fn new(name: String, mut inner: Tokenizer) -> Result<Self> {
        // Counting must see the whole text, not a window padded or cut to the model limit
        inner
            .with_truncation(None)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        inner.with_padding(None);
        Ok(Self { name, inner })
    }
}

impl TokenCounter for HfTokenizer {
    /// Includes the special tokens the post-processor adds ([CLS], [SEP], ...)
    fn count_tokens(&self, text: &str) -> Result<usize> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(encoding.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Counts Unicode words and punctuation, one token each
#[derive(Debug, Default, Clone)]
pub struct WordTokenizer;

impl TokenCounter for WordTokenizer {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(text
            .split_word_bounds()
            .filter(|w| !w.trim().is_empty())
            .count())
    }

    fn name(&self) -> &str {
        WORD_TOKENIZER
    }
}

/// Resolve a tokenizer name: `words`, a path to `tokenizer.json`, or a hub identifier
pub fn load_token_counter(name: &str) -> Result<Arc<dyn TokenCounter>> {
    if name == WORD_TOKENIZER {
        return Ok(Arc::new(WordTokenizer));
    }

    let path = Path::new(name);
    if path.is_file() {
        info!("Loading tokenizer from {}", path.display());
        return Ok(Arc::new(HfTokenizer::from_file(path)?));
    }

    load_from_hub(name)
}

#[cfg(feature = "hub-tokenizers")]
fn load_from_hub(identifier: &str) -> Result<Arc<dyn TokenCounter>> {
    info!("Fetching tokenizer {} from the model hub", identifier);
    let tokenizer = HfTokenizer::from_pretrained(identifier)?;
    debug!("Loaded tokenizer {}", identifier);
    Ok(Arc::new(tokenizer))
}

#[cfg(not(feature = "hub-tokenizers"))]
fn load_from_hub(identifier: &str) -> Result<Arc<dyn TokenCounter>> {
    debug!("Hub download disabled, cannot resolve {}", identifier);
    Err(Error::Tokenizer(format!(
        "`{}` is not a tokenizer.json file and hub downloads are disabled (enable the hub-tokenizers feature)",
        identifier
    )))
}

/// Load a tokenizer off the async runtime
pub async fn load_token_counter_blocking(name: &str) -> Result<Arc<dyn TokenCounter>> {
    let name = name.to_string();
    tokio::task::spawn_blocking(move || load_token_counter(&name))
        .await
        .map_err(|e| Error::Tokenizer(format!("tokenizer loader panicked: {}", e)))?
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::HfTokenizer;
    use std::path::Path;

    /// Word-level tokenizer that wraps every encoding in [CLS] ... [SEP]
    pub const BERT_STYLE_TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": {"type": "BertProcessing", "sep": ["[SEP]", 2], "cls": ["[CLS]", 1]},
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[UNK]": 0, "[CLS]": 1, "[SEP]": 2, "hello": 3, "world": 4},
            "unk_token": "[UNK]"
        }
    }"#;

    /// Write the fixture into `dir` and load it
    pub fn bert_style_tokenizer(dir: &Path) -> HfTokenizer {
        let path = dir.join("tokenizer.json");
        std::fs::write(&path, BERT_STYLE_TOKENIZER_JSON).unwrap();
        HfTokenizer::from_file(&path).unwrap()
    }
}
