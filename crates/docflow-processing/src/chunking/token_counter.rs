//! Tiktoken-based token counting matched to the embedding model

use tiktoken_rs::{CoreBPE, cl100k_base, o200k_base, p50k_base, r50k_base};

use crate::error::{ProcessingError, ProcessingResult};

/// Token-accurate counting and splitting for one tokenizer model
pub trait TokenCounter: Send + Sync {
    /// Model name this counter was built for
    fn model(&self) -> &str;

    /// Number of tokens in the text
    fn count(&self, text: &str) -> usize;

    /// Split text into windows of at most `max_tokens` tokens with
    /// `overlap` tokens shared between adjacent windows
    ///
    /// Window boundaries land on token boundaries; decoding each window
    /// and concatenating them with the overlap removed reproduces the
    /// input byte-exactly.
    ///
    /// # Errors
    ///
    /// Returns a tokenizer error if a window cannot be decoded.
    fn split_tokens(
        &self,
        text: &str,
        max_tokens: usize,
        overlap: usize,
    ) -> ProcessingResult<Vec<String>>;
}

/// Token counter using tiktoken encoders
pub struct TiktokenCounter {
    model_name: String,
    encoder: CoreBPE,
}

impl TiktokenCounter {
    /// Create a counter for the named model
    ///
    /// # Errors
    ///
    /// Returns a tokenizer error if the encoder tables cannot be loaded.
    pub fn new(model_name: &str) -> ProcessingResult<Self> {
        let encoder = Self::encoder_for_model(model_name)?;
        Ok(Self {
            model_name: model_name.to_string(),
            encoder,
        })
    }

    /// Pick the encoder for a model name
    fn encoder_for_model(model_name: &str) -> ProcessingResult<CoreBPE> {
        let encoder = match model_name {
            // Current OpenAI embedding models use cl100k_base
            name if name.starts_with("text-embedding-3") => cl100k_base(),
            name if name.starts_with("text-embedding-ada") => cl100k_base(),
            // 4o-era models use o200k_base
            name if name.starts_with("gpt-4o") || name.starts_with("o1") => o200k_base(),
            name if name.starts_with("gpt-4") || name.starts_with("gpt-3.5") => cl100k_base(),
            // Legacy completion models
            name if name.starts_with("text-davinci") => p50k_base(),
            name if name.starts_with("davinci") || name.starts_with("curie") => r50k_base(),
            // Default to cl100k_base for unknown models
            _ => cl100k_base(),
        };
        encoder.map_err(|e| ProcessingError::Tokenizer(e.to_string()))
    }
}

impl TokenCounter for TiktokenCounter {
    fn model(&self) -> &str {
        &self.model_name
    }

    fn count(&self, text: &str) -> usize {
        self.encoder.encode_ordinary(text).len()
    }

    fn split_tokens(
        &self,
        text: &str,
        max_tokens: usize,
        overlap: usize,
    ) -> ProcessingResult<Vec<String>> {
        if max_tokens == 0 || overlap >= max_tokens {
            return Err(ProcessingError::Chunking(format!(
                "invalid window: max_tokens={max_tokens}, overlap={overlap}"
            )));
        }

        let tokens = self.encoder.encode_ordinary(text);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        if tokens.len() <= max_tokens {
            return Ok(vec![text.to_string()]);
        }

        let mut pieces = Vec::new();
        let mut start = 0usize;
        while start < tokens.len() {
            let mut end = (start + max_tokens).min(tokens.len());
            // A token boundary can split a multi-byte code point; shrink the
            // window until the slice decodes cleanly on its own
            let piece = loop {
                match self
                    .encoder
                    .decode(tokens.get(start..end).unwrap_or_default().to_vec())
                {
                    Ok(piece) => break piece,
                    Err(e) => {
                        if end > start + 1 {
                            end -= 1;
                        } else {
                            return Err(ProcessingError::Tokenizer(e.to_string()));
                        }
                    }
                }
            };
            pieces.push(piece);
            if end >= tokens.len() {
                break;
            }
            start = (end - overlap).max(start + 1);
        }
        Ok(pieces)
    }
}
