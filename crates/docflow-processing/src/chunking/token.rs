//! TOKEN strategy: sentence-aligned sliding window
//!
//! The window fills with whole sentences until the next one would exceed
//! `chunk_size` tokens, which makes every chunk's right edge land on a
//! sentence end whenever the text has one to offer. Adjacent chunks share
//! an overlap carried as the largest sentence suffix that fits in
//! `overlap` tokens. A single sentence longer than the whole window is
//! hard-split at token boundaries.

use docflow_config::ChunkingConfig;

use crate::chunking::sentences::split_sentences;
use crate::chunking::token_counter::TokenCounter;
use crate::error::ProcessingResult;

/// A chunk's text and token count, before document identity is attached
#[derive(Debug, Clone)]
pub struct ChunkPiece {
    pub content: String,
    pub token_count: usize,
}

/// Run the TOKEN strategy over one text
///
/// With `apply_floor` set, a text whose total token count is below
/// `min_chunk_tokens` produces no chunks at all (the tiny-document rule);
/// semantic runs are post-split with the floor off.
///
/// # Errors
///
/// Returns tokenizer errors from hard-splitting oversized sentences.
pub fn token_pieces(
    counter: &dyn TokenCounter,
    config: &ChunkingConfig,
    text: &str,
    apply_floor: bool,
) -> ProcessingResult<Vec<ChunkPiece>> {
    let total = counter.count(text);
    if total == 0 || (apply_floor && total < config.min_chunk_tokens) {
        return Ok(Vec::new());
    }
    if total <= config.chunk_size {
        return Ok(vec![ChunkPiece {
            content: text.to_string(),
            token_count: total,
        }]);
    }

    let sentences = split_sentences(text);
    let counts: Vec<usize> = sentences.iter().map(|s| counter.count(s)).collect();

    let mut pieces: Vec<ChunkPiece> = Vec::new();
    // Sentence indices currently in the window; `fresh` counts those not
    // already emitted as part of the previous chunk's overlap
    let mut window: Vec<usize> = Vec::new();
    let mut window_tokens = 0usize;
    let mut fresh = 0usize;

    for (i, sentence) in sentences.iter().enumerate() {
        let count = *counts.get(i).unwrap_or(&0);

        if count > config.chunk_size {
            // Oversized sentence: flush what we have, then hard-split it
            if fresh > 0 {
                emit_window(counter, config, &sentences, &window, &mut pieces)?;
            }
            let parts = counter.split_tokens(sentence, config.chunk_size, config.overlap)?;
            for part in parts {
                let token_count = counter.count(&part);
                pieces.push(ChunkPiece {
                    content: part,
                    token_count,
                });
            }
            window.clear();
            window_tokens = 0;
            fresh = 0;
            continue;
        }

        if window_tokens + count > config.chunk_size && fresh > 0 {
            emit_window(counter, config, &sentences, &window, &mut pieces)?;

            // Carry the largest sentence suffix that fits in the overlap
            let mut kept: Vec<usize> = Vec::new();
            let mut kept_tokens = 0usize;
            for &j in window.iter().rev() {
                let sentence_tokens = *counts.get(j).unwrap_or(&0);
                if kept_tokens + sentence_tokens > config.overlap {
                    break;
                }
                kept_tokens += sentence_tokens;
                kept.push(j);
            }
            kept.reverse();
            // The overlap must leave room for the incoming sentence
            while kept_tokens + count > config.chunk_size && !kept.is_empty() {
                kept_tokens -= *counts.get(kept.remove(0)).unwrap_or(&0);
            }
            window = kept;
            window_tokens = kept_tokens;
            fresh = 0;
        }

        window.push(i);
        window_tokens += count;
        fresh += 1;
    }

    if fresh > 0 {
        emit_window(counter, config, &sentences, &window, &mut pieces)?;
    }

    Ok(pieces)
}

fn emit_window(
    counter: &dyn TokenCounter,
    config: &ChunkingConfig,
    sentences: &[&str],
    window: &[usize],
    pieces: &mut Vec<ChunkPiece>,
) -> ProcessingResult<()> {
    let content: String = window
        .iter()
        .filter_map(|&j| sentences.get(j).copied())
        .collect();
    if content.is_empty() {
        return Ok(());
    }
    let token_count = counter.count(&content);
    if token_count > config.chunk_size {
        // BPE merges across sentence boundaries rarely push a window over
        // the limit; honor the bound by hard-splitting
        for part in counter.split_tokens(&content, config.chunk_size, 0)? {
            let token_count = counter.count(&part);
            pieces.push(ChunkPiece {
                content: part,
                token_count,
            });
        }
    } else {
        pieces.push(ChunkPiece {
            content,
            token_count,
        });
    }
    Ok(())
}
