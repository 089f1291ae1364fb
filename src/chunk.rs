//! Paragraph-boundary text chunker with overlap.
//!
//! Splits document content into [`Chunk`]s that respect a configurable
//! `max_tokens` limit (4-chars-per-token heuristic). Splitting occurs on
//! paragraph boundaries (`\n\n`) to preserve semantic coherence; adjacent
//! chunks share an `overlap_tokens` tail so that statements straddling a
//! boundary still embed on one side or the other.

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split content into chunks with contiguous indices starting at 0.
/// Always returns at least one chunk.
pub fn chunk_text(doc_id: i64, text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    let overlap_chars = overlap_tokens * CHARS_PER_TOKEN;

    if text.trim().is_empty() {
        return vec![make_chunk(doc_id, 0, text.trim())];
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current.is_empty() {
            trimmed.len()
        } else {
            current.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }

        if trimmed.len() > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            // A single oversized paragraph is hard-split at word boundaries.
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = floor_char_boundary(remaining, remaining.len().min(max_chars));
                let actual = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                pieces.push(remaining[..actual].trim().to_string());
                remaining = &remaining[actual..];
            }
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(trimmed);
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    if pieces.is_empty() {
        pieces.push(text.trim().to_string());
    }

    // Prepend the previous chunk's tail as overlap.
    let mut chunks = Vec::with_capacity(pieces.len());
    for (i, piece) in pieces.iter().enumerate() {
        let text = if i > 0 && overlap_chars > 0 {
            let prev = &pieces[i - 1];
            let start = floor_char_boundary(prev, prev.len().saturating_sub(overlap_chars));
            let tail = prev[start..].trim_start();
            if tail.is_empty() {
                piece.clone()
            } else {
                format!("{tail}\n\n{piece}")
            }
        } else {
            piece.clone()
        };
        chunks.push(make_chunk(doc_id, i as i64, &text));
    }

    chunks
}

fn make_chunk(doc_id: i64, index: i64, text: &str) -> Chunk {
    Chunk {
        doc_id,
        chunk_index: index,
        text: text.to_string(),
        token_count: (text.len() / CHARS_PER_TOKEN) as i64,
    }
}

/// Largest char boundary <= `at`.
fn floor_char_boundary(s: &str, at: usize) -> usize {
    let mut at = at.min(s.len());
    while at > 0 && !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text(1, "Hello, world!", 512, 64);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text() {
        let chunks = chunk_text(1, "", 512, 64);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn test_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {i} with some filler text."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text(1, &text, 10, 2);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn test_overlap_carries_tail_of_previous_chunk() {
        let text = "alpha beta gamma delta.\n\nepsilon zeta eta theta.\n\niota kappa lambda mu.";
        let chunks = chunk_text(1, text, 6, 2);
        assert!(chunks.len() > 1);
        // Each later chunk carries the tail of its predecessor.
        for pair in chunks.windows(2) {
            let prev_end = &pair[0].text[pair[0].text.len().saturating_sub(8)..];
            let prev_last_word = prev_end.split_whitespace().last().unwrap_or("");
            assert!(
                pair[1].text.contains(prev_last_word),
                "chunk {:?} missing overlap from {:?}",
                pair[1].text,
                pair[0].text
            );
        }
    }

    #[test]
    fn test_oversized_paragraph_hard_split() {
        let text = "word ".repeat(400);
        let chunks = chunk_text(1, &text, 10, 0);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 10 * 4 + 1);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let a = chunk_text(1, text, 5, 1);
        let b = chunk_text(1, text, 5, 1);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.chunk_index, y.chunk_index);
        }
    }

    #[test]
    fn test_multibyte_safe() {
        let text = "héllo wörld ünïcode ".repeat(100);
        let chunks = chunk_text(1, &text, 8, 2);
        assert!(!chunks.is_empty());
    }
}
