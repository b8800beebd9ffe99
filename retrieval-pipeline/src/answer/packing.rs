use std::collections::{HashMap, HashSet};

use common::{storage::types::segment::Segment, utils::tokens::estimate_tokens};

use crate::hybrid::RetrievalItem;

/// Character budget applied to each admitted block before token accounting.
pub const CONTEXT_BLOCK_MAX_CHARS: usize = 800;

/// One admitted piece of evidence; its position in the packed list is the
/// 1-based citation index used in the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBlock {
    pub segment_id: String,
    pub document_id: String,
    pub page_no: u32,
    pub title: String,
    pub text: String,
}

/// Packs ranked evidence into the token budget: one block per (document,
/// page) keeping the highest-ranked occurrence, each trimmed to the
/// character budget, admission stopping as soon as the running token
/// estimate would exceed `max_context_tokens`.
pub fn pack_context(
    ranked: &[RetrievalItem],
    segments: &HashMap<String, Segment>,
    max_context_tokens: usize,
) -> Vec<ContextBlock> {
    let mut seen_pages: HashSet<(String, u32)> = HashSet::new();
    let mut blocks = Vec::new();
    let mut tokens_used = 0usize;

    for item in ranked {
        let Some(segment) = segments.get(&item.segment_id) else {
            continue;
        };
        if !seen_pages.insert((segment.document_id.clone(), segment.page_no)) {
            continue;
        }

        let text = trim_to_sentence(&segment.text, CONTEXT_BLOCK_MAX_CHARS);
        if text.is_empty() {
            continue;
        }

        let estimate = estimate_tokens(&text);
        if tokens_used + estimate > max_context_tokens {
            break;
        }
        tokens_used += estimate;

        blocks.push(ContextBlock {
            segment_id: segment.id.clone(),
            document_id: segment.document_id.clone(),
            page_no: segment.page_no,
            title: item.document_title.clone(),
            text,
        });
    }

    blocks
}

/// Trims to at most `max_chars` characters, preferring to cut right after
/// the last sentence end and falling back to the last whitespace.
pub fn trim_to_sentence(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }

    let cut: String = trimmed.chars().take(max_chars).collect();
    if let Some(end) = last_sentence_end(&cut) {
        return cut[..end].trim_end().to_string();
    }

    match cut.rfind(char::is_whitespace) {
        Some(whitespace) if whitespace > 0 => cut[..whitespace].trim_end().to_string(),
        _ => cut,
    }
}

// byte index one past the last `.`/`!`/`?` in the slice
fn last_sentence_end(cut: &str) -> Option<usize> {
    let mut result = None;
    for (index, ch) in cut.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            result = Some(index + ch.len_utf8());
        }
    }
    result
}
