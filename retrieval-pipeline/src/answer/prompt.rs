use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::packing::ContextBlock;

pub const SYSTEM_PROMPT: &str = "You answer only from the provided CONTEXT. If the context is insufficient, \
     say so plainly. Cite every claim with a [CIT-#] marker matching the numbered \
     context block it came from. Be concise but complete, and do not use prior \
     knowledge. Don't preface answers with phrases like 'based on the context'.";

pub const STRICT_CITATION_REMINDER: &str =
    "Strictly include citations like [CIT-#] drawn from the CONTEXT blocks only.";

/// Builds the user message: every admitted context block headed by its
/// citation marker, title and page, followed by the question.
pub fn build_user_message(blocks: &[ContextBlock], query: &str, scope: Option<&str>) -> String {
    let mut lines = vec!["CONTEXT:".to_string()];
    for (position, block) in blocks.iter().enumerate() {
        lines.push(format!(
            "[CIT-{}] Title: \"{}\", Page {}",
            position + 1,
            block.title,
            block.page_no
        ));
        lines.push(block.text.clone());
        lines.push(String::new());
    }
    let context = lines.join("\n");

    let scope_hint = scope
        .map(|document_id| format!(" (scope: document {document_id})"))
        .unwrap_or_default();

    format!(
        "Answer with short paragraphs or bullet points. Do not invent facts. Always cite.\n\n{}\n\nQUESTION{}: {}",
        context.trim_end(),
        scope_hint,
        query
    )
}

static CITATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[CIT-(\d+)\]").expect("citation pattern compiles"));

/// Returns the sorted, deduplicated citation indices found in a reply.
pub fn extract_citation_indices(text: &str) -> Vec<usize> {
    let mut seen: BTreeSet<usize> = BTreeSet::new();
    for capture in CITATION_PATTERN.captures_iter(text) {
        if let Some(index) = capture.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) {
            seen.insert(index);
        }
    }
    seen.into_iter().collect()
}
