use common::utils::{config::AppConfig, tokens::estimate_tokens};
use once_cell::sync::Lazy;
use regex::Regex;

/// Token window for greedy paragraph packing. A chunk closes once adding the
/// next paragraph would push it past `target_max`, but only if it already
/// holds at least `target_min` tokens; otherwise it keeps growing so that no
/// under-sized chunk is emitted mid-page.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub target_min: usize,
    pub target_max: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_min: 300,
            target_max: 700,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            target_min: config.chunk_min_tokens,
            target_max: config.chunk_max_tokens,
            overlap: config.chunk_overlap_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageChunk {
    pub index: u32,
    pub text: String,
    pub token_estimate: usize,
    pub heading_path: Option<String>,
}

static BULLET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+\.|[-*•])\s").expect("bullet pattern compiles"));

/// Heading heuristic: a short line without trailing sentence punctuation that
/// is not a list item, and is either fully upper-case or has a majority of
/// capitalized words.
fn is_heading(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || line.chars().count() > 80 {
        return false;
    }
    if line.ends_with(['.', ':', ';']) {
        return false;
    }
    if BULLET_PATTERN.is_match(line) {
        return false;
    }

    let has_alpha = line.chars().any(char::is_alphabetic);
    if has_alpha && !line.chars().any(char::is_lowercase) && line.chars().count() >= 3 {
        return true;
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    let capitalized = words
        .iter()
        .filter(|word| word.chars().next().is_some_and(char::is_uppercase))
        .count();
    capitalized >= (words.len() / 2).max(1)
}

/// Splits page text on blank lines into ordered paragraphs, collecting
/// heading-like lines on the way.
fn split_paragraphs(text: &str) -> (Vec<String>, Vec<String>) {
    let mut paragraphs = Vec::new();
    let mut headings = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();

    for line in text
        .lines()
        .map(str::trim_end)
        .chain(std::iter::once(""))
    {
        if is_heading(line) {
            headings.push(line.trim().to_string());
        }
        if line.trim().is_empty() {
            if !buffer.is_empty() {
                paragraphs.push(buffer.join("\n").trim().to_string());
                buffer.clear();
            }
        } else {
            buffer.push(line);
        }
    }

    (paragraphs, headings)
}

/// A paragraph whose estimate alone exceeds the max window is split on word
/// boundaries into max-window slices, so packing never has to accept an
/// unbounded paragraph wholesale.
fn split_oversized(paragraph: &str, target_max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;

    for word in paragraph.split_whitespace() {
        let word_tokens = estimate_tokens(word);
        if current_tokens + word_tokens > target_max && !current.is_empty() {
            pieces.push(current.join(" "));
            current.clear();
            current_tokens = 0;
        }
        current.push(word);
        current_tokens += word_tokens;
    }
    if !current.is_empty() {
        pieces.push(current.join(" "));
    }

    pieces
}

fn overlap_seed(closed_chunk: &str, overlap: usize) -> Option<String> {
    if overlap == 0 {
        return None;
    }
    let words: Vec<&str> = closed_chunk.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    let start = words.len().saturating_sub(overlap);
    Some(words[start..].join(" "))
}

/// Produces ordered chunks for one page of text. The heading path covers the
/// last two headings seen within this call and is attached identically to
/// every chunk of the page.
pub fn chunk_page_text(text: &str, config: &ChunkingConfig) -> Vec<PageChunk> {
    let (paragraphs, headings) = split_paragraphs(text);

    let mut pieces = Vec::new();
    for paragraph in paragraphs {
        if estimate_tokens(&paragraph) > config.target_max {
            pieces.extend(split_oversized(&paragraph, config.target_max));
        } else {
            pieces.push(paragraph);
        }
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;

    for piece in pieces {
        let piece_tokens = estimate_tokens(&piece);
        if current_tokens + piece_tokens <= config.target_max {
            current.push(piece);
            current_tokens += piece_tokens;
        } else if current_tokens >= config.target_min {
            let closed = current.join("\n\n").trim().to_string();
            current.clear();
            current_tokens = 0;
            if let Some(seed) = overlap_seed(&closed, config.overlap) {
                current_tokens += estimate_tokens(&seed);
                current.push(seed);
            }
            chunks.push(closed);
            current.push(piece);
            current_tokens += piece_tokens;
        } else {
            // under the min window: grow past max rather than emit a runt
            current.push(piece);
            current_tokens += piece_tokens;
        }
    }
    if !current.is_empty() {
        let closed = current.join("\n\n").trim().to_string();
        if !closed.is_empty() {
            chunks.push(closed);
        }
    }

    let heading_path = if headings.is_empty() {
        None
    } else {
        let start = headings.len().saturating_sub(2);
        Some(headings[start..].join(" > "))
    };

    chunks
        .into_iter()
        .filter(|chunk| !chunk.is_empty())
        .enumerate()
        .map(|(index, text)| {
            let token_estimate = estimate_tokens(&text);
            PageChunk {
                index: index as u32,
                text,
                token_estimate,
                heading_path: heading_path.clone(),
            }
        })
        .collect()
}
