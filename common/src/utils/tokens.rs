use once_cell::sync::Lazy;
use regex::Regex;

// A "token" is a word run or a single non-space symbol. This is a fast proxy,
// not a subword tokenizer; every place that enforces a token budget (chunk
// packing, answer context packing) must use this same estimate so the counts
// stay comparable.
static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+|\S").expect("token pattern compiles"));

pub fn estimate_tokens(text: &str) -> usize {
    TOKEN_PATTERN.find_iter(text).count()
}
