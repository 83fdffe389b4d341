//! Text clean-up on both sides of a backend call.
//!
//! Outbound: markdown image references are replaced by a placeholder so
//! prompts carry no URLs. Inbound: the first reasoning block
//! (`<think>...</think>`) some models prepend is removed before parsing.

use std::sync::LazyLock;

use regex::Regex;

/// Placeholder substituted for markdown images in prompt text.
pub const IMAGE_PLACEHOLDER: &str = "[IMAGE]";

static THINK_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid regex"));

static MARKDOWN_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]+\)").expect("valid regex"));

/// Remove the first paired reasoning block. Unpaired tags are left alone.
pub fn strip_reasoning_block(raw: &str) -> String {
    THINK_BLOCK_RE.replacen(raw, 1, "").into_owned()
}

/// Replace every `![alt](url)` with [`IMAGE_PLACEHOLDER`].
pub fn replace_image_references(text: &str) -> String {
    MARKDOWN_IMAGE_RE
        .replace_all(text, IMAGE_PLACEHOLDER)
        .into_owned()
}
