//! # equality: coarse content comparison of destination blocks
//!
//! Blocks are compared through a text projection: the plain-text runs of the
//! rich-text-bearing kinds are space-joined, everything else projects to `""`.
//! Styling and, beyond what the text captures, the block kind are ignored.
//!
//! The synchronisation engine always creates pages and never consults this
//! module. It is exposed as a [`BlockComparator`] so an incremental mode can
//! plug in a policy of its choosing.

use serde_json::Value;

/// A destination block in its wire form.
pub type Block = Value;

/// Block kinds whose rich text takes part in the projection.
pub const TEXT_BEARING_KINDS: [&str; 9] = [
    "paragraph",
    "heading_1",
    "heading_2",
    "heading_3",
    "bulleted_list_item",
    "numbered_list_item",
    "to_do",
    "toggle",
    "callout",
];

/// Space-joined plain text of `block`, or `""` for absent and unrecognized blocks.
pub fn normalize_block(block: Option<&Block>) -> String {
    let Some(block) = block else {
        return String::new();
    };
    let Some(kind) = block.get("type").and_then(Value::as_str) else {
        return String::new();
    };
    if !TEXT_BEARING_KINDS.contains(&kind) {
        return String::new();
    }

    block
        .get(kind)
        .and_then(|payload| payload.get("rich_text"))
        .and_then(Value::as_array)
        .map(|runs| runs.iter().filter_map(run_text).collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

fn run_text(run: &Value) -> Option<&str> {
    run.get("plain_text")
        .and_then(Value::as_str)
        .or_else(|| run.pointer("/text/content").and_then(Value::as_str))
}

/// True when both blocks project to the same text.
pub fn is_block_equals(a: Option<&Block>, b: Option<&Block>) -> bool {
    normalize_block(a) == normalize_block(b)
}

/// Pluggable equality policy for deciding whether a block needs rewriting.
pub trait BlockComparator: Send + Sync {
    fn equals(&self, a: Option<&Block>, b: Option<&Block>) -> bool;
}

/// The default policy: [`is_block_equals`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TextProjection;

impl BlockComparator for TextProjection {
    fn equals(&self, a: Option<&Block>, b: Option<&Block>) -> bool {
        is_block_equals(a, b)
    }
}
