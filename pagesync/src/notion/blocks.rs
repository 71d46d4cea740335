//! Maps [`Element`] trees onto Notion block JSON.
//!
//! A single Notion request accepts at most two levels of nested children, at most
//! [`MAX_BLOCKS_PER_REQUEST`] blocks in any `children` array, at most
//! [`MAX_RICH_TEXT_OBJECTS`] objects in a rich-text array and at most
//! [`MAX_RICH_TEXT_CHARS`] characters per object. Every block produced here stays
//! within those limits:
//!
//! - overlong text is split into consecutive blocks of the same type;
//! - children past the nesting limit, or past the per-array limit, follow their
//!   parent as siblings;
//! - long tables are split into several tables, and a table too deep to carry its
//!   rows is written as one paragraph per row.

use pagesync_core::element::{plain_text, Element, ListKind, PageElement, TableElement, TextRun};
use serde_json::{json, Map, Value};

use super::MAX_BLOCKS_PER_REQUEST;

/// Maximum characters in one rich-text `content`.
pub const MAX_RICH_TEXT_CHARS: usize = 2000;

/// Maximum rich-text objects in one `rich_text`, `title` or table cell array.
pub const MAX_RICH_TEXT_OBJECTS: usize = 100;

/// Deepest level at which a block may still carry inline `children`.
const MAX_NESTED_DEPTH: usize = 2;

/// Languages accepted by the code block `language` field that markdown fences
/// commonly spell differently.
static LANGUAGE_ALIASES: [(&str, &str); 12] = [
    ("sh", "shell"),
    ("zsh", "shell"),
    ("console", "shell"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("py", "python"),
    ("rs", "rust"),
    ("yml", "yaml"),
    ("md", "markdown"),
    ("golang", "go"),
];

static KNOWN_LANGUAGES: [&str; 30] = [
    "bash",
    "c",
    "c#",
    "c++",
    "css",
    "diff",
    "docker",
    "go",
    "graphql",
    "html",
    "java",
    "javascript",
    "json",
    "kotlin",
    "latex",
    "makefile",
    "markdown",
    "mermaid",
    "php",
    "plain text",
    "powershell",
    "python",
    "ruby",
    "rust",
    "scala",
    "shell",
    "sql",
    "swift",
    "typescript",
    "yaml",
];

/// The child blocks of a page body, in order.
pub fn page_to_blocks(page: &PageElement) -> Vec<Value> {
    let mut out = Vec::new();
    push_blocks(&page.children, 0, &mut out);
    out
}

/// Notion's `title` property for a page.
pub fn title_property(title: &str) -> Value {
    json!({ "title": capped_rich_text(&[TextRun::plain(title)]) })
}

/// Rich-text objects for `runs`, splitting any run longer than
/// [`MAX_RICH_TEXT_CHARS`] into consecutive objects with the same styling.
pub fn rich_text(runs: &[TextRun]) -> Vec<Value> {
    let mut out = Vec::new();
    for run in runs {
        let link = run.link.as_deref().filter(|url| is_web_url(url));
        let chars: Vec<char> = run.content.chars().collect();
        for chunk in chars.chunks(MAX_RICH_TEXT_CHARS) {
            let content: String = chunk.iter().collect();
            let mut text = json!({ "content": content });
            if let Some(url) = link {
                text["link"] = json!({ "url": url });
            }
            out.push(json!({
                "type": "text",
                "text": text,
                "annotations": {
                    "bold": run.annotations.bold,
                    "italic": run.annotations.italic,
                    "strikethrough": run.annotations.strikethrough,
                    "underline": false,
                    "code": run.annotations.code,
                    "color": "default",
                },
            }));
        }
    }
    out
}

/// Maps a fenced-code language tag onto a value Notion accepts.
pub fn code_language(language: Option<&str>) -> &'static str {
    let Some(raw) = language.map(|l| l.trim().to_ascii_lowercase()) else {
        return "plain text";
    };
    if let Some((_, mapped)) = LANGUAGE_ALIASES.iter().find(|(alias, _)| *alias == raw) {
        return *mapped;
    }
    KNOWN_LANGUAGES
        .iter()
        .find(|known| **known == raw)
        .copied()
        .unwrap_or("plain text")
}

/// Like [`rich_text`], but never longer than [`MAX_RICH_TEXT_OBJECTS`]. Styling is
/// dropped when that is what it takes to fit, and text beyond the limit is cut.
fn capped_rich_text(runs: &[TextRun]) -> Vec<Value> {
    let objects = rich_text(runs);
    if objects.len() <= MAX_RICH_TEXT_OBJECTS {
        return objects;
    }
    let mut folded = rich_text(&[TextRun::plain(plain_text(runs))]);
    if folded.len() > MAX_RICH_TEXT_OBJECTS {
        tracing::warn!(
            objects = folded.len(),
            kept = MAX_RICH_TEXT_OBJECTS,
            "Rich text exceeds the API limit, truncating"
        );
        folded.truncate(MAX_RICH_TEXT_OBJECTS);
    }
    folded
}

fn is_web_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("mailto:")
}

fn block(kind: &str, payload: Value) -> Value {
    let mut object = Map::new();
    object.insert("object".to_owned(), json!("block"));
    object.insert("type".to_owned(), json!(kind));
    object.insert(kind.to_owned(), payload);
    Value::Object(object)
}

fn paragraph(runs: &[TextRun]) -> Value {
    block("paragraph", json!({ "rich_text": capped_rich_text(runs) }))
}

/// Converts `elements` at nesting `depth`, pushing the resulting blocks onto `out`.
fn push_blocks(elements: &[Element], depth: usize, out: &mut Vec<Value>) {
    for element in elements {
        push_block(element, depth, out);
    }
}

fn push_block(element: &Element, depth: usize, out: &mut Vec<Value>) {
    match element {
        Element::Page(page) => {
            // Child pages cannot be created through the block endpoints; keep the content inline.
            let mut title = TextRun::plain(page.title.clone());
            title.annotations.bold = true;
            out.push(paragraph(&[title]));
            push_blocks(&page.children, depth, out);
        }
        Element::File(file) => {
            if is_web_url(&file.url) {
                let mut payload = json!({ "type": "external", "external": { "url": file.url } });
                if let Some(name) = &file.name {
                    payload["name"] = json!(name);
                }
                out.push(block("file", payload));
            } else {
                let label = file.name.clone().unwrap_or_else(|| file.url.clone());
                out.push(paragraph(&[TextRun::plain(label)]));
            }
        }
        Element::Text(text) => {
            let kind = match text.heading {
                Some(1) => "heading_1",
                Some(2) => "heading_2",
                Some(_) => "heading_3",
                None => "paragraph",
            };
            push_text_blocks(kind, json!({}), &text.text, &[], depth, out);
        }
        Element::Quote(quote) => push_text_blocks("quote", json!({}), &quote.text, &[], depth, out),
        Element::Code(code) => {
            let payload = json!({ "language": code_language(code.language.as_deref()) });
            let text = [TextRun::plain(code.text.clone())];
            push_text_blocks("code", payload, &text, &[], depth, out);
        }
        Element::Callout(callout) => {
            let mut payload = json!({});
            if let Some(icon) = &callout.icon {
                payload["icon"] = json!({ "type": "emoji", "emoji": icon });
            }
            push_text_blocks("callout", payload, &callout.text, &[], depth, out);
        }
        Element::Divider => out.push(block("divider", json!({}))),
        Element::Image(image) => {
            if is_web_url(&image.url) {
                let mut payload = json!({ "type": "external", "external": { "url": image.url } });
                if let Some(caption) = &image.caption {
                    payload["caption"] =
                        json!(capped_rich_text(&[TextRun::plain(caption.clone())]));
                }
                out.push(block("image", payload));
            } else {
                // Local assets are not uploaded; leave a readable reference behind.
                let label = image.caption.as_deref().unwrap_or("image");
                out.push(paragraph(&[TextRun::plain(format!("{label} ({})", image.url))]));
            }
        }
        Element::Link(link) => {
            if is_web_url(&link.url) {
                out.push(block("bookmark", json!({ "url": link.url })));
            } else {
                out.push(paragraph(&[TextRun::plain(link.text.clone())]));
            }
        }
        Element::Table(table) => push_table(table, depth, out),
        Element::ListItem(item) => {
            let (kind, payload) = match item.list {
                ListKind::Bulleted => ("bulleted_list_item", json!({})),
                ListKind::Numbered => ("numbered_list_item", json!({})),
                ListKind::Checkbox { checked } => ("to_do", json!({ "checked": checked })),
            };
            push_text_blocks(kind, payload, &item.text, &item.children, depth, out);
        }
        Element::Html(html) => {
            let text = [TextRun::plain(html.html.clone())];
            push_text_blocks("code", json!({ "language": "html" }), &text, &[], depth, out);
        }
        Element::Toggle(toggle) => {
            push_text_blocks("toggle", json!({}), &toggle.summary, &toggle.children, depth, out);
        }
        Element::Equation(equation) => {
            out.push(block("equation", json!({ "expression": equation.expression })));
        }
        Element::TableOfContents => out.push(block("table_of_contents", json!({}))),
    }
}

/// Pushes one `kind` block per [`MAX_RICH_TEXT_OBJECTS`] rich-text objects of `runs`,
/// each built on `payload`. `children` go under the last of them.
fn push_text_blocks(
    kind: &str,
    payload: Value,
    runs: &[TextRun],
    children: &[Element],
    depth: usize,
    out: &mut Vec<Value>,
) {
    let objects = rich_text(runs);
    let mut chunks: Vec<&[Value]> = objects.chunks(MAX_RICH_TEXT_OBJECTS).collect();
    let last = chunks.pop().unwrap_or_default();
    for chunk in chunks {
        let mut leading = payload.clone();
        leading["rich_text"] = json!(chunk);
        out.push(block(kind, leading));
    }
    let mut payload = payload;
    payload["rich_text"] = json!(last);
    push_with_children(kind, payload, children, depth, out);
}

/// Pushes a `kind` block carrying `children`. Children that would exceed the nesting
/// limit, and children past the first [`MAX_BLOCKS_PER_REQUEST`], follow the block
/// as siblings.
fn push_with_children(
    kind: &str,
    mut payload: Value,
    children: &[Element],
    depth: usize,
    out: &mut Vec<Value>,
) {
    if children.is_empty() {
        out.push(block(kind, payload));
        return;
    }
    if depth >= MAX_NESTED_DEPTH {
        out.push(block(kind, payload));
        push_blocks(children, depth, out);
        return;
    }

    let mut nested = Vec::new();
    push_blocks(children, depth + 1, &mut nested);
    let overflow = if nested.len() > MAX_BLOCKS_PER_REQUEST {
        nested.split_off(MAX_BLOCKS_PER_REQUEST)
    } else {
        Vec::new()
    };
    payload["children"] = Value::Array(nested);
    out.push(block(kind, payload));
    out.extend(overflow);
}

fn push_table(table: &TableElement, depth: usize, out: &mut Vec<Value>) {
    if depth >= MAX_NESTED_DEPTH {
        // Rows would sit one level too deep.
        for row in &table.rows {
            push_text_blocks("paragraph", json!({}), &row_runs(row), &[], depth, out);
        }
        return;
    }

    let width = table.width().max(1);
    let rows: Vec<Value> = table.rows.iter().map(|row| table_row(row, width)).collect();
    for (index, batch) in rows.chunks(MAX_BLOCKS_PER_REQUEST).enumerate() {
        out.push(block(
            "table",
            json!({
                "table_width": width,
                "has_column_header": table.has_header && index == 0,
                "has_row_header": false,
                "children": batch,
            }),
        ));
    }
}

fn table_row(row: &[Vec<TextRun>], width: usize) -> Value {
    let cells: Vec<Value> = (0..width)
        .map(|i| json!(row.get(i).map(|cell| capped_rich_text(cell)).unwrap_or_default()))
        .collect();
    block("table_row", json!({ "cells": cells }))
}

/// The cells of `row` as one run sequence, separated by ` | `.
fn row_runs(row: &[Vec<TextRun>]) -> Vec<TextRun> {
    let mut runs = Vec::new();
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            runs.push(TextRun::plain(" | "));
        }
        runs.extend(cell.iter().cloned());
    }
    runs
}
