//! Markdown/HTML realization of [`Converter`], built on `pulldown-cmark`.
//!
//! Markdown is mapped block by block onto [`Element`]s. The first level-1
//! heading becomes the page title and is dropped from the body; without one the
//! file name is used. HTML documents are passed through as a single
//! [`Element::Html`].

use std::sync::Mutex;

use pulldown_cmark::{
    BlockQuoteKind, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd,
};
use tracing::debug;

use crate::contract::{CollaboratorError, Converter, File};
use crate::element::{
    Annotations, CalloutElement, CodeElement, Element, EquationElement, HtmlElement,
    ImageElement, LinkElement, ListItemElement, ListKind, PageElement, QuoteElement,
    TableElement, TextElement, TextRun,
};
use crate::site_map::SEPARATOR;

/// Converts markdown and html source files into page elements.
#[derive(Debug, Default)]
pub struct MarkdownConverter {
    current_file_path: Mutex<Option<String>>,
}

impl MarkdownConverter {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_file_path(&self) -> Option<String> {
        self.current_file_path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Converter for MarkdownConverter {
    fn set_current_file_path(&self, path: &str) {
        *self
            .current_file_path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(path.to_owned());
    }

    fn convert_to_element(&self, file: &File) -> Result<Element, CollaboratorError> {
        let base = self.current_file_path().unwrap_or_else(|| file.path.clone());
        let mut page = match file.extension.as_str() {
            "html" | "htm" => PageElement::new(file.name.clone()).with_children(vec![
                Element::Html(HtmlElement {
                    html: file.content.clone(),
                }),
            ]),
            _ => markdown_to_page(&file.content, &file.name, Some(&base)),
        };
        page.icon = file.icon.clone();
        debug!(
            path = %file.path,
            title = %page.title,
            blocks = page.children.len(),
            "Converted source file"
        );
        Ok(Element::Page(page))
    }
}

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_GFM
        | Options::ENABLE_MATH
        | Options::ENABLE_YAML_STYLE_METADATA_BLOCKS
}

/// Parses `markdown` into a page. `base_path` is the source path used to resolve
/// relative image URLs.
pub fn markdown_to_page(markdown: &str, fallback_title: &str, base_path: Option<&str>) -> PageElement {
    let mut builder = PageBuilder::new(base_path);
    for event in Parser::new_ext(markdown, parser_options()) {
        builder.event(event);
    }
    builder.finish(fallback_title)
}

/// Resolves `url` against the directory of `base_path` unless it is absolute.
pub fn resolve_relative_url(url: &str, base_path: Option<&str>) -> String {
    let is_absolute = url.contains("://") || url.starts_with("data:") || url.starts_with('/');
    let Some(base) = base_path.filter(|_| !is_absolute) else {
        return url.to_owned();
    };

    let mut segments: Vec<&str> = base.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
    segments.pop();
    for part in url.split(SEPARATOR) {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join(&SEPARATOR.to_string())
}

fn heading_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn alert_icon(kind: BlockQuoteKind) -> &'static str {
    match kind {
        BlockQuoteKind::Note => "ℹ️",
        BlockQuoteKind::Tip => "💡",
        BlockQuoteKind::Important => "❗",
        BlockQuoteKind::Warning => "⚠️",
        BlockQuoteKind::Caution => "🛑",
    }
}

/// Open container collecting block elements.
enum Frame {
    Root(Vec<Element>),
    Quote {
        kind: Option<BlockQuoteKind>,
        children: Vec<Element>,
    },
    Item {
        list: ListKind,
        text: Vec<TextRun>,
        children: Vec<Element>,
    },
}

impl Frame {
    fn children_mut(&mut self) -> &mut Vec<Element> {
        match self {
            Frame::Root(children) => children,
            Frame::Quote { children, .. } => children,
            Frame::Item { children, .. } => children,
        }
    }
}

#[derive(Default)]
struct TableState {
    rows: Vec<Vec<Vec<TextRun>>>,
    row: Vec<Vec<TextRun>>,
}

struct PageBuilder<'a> {
    base_path: Option<&'a str>,
    frames: Vec<Frame>,
    /// `true` for each open ordered list.
    lists: Vec<bool>,
    runs: Vec<TextRun>,
    bold: usize,
    italic: usize,
    strikethrough: usize,
    link: Option<String>,
    title: Option<String>,
    code: Option<(Option<String>, String)>,
    html: Option<String>,
    table: Option<TableState>,
    image: Option<(String, String)>,
    in_metadata: bool,
}

impl<'a> PageBuilder<'a> {
    fn new(base_path: Option<&'a str>) -> Self {
        Self {
            base_path,
            frames: vec![Frame::Root(Vec::new())],
            lists: Vec::new(),
            runs: Vec::new(),
            bold: 0,
            italic: 0,
            strikethrough: 0,
            link: None,
            title: None,
            code: None,
            html: None,
            table: None,
            image: None,
            in_metadata: false,
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => self.push_run(&code, true),
            Event::InlineMath(math) => self.push_run(&math, false),
            Event::DisplayMath(math) => {
                self.flush_inline();
                self.push_element(Element::Equation(EquationElement {
                    expression: math.trim().to_owned(),
                }));
            }
            Event::Html(html) => match &mut self.html {
                Some(buf) => buf.push_str(&html),
                None => self.push_element(Element::Html(HtmlElement {
                    html: html.into_string(),
                })),
            },
            Event::InlineHtml(html) => self.push_run(&html, false),
            Event::SoftBreak => self.push_run(" ", false),
            Event::HardBreak => self.push_run("\n", false),
            Event::Rule => {
                self.flush_inline();
                self.push_element(Element::Divider);
            }
            Event::TaskListMarker(checked) => {
                if let Some(Frame::Item { list, .. }) = self.frames.last_mut() {
                    *list = ListKind::Checkbox { checked };
                }
            }
            Event::FootnoteReference(label) => self.push_run(&format!("[^{label}]"), false),
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph | Tag::Heading { .. } | Tag::Table(_) => self.flush_inline(),
            Tag::BlockQuote(kind) => {
                self.flush_inline();
                self.frames.push(Frame::Quote {
                    kind,
                    children: Vec::new(),
                });
            }
            Tag::CodeBlock(kind) => {
                self.flush_inline();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_owned),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some((language, String::new()));
            }
            Tag::HtmlBlock => {
                self.flush_inline();
                self.html = Some(String::new());
            }
            Tag::List(start) => {
                self.flush_inline();
                self.lists.push(start.is_some());
            }
            Tag::Item => {
                self.flush_inline();
                let list = if self.lists.last().copied().unwrap_or(false) {
                    ListKind::Numbered
                } else {
                    ListKind::Bulleted
                };
                self.frames.push(Frame::Item {
                    list,
                    text: Vec::new(),
                    children: Vec::new(),
                });
            }
            Tag::TableHead | Tag::TableRow => {
                if let Some(table) = &mut self.table {
                    table.row.clear();
                } else {
                    self.table = Some(TableState::default());
                }
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strikethrough += 1,
            Tag::Link { dest_url, .. } => self.link = Some(dest_url.into_string()),
            Tag::Image { dest_url, .. } => {
                self.flush_inline();
                self.image = Some((resolve_relative_url(&dest_url, self.base_path), String::new()));
            }
            Tag::MetadataBlock(_) => self.in_metadata = true,
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.flush_inline(),
            TagEnd::Heading(level) => {
                let runs = std::mem::take(&mut self.runs);
                let level = heading_number(level);
                if level == 1 && self.title.is_none() && self.frames.len() == 1 {
                    self.title = Some(crate::element::plain_text(&runs).trim().to_owned());
                } else if !runs.is_empty() {
                    self.push_element(Element::Text(TextElement {
                        text: runs,
                        heading: Some(level.min(3)),
                    }));
                }
            }
            TagEnd::BlockQuote(..) => {
                self.flush_inline();
                if let Some(Frame::Quote { kind, children }) = self.frames.pop() {
                    self.close_quote(kind, children);
                }
            }
            TagEnd::CodeBlock => {
                if let Some((language, text)) = self.code.take() {
                    self.push_element(Element::Code(CodeElement {
                        language,
                        text: text.trim_end_matches('\n').to_owned(),
                    }));
                }
            }
            TagEnd::HtmlBlock => {
                if let Some(html) = self.html.take() {
                    self.push_element(Element::Html(HtmlElement {
                        html: html.trim_end().to_owned(),
                    }));
                }
            }
            TagEnd::List(_) => {
                self.lists.pop();
            }
            TagEnd::Item => {
                self.flush_inline();
                if let Some(Frame::Item {
                    list,
                    text,
                    children,
                }) = self.frames.pop()
                {
                    self.push_element(Element::ListItem(ListItemElement {
                        list,
                        text,
                        children,
                    }));
                }
            }
            TagEnd::TableCell => {
                let cell = std::mem::take(&mut self.runs);
                if let Some(table) = &mut self.table {
                    table.row.push(cell);
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                if let Some(table) = &mut self.table {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.push_element(Element::Table(TableElement {
                        has_header: true,
                        rows: table.rows,
                    }));
                }
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strikethrough = self.strikethrough.saturating_sub(1),
            TagEnd::Link => self.link = None,
            TagEnd::Image => {
                if let Some((url, caption)) = self.image.take() {
                    self.push_element(Element::Image(ImageElement {
                        url,
                        caption: (!caption.is_empty()).then_some(caption),
                    }));
                }
            }
            TagEnd::MetadataBlock(_) => self.in_metadata = false,
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_metadata {
            return;
        }
        if let Some((_, buf)) = &mut self.code {
            buf.push_str(text);
            return;
        }
        if let Some(buf) = &mut self.html {
            buf.push_str(text);
            return;
        }
        if let Some((_, caption)) = &mut self.image {
            caption.push_str(text);
            return;
        }
        self.push_run(text, false);
    }

    fn push_run(&mut self, content: &str, code: bool) {
        if let Some((_, caption)) = &mut self.image {
            caption.push_str(content);
            return;
        }
        let annotations = Annotations {
            bold: self.bold > 0,
            italic: self.italic > 0,
            strikethrough: self.strikethrough > 0,
            code,
        };
        match self.runs.last_mut() {
            Some(last) if last.annotations == annotations && last.link == self.link => {
                last.content.push_str(content);
            }
            _ => self.runs.push(TextRun {
                content: content.to_owned(),
                annotations,
                link: self.link.clone(),
            }),
        }
    }

    fn push_element(&mut self, element: Element) {
        if let Some(frame) = self.frames.last_mut() {
            frame.children_mut().push(element);
        }
    }

    /// Emits pending inline runs as a paragraph, or as the text of the open list item.
    fn flush_inline(&mut self) {
        if self.runs.iter().all(|r| r.content.trim().is_empty()) {
            self.runs.clear();
            return;
        }
        let runs = std::mem::take(&mut self.runs);

        if let Some(Frame::Item { text, .. }) = self.frames.last_mut() {
            if text.is_empty() {
                *text = runs;
                return;
            }
        }

        let lone_link = match runs.as_slice() {
            [TextRun {
                content,
                link: Some(url),
                ..
            }] => Some((url.clone(), content.clone())),
            _ => None,
        };
        let element = match lone_link {
            Some((url, text)) => Element::Link(LinkElement { url, text }),
            None => Element::Text(TextElement {
                text: runs,
                heading: None,
            }),
        };
        self.push_element(element);
    }

    fn close_quote(&mut self, kind: Option<BlockQuoteKind>, children: Vec<Element>) {
        let mut text: Vec<TextRun> = Vec::new();
        let mut rest = Vec::new();
        for child in children {
            match child {
                Element::Text(paragraph) => {
                    if !text.is_empty() {
                        text.push(TextRun::plain("\n"));
                    }
                    text.extend(paragraph.text);
                }
                other => rest.push(other),
            }
        }

        let quote = match kind {
            Some(kind) => Element::Callout(CalloutElement {
                icon: Some(alert_icon(kind).to_owned()),
                text,
            }),
            None => Element::Quote(QuoteElement { text }),
        };
        self.push_element(quote);
        for element in rest {
            self.push_element(element);
        }
    }

    fn finish(mut self, fallback_title: &str) -> PageElement {
        self.flush_inline();
        while self.frames.len() > 1 {
            match self.frames.pop() {
                Some(Frame::Quote { kind, children }) => self.close_quote(kind, children),
                Some(Frame::Item {
                    list,
                    text,
                    children,
                }) => self.push_element(Element::ListItem(ListItemElement {
                    list,
                    text,
                    children,
                })),
                _ => {}
            }
        }

        let children = match self.frames.pop() {
            Some(Frame::Root(children)) => children,
            _ => Vec::new(),
        };
        let title = self
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title.to_owned());
        PageElement::new(title).with_children(children)
    }
}
