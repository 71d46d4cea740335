//! # element: format-agnostic document content tree
//!
//! The intermediate representation between a [`Converter`](crate::contract::Converter)
//! and a [`Destination`](crate::contract::Destination). Every node kind is a variant
//! of [`Element`], serialized with a `type` discriminator so the whole tree can be
//! dumped as JSON for debugging.
//!
//! Only [`Element::Page`] may be handed to a destination for page creation; every
//! other kind lives inside a page's `children`.

use serde::{Deserialize, Serialize};

/// A node of the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Element {
    Page(PageElement),
    File(FileElement),
    Text(TextElement),
    Quote(QuoteElement),
    Code(CodeElement),
    Callout(CalloutElement),
    Divider,
    Image(ImageElement),
    Link(LinkElement),
    Table(TableElement),
    ListItem(ListItemElement),
    Html(HtmlElement),
    Toggle(ToggleElement),
    Equation(EquationElement),
    TableOfContents,
}

impl Element {
    /// The discriminator as it appears in serialized form.
    pub fn kind(&self) -> &'static str {
        match self {
            Element::Page(_) => "page",
            Element::File(_) => "file",
            Element::Text(_) => "text",
            Element::Quote(_) => "quote",
            Element::Code(_) => "code",
            Element::Callout(_) => "callout",
            Element::Divider => "divider",
            Element::Image(_) => "image",
            Element::Link(_) => "link",
            Element::Table(_) => "table",
            Element::ListItem(_) => "list-item",
            Element::Html(_) => "html",
            Element::Toggle(_) => "toggle",
            Element::Equation(_) => "equation",
            Element::TableOfContents => "table-of-contents",
        }
    }

    /// Unwraps a page, handing the element back when it is any other kind.
    pub fn into_page(self) -> Result<PageElement, Element> {
        match self {
            Element::Page(page) => Ok(page),
            other => Err(other),
        }
    }

    /// Plain paragraph built from a single unstyled run.
    pub fn paragraph(content: impl Into<String>) -> Self {
        Element::Text(TextElement {
            text: vec![TextRun::plain(content)],
            heading: None,
        })
    }
}

/// Root content node: the full body of one destination page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageElement {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub children: Vec<Element>,
    /// Ordered name/value pairs forwarded to the destination as page properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<(String, String)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl PageElement {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_children(mut self, children: Vec<Element>) -> Self {
        self.children = children;
        self
    }
}

/// Inline styling of a [`TextRun`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
}

impl Annotations {
    pub fn is_plain(&self) -> bool {
        *self == Annotations::default()
    }
}

/// A contiguous run of identically styled text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub content: String,
    #[serde(default, skip_serializing_if = "Annotations::is_plain")]
    pub annotations: Annotations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl TextRun {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            annotations: Annotations::default(),
            link: None,
        }
    }
}

/// Concatenated content of a rich-text sequence, without styling.
pub fn plain_text(runs: &[TextRun]) -> String {
    runs.iter().map(|r| r.content.as_str()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileElement {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Paragraph, or heading when `heading` is set (1 to 3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    pub text: Vec<TextRun>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteElement {
    pub text: Vec<TextRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalloutElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub text: Vec<TextRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageElement {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkElement {
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableElement {
    pub has_header: bool,
    /// Rows of cells; every cell is a rich-text sequence.
    pub rows: Vec<Vec<Vec<TextRun>>>,
}

impl TableElement {
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ListKind {
    Bulleted,
    Numbered,
    Checkbox { checked: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItemElement {
    pub list: ListKind,
    pub text: Vec<TextRun>,
    #[serde(default)]
    pub children: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlElement {
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleElement {
    pub summary: Vec<TextRun>,
    #[serde(default)]
    pub children: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquationElement {
    pub expression: String,
}
