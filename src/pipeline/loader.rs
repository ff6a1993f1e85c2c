use std::borrow::Cow;
use std::fmt;

use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Result, ScraperError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Html,
    Xml,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Html => f.write_str("HTML"),
            DocumentFormat::Xml => f.write_str("XML"),
        }
    }
}

/// A parsed, read-only document tree.
pub enum Document {
    Html(Html),
    Xml(XmlElement),
}

impl Document {
    pub fn format(&self) -> DocumentFormat {
        match self {
            Document::Html(_) => DocumentFormat::Html,
            Document::Xml(_) => DocumentFormat::Xml,
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::Html(html) => f
                .debug_struct("Document::Html")
                .field("errors", &html.errors.len())
                .finish(),
            Document::Xml(root) => f.debug_tuple("Document::Xml").field(&root.name).finish(),
        }
    }
}

/// Owned XML element. `text` holds the element's own character data, in order,
/// without any descendant text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Name without any `prefix:` namespace qualifier.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Own text followed by all descendant text, depth first.
    pub fn deep_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        out.push_str(&self.text);
        for child in &self.children {
            out.push(' ');
            child.collect_text(out);
        }
    }
}

/// Parse raw markup into a document tree.
///
/// Fetching the text is the caller's business; nothing here touches the network.
#[instrument(skip(raw_text), fields(bytes = raw_text.len()))]
pub fn load(raw_text: &str, format: DocumentFormat) -> Result<Document> {
    match format {
        DocumentFormat::Html => load_html(raw_text).map(Document::Html),
        DocumentFormat::Xml => load_xml(raw_text).map(Document::Xml),
    }
}

/// Like [`load`], but first unwraps HTML comments so that tables shipped inside
/// `<!-- ... -->` (as sports-reference pages do) become part of the tree.
pub fn load_unwrapping_comments(raw_text: &str, format: DocumentFormat) -> Result<Document> {
    load(&unwrap_comments(raw_text), format)
}

pub fn unwrap_comments(raw_text: &str) -> Cow<'_, str> {
    if raw_text.contains("<!--") {
        Cow::Owned(raw_text.replace("<!--", "").replace("-->", ""))
    } else {
        Cow::Borrowed(raw_text)
    }
}

fn load_html(raw_text: &str) -> Result<Html> {
    // html5ever recovers from anything, so the only input it cannot give us a
    // meaningful tree for is one without any markup.
    if !raw_text.contains('<') {
        return Err(ScraperError::Parse {
            format: DocumentFormat::Html,
            message: "input contains no markup".to_string(),
        });
    }

    let html = Html::parse_document(raw_text);
    if !html.errors.is_empty() {
        debug!(
            "HTML parser recovered from {} error(s); first: {}",
            html.errors.len(),
            html.errors[0]
        );
    }
    Ok(html)
}

fn load_xml(raw_text: &str) -> Result<XmlElement> {
    let parse_err = |message: String| ScraperError::Parse {
        format: DocumentFormat::Xml,
        message,
    };

    let mut reader = Reader::from_str(raw_text);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            parse_err(format!("{} at byte {}", e, reader.error_position()))
        })?;

        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                stack.push(XmlElement::new(name));
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                attach(XmlElement::new(name), &mut stack, &mut root).map_err(parse_err)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| parse_err("unexpected closing tag".to_string()))?;
                attach(element, &mut stack, &mut root).map_err(parse_err)?;
            }
            Event::Text(text) => {
                let raw = std::str::from_utf8(&text)
                    .map_err(|e| parse_err(format!("invalid UTF-8 in text: {}", e)))?;
                let unescaped = quick_xml::escape::unescape(raw)
                    .map_err(|e| parse_err(format!("bad escape in text: {}", e)))?;
                push_text(&mut stack, &unescaped).map_err(parse_err)?;
            }
            Event::CData(data) => {
                let raw = std::str::from_utf8(&data)
                    .map_err(|e| parse_err(format!("invalid UTF-8 in CDATA: {}", e)))?;
                push_text(&mut stack, raw).map_err(parse_err)?;
            }
            Event::GeneralRef(reference) => {
                let name = std::str::from_utf8(&reference)
                    .map_err(|e| parse_err(format!("invalid UTF-8 in reference: {}", e)))?;
                let resolved = resolve_reference(name)
                    .ok_or_else(|| parse_err(format!("unknown entity '&{};'", name)))?;
                push_text(&mut stack, &resolved).map_err(parse_err)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(parse_err(format!(
            "unexpected end of document: <{}> is not closed",
            open.name
        )));
    }
    root.ok_or_else(|| parse_err("document has no root element".to_string()))
}

fn attach(
    element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> std::result::Result<(), String> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(format!("second root element <{}>", element.name)),
    }
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: &str) -> std::result::Result<(), String> {
    match stack.last_mut() {
        Some(current) => current.text.push_str(text),
        None if text.trim().is_empty() => {}
        None => {
            return Err(format!(
                "text outside the root element: '{}'",
                text.trim()
            ))
        }
    }
    Ok(())
}

fn resolve_reference(name: &str) -> Option<String> {
    if let Some(code) = name.strip_prefix('#') {
        let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse::<u32>().ok()?,
        };
        return char::from_u32(value).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(str::to_string)
}
