//! Table-of-contents rendering into a DOCX template
//!
//! Templates use `{name}` tags and `{#name}…{/name}` loops. Where a loop
//! repeats depends on where its tags sit:
//! - both tags in one paragraph: the enclosed text is repeated
//! - tags in different cells of one table row: the whole row is repeated
//! - each tag alone in its own paragraph: the paragraphs between them are
//!   repeated and the tag paragraphs are dropped
//! - otherwise: every paragraph from the opening to the closing one is
//!   repeated
//!
//! Tags may be split across several runs. The text of a paragraph holding a
//! tag is gathered into its first text node, so run formatting inside such a
//! paragraph is not kept. Paragraphs nested in text boxes are separate
//! paragraphs. Line breaks in values become `<w:br/>`.
//!
//! Only `word/document.xml` and the header and footer parts are rendered.
//! Every other archive entry is copied unchanged.

use std::borrow::Cow;
use std::io::{Cursor, Read, Write};
use std::ops::Range;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::catalog::Catalog;
use crate::error::{Error, Result};

const MAIN_PART: &str = "word/document.xml";

/// Renders a [`Catalog`] into a template document
pub trait CatalogRenderer {
    fn render(&self, template: &[u8], catalog: &Catalog) -> Result<Vec<u8>>;
}

/// [`CatalogRenderer`] for Word `.docx` templates
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxTemplate;

impl CatalogRenderer for DocxTemplate {
    fn render(&self, template: &[u8], catalog: &Catalog) -> Result<Vec<u8>> {
        render_docx(template, &catalog.to_value())
    }
}

/// Render `data` into every templated part of the DOCX in `template`
pub fn render_docx(template: &[u8], data: &Value) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(template))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let mut has_main_part = false;

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let name = file.name().to_string();

        if file.is_dir() {
            writer.add_directory(name, options)?;
            continue;
        }

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if is_templated_part(&name) {
            has_main_part |= name == MAIN_PART;
            let xml = String::from_utf8(bytes)
                .map_err(|e| Error::Template(format!("{name} is not valid UTF-8: {e}")))?;
            bytes = render_xml(&xml, data)
                .map_err(|e| match e {
                    Error::Template(msg) => Error::Template(format!("{name}: {msg}")),
                    other => other,
                })?
                .into_bytes();
            tracing::debug!(part = %name, "rendered template part");
        }

        writer.start_file(name, options)?;
        writer.write_all(&bytes)?;
    }

    if !has_main_part {
        return Err(Error::Template(format!("template has no {MAIN_PART}")));
    }

    Ok(writer.finish()?.into_inner())
}

fn is_templated_part(name: &str) -> bool {
    name == MAIN_PART
        || ((name.starts_with("word/header") || name.starts_with("word/footer")) && name.ends_with(".xml"))
}

/// Render one XML part
fn render_xml(xml: &str, data: &Value) -> Result<String> {
    let part = PartTemplate::parse(xml)?;
    let mut writer = Writer::new(Vec::new());
    let mut scopes = vec![data];
    part.render_range(0..part.tokens.len(), &mut scopes, &mut Vec::new(), &mut writer)?;
    String::from_utf8(writer.into_inner()).map_err(|e| Error::Template(format!("rendered XML is not UTF-8: {e}")))
}

/// Piece of a part after tags have been cut out of the text nodes
#[derive(Debug, Clone)]
enum Token {
    Xml(Event<'static>),
    Text(String),
    Tag(String),
    /// Loop opening tag and the text node it came from
    Open(String, usize),
    Close(String, usize),
}

/// Token ranges one loop covers
#[derive(Debug, Clone)]
struct Loop {
    name: String,
    /// Everything the loop replaces
    outer: Range<usize>,
    /// What is rendered once per item
    body: Range<usize>,
}

#[derive(Debug)]
struct PartTemplate {
    tokens: Vec<Token>,
    loops: Vec<Loop>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Element {
    Paragraph(usize),
    Row(usize),
    Cell(usize),
    Text,
    Other,
}

/// Start and end event of one element
#[derive(Debug, Clone, Copy, Default)]
struct Span {
    start: usize,
    end: usize,
}

/// A `<w:t>` text event and the structure around it
#[derive(Debug, Clone, Copy)]
struct TextNode {
    event: usize,
    open_tag: usize,
    paragraph: usize,
    row: Option<usize>,
    cell: Option<usize>,
}

/// Paragraphs, table rows, cells and text nodes of a part
#[derive(Debug, Default)]
struct Outline {
    paragraphs: Vec<Span>,
    rows: Vec<Span>,
    cells: Vec<Span>,
    texts: Vec<TextNode>,
}

impl Outline {
    fn scan(events: &[Event<'static>]) -> Result<Self> {
        let mut outline = Outline::default();
        let mut stack: Vec<(usize, Element)> = Vec::new();
        let mut paragraphs: Vec<usize> = Vec::new();
        let mut rows: Vec<usize> = Vec::new();
        let mut cells: Vec<usize> = Vec::new();

        for (index, event) in events.iter().enumerate() {
            match event {
                Event::Start(e) => {
                    let element = match e.name().as_ref() {
                        b"w:p" => {
                            paragraphs.push(outline.paragraphs.len());
                            outline.paragraphs.push(Span { start: index, end: index });
                            Element::Paragraph(outline.paragraphs.len() - 1)
                        }
                        b"w:tr" => {
                            rows.push(outline.rows.len());
                            outline.rows.push(Span { start: index, end: index });
                            Element::Row(outline.rows.len() - 1)
                        }
                        b"w:tc" => {
                            cells.push(outline.cells.len());
                            outline.cells.push(Span { start: index, end: index });
                            Element::Cell(outline.cells.len() - 1)
                        }
                        b"w:t" => Element::Text,
                        _ => Element::Other,
                    };
                    stack.push((index, element));
                }
                Event::End(_) => {
                    let (_, element) = stack
                        .pop()
                        .ok_or_else(|| Error::Template("unexpected closing tag".to_string()))?;
                    match element {
                        Element::Paragraph(id) => {
                            outline.paragraphs[id].end = index;
                            paragraphs.pop();
                        }
                        Element::Row(id) => {
                            outline.rows[id].end = index;
                            rows.pop();
                        }
                        Element::Cell(id) => {
                            outline.cells[id].end = index;
                            cells.pop();
                        }
                        Element::Text | Element::Other => {}
                    }
                }
                Event::Text(_) => {
                    if let (Some(&(open_tag, Element::Text)), Some(&paragraph)) = (stack.last(), paragraphs.last()) {
                        outline.texts.push(TextNode {
                            event: index,
                            open_tag,
                            paragraph,
                            row: rows.last().copied(),
                            cell: cells.last().copied(),
                        });
                    }
                }
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(Error::Template("unclosed element".to_string()));
        }
        Ok(outline)
    }
}

impl PartTemplate {
    fn parse(xml: &str) -> Result<Self> {
        let events = read_events(xml)?;
        let outline = Outline::scan(&events)?;

        // Text of each node, then of each paragraph
        let mut contents = outline
            .texts
            .iter()
            .map(|node| match &events[node.event] {
                Event::Text(text) => Ok(text.unescape()?.into_owned()),
                _ => Ok(String::new()),
            })
            .collect::<Result<Vec<String>>>()?;
        let mut paragraph_text = vec![String::new(); outline.paragraphs.len()];
        for (node, content) in outline.texts.iter().zip(&contents) {
            paragraph_text[node.paragraph].push_str(content);
        }

        // Gather the text of paragraphs holding tags into their first node
        let mut node_of_event = vec![None; events.len()];
        let mut preserve = vec![false; events.len()];
        let mut gathered = vec![false; outline.paragraphs.len()];
        for (n, node) in outline.texts.iter().enumerate() {
            node_of_event[node.event] = Some(n);
            let text = &paragraph_text[node.paragraph];
            if !text.contains('{') {
                continue;
            }
            if gathered[node.paragraph] {
                contents[n].clear();
            } else {
                gathered[node.paragraph] = true;
                contents[n] = text.clone();
                preserve[node.open_tag] = true;
            }
        }

        let mut tokens = Vec::with_capacity(events.len());
        let mut event_token = Vec::with_capacity(events.len());
        for (index, event) in events.into_iter().enumerate() {
            event_token.push(tokens.len());
            match node_of_event[index] {
                Some(n) => tokens.extend(split_tags(&contents[n], n)?),
                None if preserve[index] => tokens.push(Token::Xml(Event::Start(preserved_text_tag()))),
                None => tokens.push(Token::Xml(event)),
            }
        }

        let token_span = |span: Span| event_token[span.start]..event_token[span.end] + 1;

        let mut loops = Vec::new();
        let mut open: Vec<(usize, &str, usize)> = Vec::new();
        for (index, token) in tokens.iter().enumerate() {
            match token {
                Token::Open(name, node) => open.push((index, name.as_str(), *node)),
                Token::Close(name, node) => {
                    let name = name.as_str();
                    let (start, open_name, open_node) = open
                        .pop()
                        .ok_or_else(|| Error::Template(format!("{{/{name}}} without matching {{#{name}}}")))?;
                    if open_name != name {
                        return Err(Error::Template(format!("{{/{name}}} closes {{#{open_name}}}")));
                    }

                    let first = &outline.texts[open_node];
                    let last = &outline.texts[*node];
                    let (outer, body) = if first.paragraph == last.paragraph {
                        (start..index + 1, start + 1..index)
                    } else if first.row.is_some() && first.row == last.row && first.cell != last.cell {
                        let row = first.row.map(|id| token_span(outline.rows[id])).unwrap_or_default();
                        (row.clone(), row)
                    } else {
                        let opening = token_span(outline.paragraphs[first.paragraph]);
                        let closing = token_span(outline.paragraphs[last.paragraph]);
                        let alone = loop_marker(&paragraph_text[first.paragraph]) == Some(Marker::Open(name))
                            && loop_marker(&paragraph_text[last.paragraph]) == Some(Marker::Close(name));
                        if alone {
                            (opening.start..closing.end, opening.end..closing.start)
                        } else {
                            (opening.start..closing.end, opening.start..closing.end)
                        }
                    };

                    if !whole_elements(&tokens[body.clone()]) || !whole_elements(&tokens[outer.clone()]) {
                        return Err(Error::Template(format!(
                            "loop {{#{name}}} does not enclose whole paragraphs or table rows"
                        )));
                    }
                    loops.push(Loop {
                        name: name.to_string(),
                        outer,
                        body,
                    });
                }
                _ => {}
            }
        }
        if let Some((_, name, _)) = open.pop() {
            return Err(Error::Template(format!("unclosed loop {{#{name}}}")));
        }

        for (i, a) in loops.iter().enumerate() {
            for b in &loops[i + 1..] {
                let disjoint = a.outer.end <= b.outer.start || b.outer.end <= a.outer.start;
                let nested = contains(&a.outer, &b.outer) || contains(&b.outer, &a.outer);
                if !disjoint && !nested {
                    return Err(Error::Template(format!(
                        "loops {{#{}}} and {{#{}}} overlap",
                        a.name, b.name
                    )));
                }
            }
        }

        Ok(Self { tokens, loops })
    }

    /// Loop replacing the tokens from `index` on, outermost first
    fn loop_at(&self, index: usize, active: &[usize]) -> Option<usize> {
        self.loops
            .iter()
            .enumerate()
            .filter(|(id, l)| l.outer.start == index && !active.contains(id))
            .max_by_key(|(_, l)| l.outer.end)
            .map(|(id, _)| id)
    }

    fn render_range<'a>(
        &self,
        range: Range<usize>,
        scopes: &mut Vec<&'a Value>,
        active: &mut Vec<usize>,
        out: &mut Writer<Vec<u8>>,
    ) -> Result<()> {
        let mut index = range.start;
        while index < range.end {
            if let Some(id) = self.loop_at(index, active) {
                let current = &self.loops[id];
                active.push(id);
                for item in loop_items(lookup(scopes, &current.name)) {
                    scopes.push(item);
                    self.render_range(current.body.clone(), scopes, active, out)?;
                    scopes.pop();
                }
                active.pop();
                index = current.outer.end;
                continue;
            }

            match &self.tokens[index] {
                Token::Xml(event) => out.write_event(event)?,
                Token::Text(text) => out.write_event(Event::Text(BytesText::new(text)))?,
                Token::Tag(tag) => write_value(out, &display_value(lookup(scopes, tag), tag))?,
                // Tags of the loops being expanded
                Token::Open(..) | Token::Close(..) => {}
            }
            index += 1;
        }
        Ok(())
    }
}

fn read_events(xml: &str) -> Result<Vec<Event<'static>>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut events = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            event => events.push(event.into_owned()),
        }
        buf.clear();
    }
    Ok(events)
}

fn preserved_text_tag() -> BytesStart<'static> {
    let mut start = BytesStart::new("w:t");
    start.push_attribute(("xml:space", "preserve"));
    start
}

/// Write a value inside an open `<w:t>`, one `<w:br/>` per line break
fn write_value(out: &mut Writer<Vec<u8>>, value: &str) -> Result<()> {
    for (n, line) in value.split('\n').enumerate() {
        if n > 0 {
            out.write_event(Event::End(BytesEnd::new("w:t")))?;
            out.write_event(Event::Empty(BytesStart::new("w:br")))?;
            out.write_event(Event::Start(preserved_text_tag()))?;
        }
        out.write_event(Event::Text(BytesText::new(line.trim_end_matches('\r'))))?;
    }
    Ok(())
}

/// Start and end tags in `tokens` pair up
fn whole_elements(tokens: &[Token]) -> bool {
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::Xml(Event::Start(_)) => depth += 1,
            Token::Xml(Event::End(_)) => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }
    depth == 0
}

fn contains(outer: &Range<usize>, inner: &Range<usize>) -> bool {
    outer.start <= inner.start && inner.end <= outer.end
}

/// Cut `{…}` tags out of the text of node `node`
fn split_tags(text: &str, node: usize) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        if open > 0 {
            tokens.push(Token::Text(rest[..open].to_string()));
        }
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| Error::Template(format!("unclosed tag in \"{text}\"")))?;
        let tag = after[..close].trim();
        tokens.push(if let Some(name) = tag.strip_prefix('#') {
            Token::Open(name.trim().to_string(), node)
        } else if let Some(name) = tag.strip_prefix('/') {
            Token::Close(name.trim().to_string(), node)
        } else {
            Token::Tag(tag.to_string())
        });
        rest = &after[close + 1..];
    }

    if !rest.is_empty() {
        tokens.push(Token::Text(rest.to_string()));
    }
    Ok(tokens)
}

#[derive(Debug, PartialEq)]
enum Marker<'x> {
    Open(&'x str),
    Close(&'x str),
}

/// `{#name}` or `{/name}` standing alone in a paragraph
fn loop_marker(text: &str) -> Option<Marker<'_>> {
    let tag = text.trim().strip_prefix('{')?.strip_suffix('}')?.trim();
    if tag.contains(['{', '}']) {
        return None;
    }
    if let Some(name) = tag.strip_prefix('#') {
        Some(Marker::Open(name.trim()))
    } else {
        tag.strip_prefix('/').map(|name| Marker::Close(name.trim()))
    }
}

/// Resolve a (possibly dotted) name against the innermost scope that has it
///
/// `.` is the current item itself.
fn lookup<'a>(scopes: &[&'a Value], name: &str) -> Option<&'a Value> {
    if name == "." {
        return scopes.last().copied();
    }
    let mut keys = name.split('.');
    let first = keys.next()?;
    let mut value = scopes.iter().rev().find_map(|scope| scope.get(first))?;
    for key in keys {
        value = value.get(key)?;
    }
    Some(value)
}

fn loop_items(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(value) if is_truthy(value) => vec![value],
        _ => Vec::new(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn display_value<'v>(value: Option<&'v Value>, tag: &str) -> Cow<'v, str> {
    match value {
        Some(Value::String(s)) => Cow::Borrowed(s.as_str()),
        Some(Value::Number(n)) => Cow::Owned(n.to_string()),
        Some(Value::Bool(b)) => Cow::Owned(b.to_string()),
        Some(Value::Null) => Cow::Borrowed(""),
        Some(_) => {
            tracing::warn!(tag, "template tag refers to a list or object, rendering it empty");
            Cow::Borrowed("")
        }
        None => {
            tracing::warn!(tag, "no value for template tag, rendering it empty");
            Cow::Borrowed("")
        }
    }
}
