//! Markup Tree - Span-Preserving HTML Subset Parser
//!
//! Generated markup is parsed into element and text nodes that remember
//! their byte range in the source. Edits are spliced back into the original
//! string, so anything not edited comes out byte-for-byte as it went in.
//!
//! Parsing never fails. Unterminated tags, stray end tags and lone `<`
//! characters degrade to text.

use std::borrow::Cow;
use std::ops::Range;

use quick_xml::escape::{partial_escape, unescape_with};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose content is not markup and never a visible text leaf
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element {
        tag: String,
        attributes: Vec<Attribute>,
        children: Vec<Node>,
        /// Range of the start tag
        span: Range<usize>,
    },
    Text { span: Range<usize> },
    Comment { span: Range<usize> },
    /// Doctype, processing instruction or raw-text element content
    Raw { span: Range<usize> },
}

impl Node {
    pub fn tag(&self) -> Option<&str> {
        match self {
            Node::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            Node::Element { attributes, .. } => attributes
                .iter()
                .find(|a| a.name == name)
                .map(|a| a.value.as_deref().unwrap_or("")),
            _ => None,
        }
    }
}

/// A text node in document order, borrowed from the parsed source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLeaf<'a> {
    pub raw: &'a str,
    pub span: Range<usize>,
}

impl<'a> TextLeaf<'a> {
    /// Text content with character references decoded.
    ///
    /// References that do not resolve stay literal, so a bare `&` never
    /// stops the rest of the leaf from decoding.
    pub fn text(&self) -> Cow<'a, str> {
        if !self.raw.contains('&') {
            return Cow::Borrowed(self.raw);
        }
        Cow::Owned(decode_chars(self.raw).into_iter().map(|(ch, _)| ch).collect())
    }

    /// Raw prefix that decodes to the whitespace `text().trim()` drops
    pub fn leading_whitespace(&self) -> &'a str {
        let end = decode_chars(self.raw)
            .into_iter()
            .find(|(ch, _)| !ch.is_whitespace())
            .map_or(self.raw.len(), |(_, raw)| raw.start);
        &self.raw[..end]
    }

    /// Raw suffix that decodes to trailing whitespace
    pub fn trailing_whitespace(&self) -> &'a str {
        match decode_chars(self.raw).into_iter().rev().find(|(ch, _)| !ch.is_whitespace()) {
            Some((_, raw)) => &self.raw[raw.end..],
            None => "",
        }
    }
}

/// Each decoded character with the raw byte range it came from
fn decode_chars(raw: &str) -> Vec<(char, Range<usize>)> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while let Some(ch) = raw[i..].chars().next() {
        if ch == '&' {
            if let Some(len) = reference_len(&raw[i..]) {
                if let Ok(decoded) = unescape_with(&raw[i..i + len], resolve_entity) {
                    out.extend(decoded.chars().map(|c| (c, i..i + len)));
                    i += len;
                    continue;
                }
            }
        }
        let len = ch.len_utf8();
        out.push((ch, i..i + len));
        i += len;
    }
    out
}

/// Length of a `&name;` / `&#NN;` reference at the start of `rest`
fn reference_len(rest: &str) -> Option<usize> {
    let body = rest.strip_prefix('&')?;
    let name_len = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '#'))
        .unwrap_or(body.len());
    (name_len > 0 && body[name_len..].starts_with(';')).then_some(name_len + 2)
}

#[derive(Debug, Clone)]
pub struct Document<'a> {
    source: &'a str,
    nodes: Vec<Node>,
}

impl<'a> Document<'a> {
    pub fn parse(source: &'a str) -> Self {
        let mut parser = Parser::new(source);
        parser.run();
        Self {
            source,
            nodes: parser.finish(),
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// First element in document order, skipping text, comments and doctype
    pub fn root_element(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| matches!(n, Node::Element { .. }))
    }

    /// Depth-first walk of every text leaf in document order
    pub fn text_leaves(&self) -> Vec<TextLeaf<'a>> {
        let mut out = Vec::new();
        collect_text(&self.nodes, self.source, &mut out);
        out
    }

    /// Rewrite the given ranges, copying everything else from the source.
    ///
    /// Edits must be non-overlapping; they are applied in source order.
    pub fn splice(&self, mut edits: Vec<(Range<usize>, String)>) -> String {
        edits.sort_by_key(|(range, _)| range.start);
        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for (range, replacement) in edits {
            if range.start < cursor {
                continue;
            }
            out.push_str(&self.source[cursor..range.start]);
            out.push_str(&replacement);
            cursor = range.end;
        }
        out.push_str(&self.source[cursor..]);
        out
    }
}

/// Escape replacement text for a text leaf position
pub fn escape_text(text: &str) -> Cow<'_, str> {
    partial_escape(text)
}

fn collect_text<'a>(nodes: &[Node], source: &'a str, out: &mut Vec<TextLeaf<'a>>) {
    for node in nodes {
        match node {
            Node::Text { span } => out.push(TextLeaf {
                raw: &source[span.clone()],
                span: span.clone(),
            }),
            Node::Element { children, .. } => collect_text(children, source, out),
            Node::Comment { .. } | Node::Raw { .. } => {}
        }
    }
}

fn resolve_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        "nbsp" => Some("\u{a0}"),
        "copy" => Some("\u{a9}"),
        "reg" => Some("\u{ae}"),
        "trade" => Some("\u{2122}"),
        "hellip" => Some("\u{2026}"),
        "mdash" => Some("\u{2014}"),
        "ndash" => Some("\u{2013}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        "bull" => Some("\u{2022}"),
        "middot" => Some("\u{b7}"),
        "times" => Some("\u{d7}"),
        "euro" => Some("\u{20ac}"),
        "pound" => Some("\u{a3}"),
        _ => None,
    }
}

struct OpenElement {
    tag: String,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
    span: Range<usize>,
}

impl OpenElement {
    fn into_node(self) -> Node {
        Node::Element {
            tag: self.tag,
            attributes: self.attributes,
            children: self.children,
            span: self.span,
        }
    }
}

struct StartTag {
    tag: String,
    attributes: Vec<Attribute>,
    self_closing: bool,
    end: usize,
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    stack: Vec<OpenElement>,
    root: Vec<Node>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            stack: Vec::new(),
            root: Vec::new(),
        }
    }

    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            let consumed = self.bytes[self.pos] == b'<'
                && (self.comment() || self.declaration() || self.end_tag() || self.start_tag());
            if !consumed {
                self.text();
            }
        }
    }

    fn finish(mut self) -> Vec<Node> {
        self.close_through(0);
        self.root
    }

    fn push_node(&mut self, node: Node) {
        let siblings = match self.stack.last_mut() {
            Some(open) => &mut open.children,
            None => &mut self.root,
        };
        // Adjacent text runs (e.g. around a lone '<') form one leaf
        if let (Some(Node::Text { span: last }), Node::Text { span }) = (siblings.last_mut(), &node) {
            if last.end == span.start {
                last.end = span.end;
                return;
            }
        }
        siblings.push(node);
    }

    fn close_through(&mut self, depth: usize) {
        while self.stack.len() > depth {
            if let Some(open) = self.stack.pop() {
                self.push_node(open.into_node());
            }
        }
    }

    fn find_from(&self, from: usize, needle: &str) -> Option<usize> {
        self.src.get(from..)?.find(needle).map(|i| from + i)
    }

    /// Start of the next `</tag`, tag name compared case-insensitively
    fn find_closing_tag(&self, from: usize, tag: &str) -> Option<usize> {
        let name = tag.as_bytes();
        let mut search = from;
        loop {
            let at = self.find_from(search, "</")?;
            let start = at + 2;
            let matches = self
                .bytes
                .get(start..start + name.len())
                .map_or(false, |candidate| candidate.eq_ignore_ascii_case(name));
            if matches {
                return Some(at);
            }
            search = start;
        }
    }

    fn comment(&mut self) -> bool {
        if !self.src[self.pos..].starts_with("<!--") {
            return false;
        }
        let end = self
            .find_from(self.pos + 4, "-->")
            .map_or(self.bytes.len(), |i| i + 3);
        self.push_node(Node::Comment { span: self.pos..end });
        self.pos = end;
        true
    }

    fn declaration(&mut self) -> bool {
        if !matches!(self.bytes.get(self.pos + 1), Some(b'!') | Some(b'?')) {
            return false;
        }
        let end = self
            .find_from(self.pos + 2, ">")
            .map_or(self.bytes.len(), |i| i + 1);
        self.push_node(Node::Raw { span: self.pos..end });
        self.pos = end;
        true
    }

    fn end_tag(&mut self) -> bool {
        if self.bytes.get(self.pos + 1) != Some(&b'/')
            || !self.bytes.get(self.pos + 2).map_or(false, u8::is_ascii_alphabetic)
        {
            return false;
        }
        let name_end = self.scan_name(self.pos + 2);
        let Some(gt) = self.find_from(name_end, ">") else {
            return false;
        };
        let tag = self.src[self.pos + 2..name_end].to_ascii_lowercase();
        if let Some(depth) = self.stack.iter().rposition(|open| open.tag == tag) {
            self.close_through(depth);
        }
        self.pos = gt + 1;
        true
    }

    fn start_tag(&mut self) -> bool {
        let start = self.pos;
        let Some(parsed) = self.parse_start_tag(start) else {
            return false;
        };
        let span = start..parsed.end;
        self.pos = parsed.end;

        if parsed.self_closing || VOID_ELEMENTS.contains(&parsed.tag.as_str()) {
            self.push_node(Node::Element {
                tag: parsed.tag,
                attributes: parsed.attributes,
                children: Vec::new(),
                span,
            });
            return true;
        }

        if RAW_TEXT_ELEMENTS.contains(&parsed.tag.as_str()) {
            let content_end = self
                .find_closing_tag(self.pos, &parsed.tag)
                .unwrap_or(self.bytes.len());
            let mut children = Vec::new();
            if content_end > self.pos {
                children.push(Node::Raw { span: self.pos..content_end });
            }
            self.pos = self
                .find_from(content_end, ">")
                .map_or(self.bytes.len(), |i| i + 1);
            self.push_node(Node::Element {
                tag: parsed.tag,
                attributes: parsed.attributes,
                children,
                span,
            });
            return true;
        }

        self.stack.push(OpenElement {
            tag: parsed.tag,
            attributes: parsed.attributes,
            children: Vec::new(),
            span,
        });
        true
    }

    fn parse_start_tag(&self, start: usize) -> Option<StartTag> {
        if !self.bytes.get(start + 1).map_or(false, u8::is_ascii_alphabetic) {
            return None;
        }
        let name_end = self.scan_name(start + 1);
        let tag = self.src[start + 1..name_end].to_ascii_lowercase();
        let mut attributes = Vec::new();
        let mut i = name_end;

        loop {
            i = self.skip_whitespace(i);
            match self.bytes.get(i)? {
                b'>' => {
                    return Some(StartTag { tag, attributes, self_closing: false, end: i + 1 });
                }
                b'/' if self.bytes.get(i + 1) == Some(&b'>') => {
                    return Some(StartTag { tag, attributes, self_closing: true, end: i + 2 });
                }
                b'/' => i += 1,
                _ => {
                    let name_start = i;
                    while let Some(&b) = self.bytes.get(i) {
                        if b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/') {
                            break;
                        }
                        i += 1;
                    }
                    let name = self.src[name_start..i].to_ascii_lowercase();
                    i = self.skip_whitespace(i);
                    let mut value = None;
                    if self.bytes.get(i) == Some(&b'=') {
                        i = self.skip_whitespace(i + 1);
                        match self.bytes.get(i)? {
                            &quote @ (b'"' | b'\'') => {
                                let close = self.find_from(i + 1, if quote == b'"' { "\"" } else { "'" })?;
                                value = Some(self.src[i + 1..close].to_string());
                                i = close + 1;
                            }
                            _ => {
                                let value_start = i;
                                while let Some(&b) = self.bytes.get(i) {
                                    if b.is_ascii_whitespace() || b == b'>' {
                                        break;
                                    }
                                    i += 1;
                                }
                                value = Some(self.src[value_start..i].to_string());
                            }
                        }
                    }
                    attributes.push(Attribute { name, value });
                }
            }
        }
    }

    fn text(&mut self) {
        let start = self.pos;
        let mut search = start + 1;
        let end = loop {
            match self.bytes.get(search..).and_then(|rest| rest.iter().position(|&b| b == b'<')) {
                Some(offset) => {
                    let candidate = search + offset;
                    if self.starts_markup(candidate) {
                        break candidate;
                    }
                    search = candidate + 1;
                }
                None => break self.bytes.len(),
            }
        };
        self.push_node(Node::Text { span: start..end });
        self.pos = end;
    }

    fn starts_markup(&self, i: usize) -> bool {
        match self.bytes.get(i + 1) {
            Some(b'!') | Some(b'?') => true,
            Some(b'/') => self.bytes.get(i + 2).map_or(false, u8::is_ascii_alphabetic),
            Some(b) => b.is_ascii_alphabetic(),
            None => false,
        }
    }

    fn scan_name(&self, from: usize) -> usize {
        let mut i = from;
        while let Some(&b) = self.bytes.get(i) {
            if b.is_ascii_whitespace() || matches!(b, b'/' | b'>') {
                break;
            }
            i += 1;
        }
        i
    }

    fn skip_whitespace(&self, from: usize) -> usize {
        let mut i = from;
        while self.bytes.get(i).map_or(false, u8::is_ascii_whitespace) {
            i += 1;
        }
        i
    }
}
