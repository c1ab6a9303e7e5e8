//! Lightweight element lookup over captured page markup.
//!
//! Pages are scanned as a flat list of tags; an element's text content is
//! everything between its start tag and its end (explicit, implied by a
//! following start tag, or closed by an ancestor), with nested markup
//! removed and character references decoded. Comments and the bodies of
//! `script`, `style`, `template` and `textarea` are dropped before scanning.

use once_cell::sync::Lazy;
use regex::Regex;

use super::selector::Selector;

/// Comments and raw-text elements, whose contents are never elements
static NON_CONTENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<template\b.*?</template\s*>|<textarea\b.*?</textarea\s*>",
    )
    .expect("Invalid NON_CONTENT_RE regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<(/?)([A-Za-z][A-Za-z0-9-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("Invalid TAG_RE regex")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s=/"'>]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("Invalid ATTR_RE regex")
});

static ANY_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>").expect("Invalid ANY_TAG_RE regex"));

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#([0-9]{1,8})|#[xX]([0-9A-Fa-f]{1,6})|([A-Za-z]+));")
        .expect("Invalid ENTITY_RE regex")
});

/// Elements that never have content or an end tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[derive(Debug)]
struct Tag {
    name: String,
    attrs: Vec<(String, Option<String>)>,
    closing: bool,
    self_closing: bool,
    /// Byte offset of `<`
    start: usize,
    /// Byte offset just past `>`
    end: usize,
}

impl Tag {
    fn attributes(&self) -> impl Iterator<Item = (&str, Option<&str>)> + Clone {
        self.attrs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

/// A page snapshot prepared for repeated selector queries
pub struct Document {
    html: String,
    tags: Vec<Tag>,
}

impl Document {
    /// Tokenize markup into tags
    pub fn parse(markup: &str) -> Self {
        let html = NON_CONTENT_RE.replace_all(markup, "").into_owned();

        let tags = TAG_RE
            .captures_iter(&html)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(2)?.as_str().to_ascii_lowercase();
                let raw_attrs = caps.get(3).map(|m| m.as_str()).unwrap_or("");
                let self_closing = raw_attrs.trim_end().ends_with('/')
                    || VOID_ELEMENTS.contains(&name.as_str());

                Some(Tag {
                    attrs: parse_attributes(raw_attrs),
                    closing: !caps[1].is_empty(),
                    self_closing,
                    name,
                    start: whole.start(),
                    end: whole.end(),
                })
            })
            .collect();

        Self { html, tags }
    }

    /// Number of tags found in the snapshot
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Text content of every element matching `selector`, in document order
    pub fn select_text<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = String> + 'a {
        self.tags
            .iter()
            .enumerate()
            .filter(move |(_, tag)| !tag.closing && selector.matches(&tag.name, tag.attributes()))
            .map(move |(idx, _)| self.text_content(idx))
    }

    /// Text content of the first element matching `selector`
    pub fn first_text(&self, selector: &Selector) -> Option<String> {
        self.select_text(selector).next()
    }

    fn text_content(&self, open_idx: usize) -> String {
        let open = &self.tags[open_idx];
        if open.self_closing {
            return String::new();
        }

        // Elements opened inside `open` that are still unclosed
        let mut stack: Vec<&str> = Vec::new();
        let mut inner_end = self.html.len();
        for tag in &self.tags[open_idx + 1..] {
            if tag.self_closing {
                continue;
            }
            if tag.closing {
                match stack.iter().rposition(|name| *name == tag.name) {
                    Some(pos) => stack.truncate(pos),
                    // Our own end tag, or an ancestor's which closes us too
                    None => {
                        inner_end = tag.start;
                        break;
                    }
                }
                continue;
            }

            while stack
                .last()
                .is_some_and(|top| closes_implicitly(top, &tag.name))
            {
                stack.pop();
            }
            if stack.is_empty() && closes_implicitly(&open.name, &tag.name) {
                inner_end = tag.start;
                break;
            }
            stack.push(&tag.name);
        }

        let inner = &self.html[open.end..inner_end];
        decode_entities(&ANY_TAG_RE.replace_all(inner, ""))
    }
}

fn parse_attributes(raw: &str) -> Vec<(String, Option<String>)> {
    ATTR_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()));
            Some((name, value))
        })
        .collect()
}

/// Whether a `next` start tag ends an open `open` element without an end tag
fn closes_implicitly(open: &str, next: &str) -> bool {
    match open {
        "p" => matches!(
            next,
            "address" | "article" | "aside" | "blockquote" | "div" | "dl" | "fieldset"
                | "footer" | "form" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "header"
                | "hr" | "main" | "nav" | "ol" | "p" | "pre" | "section" | "table" | "ul"
        ),
        "li" => next == "li",
        "dt" | "dd" => matches!(next, "dt" | "dd"),
        "option" => matches!(next, "option" | "optgroup"),
        "tr" => next == "tr",
        "td" | "th" => matches!(next, "td" | "th" | "tr"),
        _ => false,
    }
}

/// Decode named and numeric character references in one pass.
///
/// Unknown names and invalid code points are left as written.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let decoded = if let Some(dec) = caps.get(1) {
                dec.as_str().parse::<u32>().ok().and_then(char::from_u32)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
            } else {
                caps.get(3).and_then(|name| named_entity(name.as_str()))
            };
            match decoded {
                Some('\0') | None => caps[0].to_string(),
                Some(c) => c.to_string(),
            }
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "thinsp" => '\u{2009}',
        "ensp" => '\u{2002}',
        "emsp" => '\u{2003}',
        "comma" => ',',
        "period" => '.',
        "middot" => '\u{b7}',
        _ => return None,
    };
    Some(c)
}
