use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One simple-selector component: `tag`, `.class`, `#id` or `[attr]` / `[attr="value"]`
static SELECTOR_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        (?P<tag>^[A-Za-z][A-Za-z0-9-]*)
        | \.(?P<class>[A-Za-z0-9_-]+)
        | \#(?P<id>[A-Za-z0-9_-]+)
        | \[\s*(?P<attr>[A-Za-z_:][A-Za-z0-9_:.-]*)\s*
            (?:=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^\]\s"']+))\s*)?
          \]
        "#,
    )
    .expect("Invalid SELECTOR_PART regex")
});

/// Error for selector text outside the supported subset
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("unsupported selector syntax in {selector:?} at offset {offset}")]
    Unsupported { selector: String, offset: usize },
}

/// Attribute condition of a selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrMatch {
    pub name: String,
    /// Exact value to compare against; `None` only requires presence
    pub value: Option<String>,
}

/// A compound CSS selector restricted to what balance widgets need.
///
/// Supports a leading tag name followed by any number of `.class`, `#id`
/// and attribute conditions, e.g. `span.token-balance[data-role="balance"]`.
/// Combinators and pseudo-classes are rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrMatch>,
}

impl Selector {
    /// Original selector text
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check an element's tag name and attributes against this selector
    pub fn matches<'a, I>(&self, tag: &str, attributes: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)> + Clone,
    {
        if let Some(ref want) = self.tag {
            if !want.eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        let lookup = |name: &str| {
            attributes
                .clone()
                .into_iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.unwrap_or(""))
        };

        if let Some(ref want) = self.id {
            if lookup("id") != Some(want.as_str()) {
                return false;
            }
        }

        if !self.classes.is_empty() {
            let Some(class_attr) = lookup("class") else {
                return false;
            };
            let present: Vec<&str> = class_attr.split_ascii_whitespace().collect();
            if !self.classes.iter().all(|c| present.contains(&c.as_str())) {
                return false;
            }
        }

        self.attrs.iter().all(|cond| match (lookup(&cond.name), &cond.value) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(want)) => actual == want,
        })
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(SelectorError::Empty);
        }

        let mut selector = Selector {
            raw: text.to_string(),
            tag: None,
            id: None,
            classes: Vec::new(),
            attrs: Vec::new(),
        };

        // Components must tile the whole selector with no gaps
        let mut cursor = 0;
        for caps in SELECTOR_PART.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() != cursor {
                break;
            }
            cursor = whole.end();

            if let Some(tag) = caps.name("tag") {
                selector.tag = Some(tag.as_str().to_ascii_lowercase());
            } else if let Some(class) = caps.name("class") {
                selector.classes.push(class.as_str().to_string());
            } else if let Some(id) = caps.name("id") {
                selector.id = Some(id.as_str().to_string());
            } else if let Some(attr) = caps.name("attr") {
                let value = caps
                    .name("dq")
                    .or_else(|| caps.name("sq"))
                    .or_else(|| caps.name("bare"))
                    .map(|m| m.as_str().to_string());
                selector.attrs.push(AttrMatch {
                    name: attr.as_str().to_ascii_lowercase(),
                    value,
                });
            }
        }

        if cursor != text.len() {
            return Err(SelectorError::Unsupported {
                selector: text.to_string(),
                offset: cursor,
            });
        }

        Ok(selector)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse a list of selector strings, keeping priority order
pub fn parse_selectors<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Selector>, SelectorError> {
    raw.iter().map(|s| s.as_ref().parse()).collect()
}
