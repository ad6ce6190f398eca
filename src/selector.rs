//! Structural selectors.
//!
//! Supports the subset of CSS the catalog is written in: type selectors,
//! `#id`, `.class`, `[attr]`, `[attr="v"]`, `[attr*="v"]`, the descendant
//! combinator and comma-separated lists.

use crate::dom::{Document, NodeId};
use crate::error::SelectorError;

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    pub name: String,
    pub op: AttrOp,
}

impl AttrSelector {
    fn matches(&self, value: Option<&str>) -> bool {
        match (&self.op, value) {
            (_, None) => false,
            (AttrOp::Exists, Some(_)) => true,
            (AttrOp::Equals(expected), Some(v)) => v == expected,
            (AttrOp::Contains(needle), Some(v)) => !needle.is_empty() && v.contains(needle.as_str()),
        }
    }
}

/// One element test: optional tag, classes and attribute conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            if doc.tag(node) != tag {
                return false;
            }
        }
        self.classes.iter().all(|c| doc.has_class(node, c))
            && self.attrs.iter().all(|a| a.matches(doc.attribute(node, &a.name)))
    }
}

/// Chain of compounds joined by descendant combinators. The last compound
/// is the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    compounds: Vec<Compound>,
    source: String,
}

impl Selector {
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some((subject, context)) = self.compounds.split_last() else {
            return false;
        };
        if !subject.matches(doc, node) {
            return false;
        }
        // Descendant-only chains can be satisfied greedily by the nearest
        // matching ancestor for each remaining compound.
        let mut remaining = context.iter().rev().peekable();
        for ancestor in doc.ancestors(node) {
            match remaining.peek() {
                Some(compound) if compound.matches(doc, ancestor) => {
                    remaining.next();
                }
                Some(_) => {}
                None => break,
            }
        }
        remaining.peek().is_none()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let source = s.trim();
        let compounds = split_outside_brackets(source, |c| c.is_whitespace())
            .into_iter()
            .map(|part| parse_compound(part, source))
            .collect::<Result<Vec<_>, _>>()?;
        if compounds.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self {
            compounds,
            source: source.to_string(),
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Union of selectors; an element matches if any member matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<Selector>,
}

impl SelectorList {
    pub fn parse_all<'a>(sources: impl IntoIterator<Item = &'a str>) -> Result<Self, SelectorError> {
        let mut list = Self::default();
        for source in sources {
            list.selectors.extend(source.parse::<SelectorList>()?.selectors);
        }
        Ok(list)
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.selectors.iter().any(|s| s.matches(doc, node))
    }

    pub fn union(&self, other: &SelectorList) -> SelectorList {
        let mut selectors = self.selectors.clone();
        for s in &other.selectors {
            if !selectors.contains(s) {
                selectors.push(s.clone());
            }
        }
        SelectorList { selectors }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selector> {
        self.selectors.iter()
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

impl FromStr for SelectorList {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let selectors = split_outside_brackets(s, |c| c == ',')
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if selectors.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { selectors })
    }
}

/// Split on `is_sep` while outside `[...]` and quotes. Empty pieces are dropped.
fn split_outside_brackets(s: &str, is_sep: impl Fn(char) -> bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if depth == 0 && is_sep(c) => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(part: &str, selector: &str) -> Result<Compound, SelectorError> {
    let unexpected = |found: char, offset: usize| SelectorError::Unexpected {
        selector: selector.to_string(),
        found,
        offset,
    };
    let chars: Vec<(usize, char)> = part.char_indices().collect();
    let mut pos = 0;
    let mut compound = Compound::default();

    let take_ident = |pos: &mut usize| -> String {
        let mut ident = String::new();
        while let Some((_, c)) = chars.get(*pos) {
            if !is_ident_char(*c) {
                break;
            }
            ident.push(*c);
            *pos += 1;
        }
        ident
    };

    if let Some((_, '*')) = chars.first() {
        pos += 1;
    } else {
        let tag = take_ident(&mut pos);
        if !tag.is_empty() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
    }

    while let Some(&(offset, c)) = chars.get(pos) {
        match c {
            '.' => {
                pos += 1;
                let class = take_ident(&mut pos);
                if class.is_empty() {
                    return Err(unexpected(c, offset));
                }
                compound.classes.push(class);
            }
            '#' => {
                pos += 1;
                let id = take_ident(&mut pos);
                if id.is_empty() {
                    return Err(unexpected(c, offset));
                }
                compound.attrs.push(AttrSelector {
                    name: "id".to_string(),
                    op: AttrOp::Equals(id),
                });
            }
            '[' => {
                pos += 1;
                let name = take_ident(&mut pos);
                if name.is_empty() {
                    return Err(match chars.get(pos) {
                        Some(&(o, f)) => unexpected(f, o),
                        None => SelectorError::Unterminated(selector.to_string()),
                    });
                }
                let op = match chars.get(pos).map(|(_, c)| *c) {
                    Some(']') => AttrOp::Exists,
                    Some('=') => {
                        pos += 1;
                        AttrOp::Equals(take_value(&chars, &mut pos, selector)?)
                    }
                    Some('*') if matches!(chars.get(pos + 1), Some((_, '='))) => {
                        pos += 2;
                        AttrOp::Contains(take_value(&chars, &mut pos, selector)?)
                    }
                    Some(other) => return Err(unexpected(other, chars[pos].0)),
                    None => return Err(SelectorError::Unterminated(selector.to_string())),
                };
                match chars.get(pos) {
                    Some((_, ']')) => pos += 1,
                    Some(&(o, f)) => return Err(unexpected(f, o)),
                    None => return Err(SelectorError::Unterminated(selector.to_string())),
                }
                compound.attrs.push(AttrSelector { name, op });
            }
            other => return Err(unexpected(other, offset)),
        }
    }

    Ok(compound)
}

fn take_value(chars: &[(usize, char)], pos: &mut usize, selector: &str) -> Result<String, SelectorError> {
    let mut value = String::new();
    match chars.get(*pos).map(|(_, c)| *c) {
        Some(q @ ('"' | '\'')) => {
            *pos += 1;
            loop {
                match chars.get(*pos) {
                    Some((_, c)) if *c == q => {
                        *pos += 1;
                        return Ok(value);
                    }
                    Some((_, c)) => {
                        value.push(*c);
                        *pos += 1;
                    }
                    None => return Err(SelectorError::Unterminated(selector.to_string())),
                }
            }
        }
        _ => {
            while let Some((_, c)) = chars.get(*pos) {
                if !is_ident_char(*c) {
                    break;
                }
                value.push(*c);
                *pos += 1;
            }
            Ok(value)
        }
    }
}
