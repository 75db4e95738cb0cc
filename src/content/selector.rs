//! Minimal CSS selector matching over a captured [`Document`].
//!
//! Supports what the extraction heuristics need: tag, `.class`, `#id`,
//! `[attr]`, `[attr="v"]`, `[attr*="v"]`, the descendant combinator and
//! comma-separated selector lists.

use crate::dom::{Document, NodeId};

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Class(String),
    Id(String),
    HasAttr(String),
    AttrEquals(String, String),
    AttrContains(String, String),
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Compound {
    tag: Option<String>,
    conditions: Vec<Condition>,
}

/// One complex selector: compounds joined by descendant combinators.
#[derive(Debug, Clone, PartialEq)]
struct Complex(Vec<Compound>);

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector(Vec<Complex>);

impl Selector {
    /// Parse a selector list. Returns `None` on syntax the matcher does not
    /// understand.
    pub fn parse(input: &str) -> Option<Self> {
        let list = input
            .split(',')
            .map(|part| {
                let compounds = split_compounds(part.trim())?
                    .iter()
                    .map(|c| parse_compound(c))
                    .collect::<Option<Vec<_>>>()?;
                if compounds.is_empty() {
                    None
                } else {
                    Some(Complex(compounds))
                }
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Selector(list))
    }

    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        self.0.iter().any(|complex| complex.matches(doc, id))
    }

    /// Matching descendants of `scope` in document order (`querySelectorAll`).
    pub fn query_all(&self, doc: &Document, scope: NodeId) -> Vec<NodeId> {
        doc.descendants(scope)
            .into_iter()
            .filter(|id| self.matches(doc, *id))
            .collect()
    }

    /// First matching descendant of `scope` (`querySelector`).
    pub fn query(&self, doc: &Document, scope: NodeId) -> Option<NodeId> {
        doc.descendants(scope)
            .into_iter()
            .find(|id| self.matches(doc, *id))
    }
}

impl Complex {
    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let Some((last, ancestors)) = self.0.split_last() else {
            return false;
        };
        if !last.matches(doc, id) {
            return false;
        }

        // Greedy right-to-left ancestor matching.
        let mut pending = ancestors.iter().rev().peekable();
        let mut current = doc.parent(id);
        while let Some(compound) = pending.peek() {
            let Some(node) = current else {
                return false;
            };
            if compound.matches(doc, node) {
                pending.next();
            }
            current = doc.parent(node);
        }
        true
    }
}

impl Compound {
    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let Some(el) = doc.element(id) else {
            return false;
        };

        if let Some(tag) = &self.tag {
            if !el.is_tag(tag) {
                return false;
            }
        }

        self.conditions.iter().all(|condition| match condition {
            Condition::Class(class) => el
                .attr("class")
                .is_some_and(|value| value.split_whitespace().any(|c| c == class)),
            Condition::Id(expected) => el.attr("id") == Some(expected.as_str()),
            Condition::HasAttr(name) => el.has_attr(name),
            Condition::AttrEquals(name, value) => el.attr(name) == Some(value.as_str()),
            Condition::AttrContains(name, value) => {
                el.attr(name).is_some_and(|v| v.contains(value.as_str()))
            }
        })
    }
}

/// Split on whitespace outside of `[...]`.
fn split_compounds(input: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match ch {
            '"' | '\'' if in_brackets => {
                match quote {
                    Some(q) if q == ch => quote = None,
                    None => quote = Some(ch),
                    _ => {}
                }
                current.push(ch);
            }
            '[' if quote.is_none() => {
                in_brackets = true;
                current.push(ch);
            }
            ']' if quote.is_none() => {
                in_brackets = false;
                current.push(ch);
            }
            c if c.is_whitespace() && !in_brackets => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if in_brackets || quote.is_some() {
        return None;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    Some(parts)
}

fn parse_compound(input: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut chars = input.chars().peekable();

    let tag: String = std::iter::from_fn(|| chars.next_if(|c| is_ident_char(*c))).collect();
    if tag.is_empty() {
        // universal selector
        let _ = chars.next_if_eq(&'*');
    } else {
        compound.tag = Some(tag);
    }

    while let Some(ch) = chars.next() {
        match ch {
            '.' | '#' => {
                let name: String =
                    std::iter::from_fn(|| chars.next_if(|c| is_ident_char(*c))).collect();
                if name.is_empty() {
                    return None;
                }
                compound.conditions.push(if ch == '.' {
                    Condition::Class(name)
                } else {
                    Condition::Id(name)
                });
            }
            '[' => {
                let body: String = std::iter::from_fn(|| chars.next_if(|c| *c != ']')).collect();
                chars.next_if_eq(&']')?;
                compound.conditions.push(parse_attribute(&body)?);
            }
            _ => return None,
        }
    }

    Some(compound)
}

fn parse_attribute(body: &str) -> Option<Condition> {
    let unquote = |v: &str| {
        let v = v.trim();
        v.strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| v.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(v)
            .to_string()
    };

    if let Some((name, value)) = body.split_once("*=") {
        return Some(Condition::AttrContains(name.trim().to_string(), unquote(value)));
    }
    if let Some((name, value)) = body.split_once('=') {
        return Some(Condition::AttrEquals(name.trim().to_string(), unquote(value)));
    }

    let name = body.trim();
    if name.is_empty() {
        None
    } else {
        Some(Condition::HasAttr(name.to_string()))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ElementSpec;
    use crate::geometry::Viewport;

    fn fixture() -> (Document, NodeId) {
        let mut doc = Document::new(Viewport::default());
        let body = doc.body().unwrap();
        doc.append(
            body,
            ElementSpec::new("header").child(
                ElementSpec::new("span")
                    .attr("title", "Alice")
                    .attr("class", "name bold"),
            ),
        );
        doc.append(
            body,
            ElementSpec::new("div")
                .attr("id", "content")
                .child(ElementSpec::new("h1").attr("class", "title").text("Video"))
                .child(ElementSpec::new("p").attr("data-testid", "tweetText"))
                .child(ElementSpec::new("div").attr("class", "message-in row")),
        );
        (doc, body)
    }

    fn count(selector: &str) -> usize {
        let (doc, body) = fixture();
        Selector::parse(selector)
            .unwrap()
            .query_all(&doc, body)
            .len()
    }

    #[test]
    fn test_simple_selectors() {
        assert_eq!(count("header"), 1);
        assert_eq!(count("#content"), 1);
        assert_eq!(count(".title"), 1);
        assert_eq!(count("h1.title"), 1);
        assert_eq!(count("h2.title"), 0);
        assert_eq!(count("[title]"), 1);
        assert_eq!(count("[data-testid=\"tweetText\"]"), 1);
        assert_eq!(count("[class*=\"message\"]"), 1);
        assert_eq!(count(".message"), 0);
    }

    #[test]
    fn test_descendant_and_lists() {
        assert_eq!(count("header span[title]"), 1);
        assert_eq!(count("#content span"), 0);
        assert_eq!(count("body #content h1"), 1);
        assert_eq!(count("h1.title, header, .missing"), 2);
    }

    #[test]
    fn test_query_returns_document_order() {
        let (doc, body) = fixture();
        let first = Selector::parse("h1, header").unwrap().query(&doc, body).unwrap();
        assert!(doc.element(first).unwrap().is_tag("header"));
    }

    #[test]
    fn test_rejects_unsupported_syntax() {
        assert!(Selector::parse("a > b").is_none());
        assert!(Selector::parse("[unterminated").is_none());
        assert!(Selector::parse("div:hover").is_none());
    }
}
