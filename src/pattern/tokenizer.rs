//! Pattern tokenizer
//!
//! Splits a dotted path on `.`, percent-decodes each segment and recognizes
//! typed segments written as JSON, e.g. `{"type": "entity", "value": "x"}`.
//!
//! A pattern whose last segment holds glob metacharacters asks for the
//! children of its parent path; any other pattern names one node exactly.

use serde::Deserialize;

use super::glob::has_magic;
use super::token::TokenKind;
use crate::error::{FinderError, FinderResult};

/// One segment of a path
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// As written in the path
    raw: String,
    /// Percent-decoded; the raw text for glob segments
    text: String,
    /// Declared kind of a typed segment
    kind: Option<TokenKind>,
}

#[derive(Deserialize)]
struct TypedSegment {
    #[serde(rename = "type")]
    kind: TokenKind,
    value: String,
}

impl Segment {
    fn parse(raw: &str) -> FinderResult<Self> {
        if has_magic(raw) {
            return Ok(Self {
                raw: raw.to_string(),
                text: raw.to_string(),
                kind: None,
            });
        }

        let decoded = urlencoding::decode(raw)
            .map_err(|e| FinderError::MalformedPattern(format!("segment '{}': {}", raw, e)))?;

        if decoded.starts_with('{') {
            let typed: TypedSegment = serde_json::from_str(&decoded).map_err(|e| {
                FinderError::MalformedPattern(format!("typed segment '{}': {}", decoded, e))
            })?;
            return Ok(Self {
                raw: raw.to_string(),
                text: typed.value,
                kind: Some(typed.kind),
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            text: decoded.into_owned(),
            kind: None,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> Option<TokenKind> {
        self.kind
    }

    pub fn is_glob(&self) -> bool {
        has_magic(&self.raw)
    }
}

/// Split and decode a dotted path; the empty path has no segments
pub fn tokenize(path: &str) -> FinderResult<Vec<Segment>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    path.split('.').map(Segment::parse).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// List the children of the parent path matching the last segment
    Enumerate,
    /// Return the node named by the full path
    Exact,
}

/// A find pattern split into the path to resolve and the request kind
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub pattern: String,
    pub kind: RequestKind,
    /// Parent path for enumeration, the full path otherwise
    pub segments: Vec<Segment>,
}

impl ParsedQuery {
    /// Quoted path the segments were taken from
    pub fn base_path(&self) -> String {
        self.segments
            .iter()
            .map(Segment::raw)
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Classify and tokenize a find pattern
pub fn parse_query(pattern: &str) -> FinderResult<ParsedQuery> {
    if pattern.is_empty() {
        return Err(FinderError::MalformedPattern("empty pattern".to_string()));
    }

    let (parent, last) = match pattern.rsplit_once('.') {
        Some((parent, last)) => (parent, last),
        None => ("", pattern),
    };

    if has_magic(last) {
        Ok(ParsedQuery {
            pattern: pattern.to_string(),
            kind: RequestKind::Enumerate,
            segments: tokenize(parent)?,
        })
    } else {
        Ok(ParsedQuery {
            pattern: pattern.to_string(),
            kind: RequestKind::Exact,
            segments: tokenize(pattern)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_decodes_segments() {
        let segments = tokenize("entities.n.nurswgvml007.disk%2Eused.host%3A%20a").unwrap();
        let texts: Vec<&str> = segments.iter().map(Segment::text).collect();
        assert_eq!(
            texts,
            vec!["entities", "n", "nurswgvml007", "disk.used", "host: a"]
        );
        assert_eq!(segments[3].raw(), "disk%2Eused");
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn test_typed_segment() {
        let raw = urlencoding::encode(r#"{"type": "entity folder", "value": "nur*"}"#);
        let segments = tokenize(&format!("view.{}", raw)).unwrap();

        assert_eq!(segments[1].kind(), Some(TokenKind::EntityFolder));
        assert_eq!(segments[1].text(), "nur*");
        assert_eq!(segments[0].kind(), None);
    }

    #[test]
    fn test_bad_typed_segment_is_malformed() {
        let unknown = urlencoding::encode(r#"{"type": "planet", "value": "x"}"#);
        assert!(matches!(
            tokenize(&unknown),
            Err(FinderError::MalformedPattern(_))
        ));

        let broken = urlencoding::encode(r#"{"type": "entity""#);
        assert!(matches!(
            tokenize(&broken),
            Err(FinderError::MalformedPattern(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        assert!(matches!(
            tokenize("entities.%FF"),
            Err(FinderError::MalformedPattern(_))
        ));
    }

    #[test]
    fn test_trailing_glob_enumerates_parent() {
        let query = parse_query("entities.a*").unwrap();
        assert_eq!(query.kind, RequestKind::Enumerate);
        assert_eq!(query.base_path(), "entities");

        let query = parse_query("*").unwrap();
        assert_eq!(query.kind, RequestKind::Enumerate);
        assert!(query.segments.is_empty());

        let query = parse_query("metrics.[abc]").unwrap();
        assert_eq!(query.kind, RequestKind::Enumerate);
    }

    #[test]
    fn test_literal_pattern_is_exact() {
        let query = parse_query("entities.a.e1.cpu_busy.detail").unwrap();
        assert_eq!(query.kind, RequestKind::Exact);
        assert_eq!(query.segments.len(), 5);

        let query = parse_query("entities.a*.e1").unwrap();
        assert_eq!(query.kind, RequestKind::Exact);
        assert!(query.segments[1].is_glob());
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(parse_query("").is_err());
    }
}
