//! Path quoting and shell-style matching

use crate::error::{FinderError, FinderResult};

/// Characters the front end treats as syntax inside a path
const QUOTED: &[char] = &[
    ' ', ',', ':', '?', '\'', '"', '(', ')', '[', ']', '{', '}', '<', '>', '/', '\\', '|', '*', '%',
];

/// Percent-encode a backend name so it forms exactly one path segment
pub fn metric_quote(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '.' {
            quoted.push_str("%2E");
        } else if QUOTED.contains(&c) {
            quoted.push_str(&format!("%{:02X}", c as u32));
        } else {
            quoted.push(c);
        }
    }
    quoted
}

/// Whether `segment` contains glob metacharacters
pub fn has_magic(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

/// Compiled shell-style wildcard pattern over quoted paths
#[derive(Debug, Clone)]
pub struct PathGlob(glob::Pattern);

impl PathGlob {
    pub fn new(pattern: &str) -> FinderResult<Self> {
        glob::Pattern::new(pattern)
            .map(Self)
            .map_err(|e| FinderError::MalformedPattern(format!("'{}': {}", pattern, e)))
    }

    pub fn matches(&self, path: &str) -> bool {
        self.0.matches(path)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}
