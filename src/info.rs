//! Parser for Drupal's `.info` configuration format.
//!
//! The format is INI-like and line-oriented. Whitespace is insignificant
//! outside of quoted values, quoted values may span lines, and nested
//! arrays are written with an HTTP-query-string-like key syntax:
//!
//! ```text
//! name = Views
//! description = "Create customized lists; of content"
//! dependencies[] = ctools
//! dependencies[] = token
//! regions[sidebar_first] = 'Left sidebar'
//! ```
//!
//! Parsing is deliberately forgiving: a line that does not match the
//! entry grammar contributes nothing, and there is no error channel.
//! Comment lines start with a semicolon, which is excluded from the key
//! character class, so they fall out through the same non-match path.
//!
//! The format substitutes constants used as an entire value; the
//! constant table is supplied by the caller when building the parser.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

/// Compiled pattern matching one `key = value` entry anywhere in the blob.
static ENTRY_REGEX: OnceLock<Regex> = OnceLock::new();

/// Compiled pattern splitting a compound key into bracket segments.
static SEGMENT_REGEX: OnceLock<Regex> = OnceLock::new();

fn entry_regex() -> &'static Regex {
    ENTRY_REGEX.get_or_init(|| {
        Regex::new(
            r#"(?msx)
            ^\s*                                  # start of a line, leading whitespace ignored
            (                                     # key: no equal signs, semicolons or brackets,
              (?: [^=;\[\]] | \[ [^\[\]]* \] )+?  # unless balanced and not nested
            )
            \s*=\s*                               # separator, whitespace (incl. newlines) ignored
            (?:
                " ( (?: [^"]* \\ " )* [^"]* ) "   # double-quoted, quotes escaped with a backslash
              | ' ( (?: [^']* \\ ' )* [^']* ) '   # single-quoted, same escaping rule
              | ( [^\r\n]*? )                     # bare value, runs to the end of the line
            )
            \s*$                                  # trailing whitespace ignored
            "#,
        )
        .expect("Failed to compile info entry regex")
    })
}

fn segment_regex() -> &'static Regex {
    SEGMENT_REGEX
        .get_or_init(|| Regex::new(r"\]?\[").expect("Failed to compile key segment regex"))
}

/// Key of one entry in an [`InfoNode`].
///
/// Explicit canonical-decimal segments (`key[5]`) and implicit
/// auto-indices (`key[]`) share the `Index` keyspace; everything else is
/// a `Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InfoKey {
    Name(String),
    Index(usize),
}

impl InfoKey {
    /// Classify one bracket segment. A canonical non-negative decimal
    /// (no leading zero except `"0"`) becomes an integer index so it
    /// shares a keyspace with implicit indices; anything else stays a
    /// string key.
    fn from_segment(segment: &str) -> Self {
        let canonical = segment == "0"
            || (!segment.is_empty()
                && !segment.starts_with('0')
                && segment.bytes().all(|b| b.is_ascii_digit()));
        if canonical {
            if let Ok(index) = segment.parse::<usize>() {
                return InfoKey::Index(index);
            }
        }
        InfoKey::Name(segment.to_string())
    }
}

impl fmt::Display for InfoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoKey::Name(name) => f.write_str(name),
            InfoKey::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for InfoKey {
    fn from(name: &str) -> Self {
        InfoKey::Name(name.to_string())
    }
}

impl From<usize> for InfoKey {
    fn from(index: usize) -> Self {
        InfoKey::Index(index)
    }
}

/// A parsed value: a scalar string or a nested mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoValue {
    String(String),
    Node(InfoNode),
}

impl InfoValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            InfoValue::String(s) => Some(s),
            InfoValue::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&InfoNode> {
        match self {
            InfoValue::Node(node) => Some(node),
            InfoValue::String(_) => None,
        }
    }
}

impl From<&str> for InfoValue {
    fn from(value: &str) -> Self {
        InfoValue::String(value.to_string())
    }
}

/// An insertion-ordered mapping from [`InfoKey`] to [`InfoValue`].
///
/// Keys are unique within one level; assigning to an existing key
/// overwrites in place without changing its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoNode {
    entries: IndexMap<InfoKey, InfoValue>,
}

impl InfoNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries at this level. This is also the value an
    /// implicit `[]` index resolves to at insertion time.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a string-named entry.
    pub fn get(&self, name: &str) -> Option<&InfoValue> {
        self.entries.get(&InfoKey::Name(name.to_string()))
    }

    /// Look up a numerically indexed entry.
    pub fn get_index(&self, index: usize) -> Option<&InfoValue> {
        self.entries.get(&InfoKey::Index(index))
    }

    pub fn get_key(&self, key: &InfoKey) -> Option<&InfoValue> {
        self.entries.get(key)
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&InfoKey, &InfoValue)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &InfoKey> {
        self.entries.keys()
    }

    /// Insert or overwrite. An overwritten key keeps its position.
    pub fn insert(&mut self, key: InfoKey, value: InfoValue) {
        self.entries.insert(key, value);
    }

    /// Descend into the mapping at `key`, creating it if absent and
    /// overwriting any scalar already sitting there.
    fn child_node(&mut self, key: InfoKey) -> &mut InfoNode {
        let slot = self
            .entries
            .entry(key)
            .or_insert_with(|| InfoValue::Node(InfoNode::new()));
        if !matches!(slot, InfoValue::Node(_)) {
            *slot = InfoValue::Node(InfoNode::new());
        }
        match slot {
            InfoValue::Node(node) => node,
            InfoValue::String(_) => unreachable!(),
        }
    }
}

/// Parser for the info format, carrying the constant table used for
/// whole-word value substitution.
#[derive(Debug, Clone, Default)]
pub struct InfoParser {
    constants: HashMap<String, String>,
}

impl InfoParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named constant. A value consisting solely of word
    /// characters that matches a registered name parses to the
    /// registered value instead of the literal word.
    pub fn with_constant(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.constants.insert(name.into(), value.into());
        self
    }

    /// Parse a blob of info-format text.
    ///
    /// Never fails: lines that do not match the entry grammar are
    /// skipped, and an input with no matches yields an empty root node.
    pub fn parse(&self, data: &str) -> InfoNode {
        let mut info = InfoNode::new();

        for caps in entry_regex().captures_iter(data) {
            let raw_key = match caps.get(1) {
                Some(m) => m.as_str(),
                None => continue,
            };

            // Exactly one of the three value alternatives matched.
            let value = if let Some(m) = caps.get(2) {
                strip_slashes(m.as_str())
            } else if let Some(m) = caps.get(3) {
                strip_slashes(m.as_str())
            } else {
                caps.get(4).map(|m| m.as_str().to_string()).unwrap_or_default()
            };
            let value = self.substitute_constant(value);

            // a[b][c] -> ["a", "b", "c"]; a[] -> ["a", ""].
            let mut segments: Vec<&str> =
                segment_regex().split(raw_key.trim_end_matches(']')).collect();
            let last = segments.pop().unwrap_or("");

            let mut parent = &mut info;
            for segment in segments {
                let key = if segment.is_empty() {
                    InfoKey::Index(parent.len())
                } else {
                    InfoKey::from_segment(segment)
                };
                parent = parent.child_node(key);
            }

            let key = if last.is_empty() {
                InfoKey::Index(parent.len())
            } else {
                InfoKey::from_segment(last)
            };
            parent.insert(key, InfoValue::String(value));
        }

        info
    }

    fn substitute_constant(&self, value: String) -> String {
        let word = !value.is_empty()
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if word {
            if let Some(replacement) = self.constants.get(&value) {
                return replacement.clone();
            }
        }
        value
    }
}

/// Parse info-format text with no constants registered.
pub fn parse_info_format(data: &str) -> InfoNode {
    InfoParser::new().parse(data)
}

/// Remove escaping backslashes; the character after each backslash is
/// kept literally. A trailing lone backslash is dropped.
fn strip_slashes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}
