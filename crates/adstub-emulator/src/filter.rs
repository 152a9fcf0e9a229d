//! Restricted search filter grammar.
//!
//! Only an optional `(&...)` wrapper around single-attribute clauses `(attribute=value)` is
//! understood. Values may use `*` wildcards; `\XX` hex escapes stand for literal bytes, so an
//! escaped `\2a` never acts as a wildcard. Anything else parses to [`DirectoryQuery::Unresolved`].

use crate::Result;
use adstub_core::Error;
use regex::Regex;
use std::fmt;
use tracing::{debug, warn};

const SAM_ACCOUNT_NAME: &str = "sAMAccountName";
const USER_PRINCIPAL_NAME: &str = "userPrincipalName";
const OBJECT_CATEGORY: &str = "objectCategory";
const GROUP_CATEGORY: &str = "group";
const COMMON_NAME: &str = "cn";

/// How a clause value is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// No wildcard: exact string equality.
    Equality,
    /// The value is a lone `*`: any value matches.
    Presence,
    /// At least one `*` around literal text.
    Wildcard,
}

/// Anchored wildcard pattern where `*` matches any run of characters, including none.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    source: String,
    segments: Vec<String>,
    regex: Regex,
}

impl WildcardPattern {
    /// Compiles a raw filter value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when the pattern cannot be compiled.
    pub fn new(raw: &str) -> Result<Self> {
        let segments = split_wildcards(raw);
        let body = segments
            .iter()
            .map(|segment| regex::escape(segment))
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("(?s)^{body}$"))
            .map_err(|err| Error::InvalidRequest(format!("invalid filter value `{raw}`: {err}")))?;

        Ok(Self {
            source: raw.to_string(),
            segments,
            regex,
        })
    }

    /// The raw value the pattern was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Classifies the comparison this pattern performs.
    #[must_use]
    pub fn kind(&self) -> MatchKind {
        match self.segments.as_slice() {
            [_] => MatchKind::Equality,
            [first, second] if first.is_empty() && second.is_empty() => MatchKind::Presence,
            _ => MatchKind::Wildcard,
        }
    }

    /// The unescaped value for equality patterns.
    #[must_use]
    pub fn literal(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [single] => Some(single),
            _ => None,
        }
    }

    /// Returns true if `candidate` matches the whole pattern (case-sensitive).
    #[must_use]
    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

impl PartialEq for WildcardPattern {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for WildcardPattern {}

impl fmt::Display for WildcardPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Single `(attribute=value)` assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    attribute: String,
    value: String,
}

impl Clause {
    /// Parses the text between a clause's parentheses.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let (attribute, value) = text.split_once('=')?;
        let attribute = attribute.trim();
        let valid_attribute = !attribute.is_empty()
            && attribute
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | ';' | '.'));
        if !valid_attribute || value.contains(['(', ')']) {
            return None;
        }

        Some(Self {
            attribute: attribute.to_string(),
            value: value.to_string(),
        })
    }

    /// Attribute name as written in the filter.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Raw value as written in the filter.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true if the clause is on `attribute` (case-insensitive).
    #[must_use]
    pub fn is_on(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }

    /// Compiles the value into a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when the value cannot be compiled.
    pub fn pattern(&self) -> Result<WildcardPattern> {
        WildcardPattern::new(&self.value)
    }
}

/// Parsed filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// A bare `(attribute=value)`.
    Clause(Clause),
    /// `(&(...)(...))`; clauses that do not parse are dropped.
    And(Vec<Clause>),
}

impl Filter {
    /// Parses a filter string; `None` when no attribute clause can be recovered.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let inner = input.trim().strip_prefix('(')?.strip_suffix(')')?;

        if let Some(body) = inner.strip_prefix('&') {
            let clauses = top_level_groups(body)?
                .into_iter()
                .filter_map(|group| {
                    let clause = Clause::parse(group);
                    if clause.is_none() {
                        debug!(clause = group, "ignoring unsupported filter clause");
                    }
                    clause
                })
                .collect::<Vec<_>>();
            return (!clauses.is_empty()).then_some(Self::And(clauses));
        }

        Clause::parse(inner).map(Self::Clause)
    }

    /// Clauses in filter order.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        match self {
            Self::Clause(clause) => std::slice::from_ref(clause),
            Self::And(clauses) => clauses,
        }
    }

    /// Works out what the filter asks the directory for.
    ///
    /// Group queries win over identity queries when both markers are present.
    #[must_use]
    pub fn query(&self) -> DirectoryQuery {
        let clauses = self.clauses();

        let is_group_query = clauses.iter().any(|clause| {
            clause.is_on(OBJECT_CATEGORY) && clause.value().eq_ignore_ascii_case(GROUP_CATEGORY)
        });
        if is_group_query {
            return clauses
                .iter()
                .find(|clause| clause.is_on(COMMON_NAME))
                .map_or(DirectoryQuery::Unresolved, |clause| DirectoryQuery::Group {
                    name: unescape_value(clause.value()),
                });
        }

        for clause in clauses {
            let value = if clause.is_on(SAM_ACCOUNT_NAME) {
                clause.value()
            } else if clause.is_on(USER_PRINCIPAL_NAME) {
                clause
                    .value()
                    .split_once('@')
                    .map_or(clause.value(), |(local, _)| local)
            } else {
                continue;
            };

            return match WildcardPattern::new(value) {
                Ok(pattern) => DirectoryQuery::Identity {
                    attribute: clause.attribute().to_string(),
                    pattern,
                },
                Err(err) => {
                    warn!("unusable identity clause: {err}");
                    DirectoryQuery::Unresolved
                }
            };
        }

        DirectoryQuery::Unresolved
    }
}

/// Target of a search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryQuery {
    /// Users whose username matches the pattern.
    Identity {
        /// Attribute the pattern came from (`sAMAccountName` or `userPrincipalName`).
        attribute: String,
        /// Username pattern; a `userPrincipalName` value is cut at `@`.
        pattern: WildcardPattern,
    },
    /// A group looked up by short name.
    Group {
        /// Group short name.
        name: String,
    },
    /// Nothing the emulator can answer.
    Unresolved,
}

impl DirectoryQuery {
    /// Parses and classifies a filter string.
    #[must_use]
    pub fn from_filter(filter: &str) -> Self {
        Filter::parse(filter).map_or(Self::Unresolved, |parsed| parsed.query())
    }
}

/// Splits `body` into the contents of its top-level parenthesised groups.
fn top_level_groups(body: &str) -> Option<Vec<&str>> {
    let mut groups = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0;

    for (index, ch) in body.char_indices() {
        match ch {
            '(' => {
                if depth == 0 {
                    start = index + 1;
                }
                depth += 1;
            }
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    groups.push(&body[start..index]);
                }
            }
            ch if depth == 0 && !ch.is_whitespace() => return None,
            _ => {}
        }
    }

    (depth == 0).then_some(groups)
}

/// Splits a raw value on unescaped `*`, decoding `\XX` escapes in each segment.
fn split_wildcards(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    let bytes = raw.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'*' => {
                segments.push(String::from_utf8_lossy(&current).into_owned());
                current.clear();
                index += 1;
            }
            b'\\' => match decode_hex_pair(bytes.get(index + 1..index + 3)) {
                Some(byte) => {
                    current.push(byte);
                    index += 3;
                }
                None => {
                    current.push(b'\\');
                    index += 1;
                }
            },
            byte => {
                current.push(byte);
                index += 1;
            }
        }
    }

    segments.push(String::from_utf8_lossy(&current).into_owned());
    segments
}

fn decode_hex_pair(pair: Option<&[u8]>) -> Option<u8> {
    let pair = std::str::from_utf8(pair?).ok()?;
    u8::from_str_radix(pair, 16).ok()
}

fn unescape_value(raw: &str) -> String {
    split_wildcards(raw).join("*")
}
