//! Location extraction — finds the `MARKER: place` line in a message body
//! and corrects known misspellings.
//!
//! Pure string handling, no I/O.

use regex::Regex;

use crate::error::ConfigError;
use crate::pipeline::types::{LocationToken, NormalizedLocation};

/// Misspellings seen in real requests, mapped to the spelling the geocoder knows.
const DEFAULT_CORRECTIONS: &[(&str, &str)] = &[
    ("Zuerich", "Zürich"),
    ("Zurich", "Zürich"),
    ("Geneve", "Genève"),
    ("Neuchatel", "Neuchâtel"),
    ("St Gallen", "St. Gallen"),
    ("Graubunden", "Graubünden"),
    ("Biel Bienne", "Biel/Bienne"),
    ("Basle", "Basel"),
];

// ── Corrections table ───────────────────────────────────────────────

/// `wrong → right` substring replacements, applied in one left-to-right
/// pass. At each position the longest matching pattern wins.
///
/// A table is accepted only if no replacement can produce a pattern: a
/// replacement must be non-empty, must neither contain nor be contained in
/// any pattern, and must not overlap the start or end of any pattern. With
/// that, the output of one pass holds no pattern and applying the table
/// again changes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corrections {
    pairs: Vec<(String, String)>,
}

impl Corrections {
    pub fn new(pairs: Vec<(String, String)>) -> Result<Self, ConfigError> {
        for (i, (pattern, replacement)) in pairs.iter().enumerate() {
            if pattern.is_empty() {
                return Err(invalid("empty misspelling pattern"));
            }
            if replacement.is_empty() {
                return Err(invalid(&format!("'{pattern}' has an empty replacement")));
            }
            if pairs[..i].iter().any(|(p, _)| p == pattern) {
                return Err(invalid(&format!("pattern '{pattern}' listed twice")));
            }
        }
        for (_, replacement) in &pairs {
            if let Some((pattern, _)) = pairs
                .iter()
                .find(|(p, _)| can_produce(replacement, p))
            {
                return Err(invalid(&format!(
                    "replacement '{replacement}' can form pattern '{pattern}'"
                )));
            }
        }
        Ok(Self { pairs })
    }

    /// Parse `wrong=right;wrong=right`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut pairs = Vec::new();
        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (wrong, right) = entry
                .split_once('=')
                .ok_or_else(|| invalid(&format!("'{entry}' is not of the form wrong=right")))?;
            pairs.push((wrong.trim().to_string(), right.trim().to_string()));
        }
        Self::new(pairs)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(c) = rest.chars().next() {
            let hit = self
                .pairs
                .iter()
                .filter(|(wrong, _)| rest.starts_with(wrong.as_str()))
                .max_by_key(|(wrong, _)| wrong.len());
            match hit {
                Some((wrong, right)) => {
                    out.push_str(right);
                    rest = &rest[wrong.len()..];
                }
                None => {
                    out.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        out
    }
}

/// Whether `replacement`, placed in any surrounding text, could make
/// `pattern` appear: by containing it, by being part of it, or by a proper
/// prefix or suffix lining up with the pattern's end or start.
fn can_produce(replacement: &str, pattern: &str) -> bool {
    replacement.contains(pattern)
        || pattern.contains(replacement)
        || replacement.char_indices().skip(1).any(|(i, _)| {
            pattern.starts_with(&replacement[i..]) || pattern.ends_with(&replacement[..i])
        })
}

impl Default for Corrections {
    fn default() -> Self {
        Self {
            pairs: DEFAULT_CORRECTIONS
                .iter()
                .map(|(w, r)| (w.to_string(), r.to_string()))
                .collect(),
        }
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: "QUOTE_CORRECTIONS".to_string(),
        message: message.to_string(),
    }
}

// ── Extractor ───────────────────────────────────────────────────────

/// Finds the destination line and normalizes it.
#[derive(Debug, Clone)]
pub struct LocationExtractor {
    marker: String,
    pattern: Regex,
    corrections: Corrections,
}

impl LocationExtractor {
    pub fn new(marker: &str, corrections: Corrections) -> Result<Self, ConfigError> {
        let boundary = if marker.starts_with(|c: char| c.is_alphanumeric()) {
            r"\b"
        } else {
            ""
        };
        let pattern = Regex::new(&format!(
            r"(?i){boundary}{}[ \t]*:(.*)",
            regex::escape(marker)
        ))
        .map_err(|e| ConfigError::InvalidValue {
            key: "QUOTE_MARKER".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            marker: marker.to_string(),
            pattern,
            corrections,
        })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Text after the first `MARKER:` (any case) up to the end of that line,
    /// trimmed. Marker lines with nothing after the colon are skipped.
    pub fn extract(&self, body: &str) -> Option<LocationToken> {
        self.pattern
            .captures_iter(body)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .find(|s| !s.is_empty())
            .map(LocationToken::new)
    }

    pub fn normalize(&self, token: &LocationToken) -> NormalizedLocation {
        NormalizedLocation::new(self.corrections.apply(token.as_str()))
    }
}
