//! Error-signature patterns and line classification.
//!
//! A [`PatternSet`] is compiled once at startup from a pattern document and
//! shared read-only by the monitor. Pattern order is priority order:
//! [`PatternSet::classify`] returns the first pattern that matches.
//!
//! ## Document format
//!
//! ```json
//! {
//!   "patterns": [
//!     { "name": "OOMKilled", "regex": "oom", "severity": "critical" },
//!     { "name": "CrashLoop", "regex": "back-off restarting", "severity": "error" }
//!   ]
//! }
//! ```
//!
//! The same document may also be embedded in a Kubernetes `ConfigMap`
//! manifest; [`PatternSet::load`] extracts the JSON object from it.

use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WatchError};
use crate::types::Severity;

/// An uncompiled pattern as it appears in the pattern document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDefinition {
    /// Signature name, used in alerts and cooldown keys.
    pub name: String,
    /// Regular expression, matched case-insensitively anywhere in a line.
    pub regex: String,
    /// Severity reported when the signature matches.
    #[serde(default)]
    pub severity: Severity,
}

impl PatternDefinition {
    /// Creates a definition.
    #[must_use]
    pub fn new(name: impl Into<String>, regex: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            regex: regex.into(),
            severity,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PatternDocument {
    patterns: Vec<PatternDefinition>,
}

/// A compiled error signature.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    /// Signature name.
    pub name: String,
    /// Compiled, case-insensitive matcher.
    pub regex: Regex,
    /// Severity of the signature.
    pub severity: Severity,
}

impl PatternSpec {
    /// Compiles a definition.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidPattern`] if the name is empty or the
    /// regex does not compile.
    pub fn compile(def: &PatternDefinition) -> Result<Self> {
        if def.name.trim().is_empty() {
            return Err(WatchError::InvalidPattern {
                name: def.name.clone(),
                reason: "pattern name cannot be empty".to_string(),
            });
        }

        let regex = RegexBuilder::new(&def.regex)
            .case_insensitive(true)
            .build()
            .map_err(|e| WatchError::InvalidPattern {
                name: def.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: def.name.clone(),
            regex,
            severity: def.severity,
        })
    }

    /// Returns true if the pattern matches anywhere in `line`.
    #[must_use]
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

/// An ordered, immutable set of compiled patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<PatternSpec>,
}

impl PatternSet {
    /// Compiles definitions in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`WatchError::InvalidPattern`] encountered.
    pub fn compile(defs: &[PatternDefinition]) -> Result<Self> {
        let patterns = defs
            .iter()
            .map(PatternSpec::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Parses and compiles a JSON pattern document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or a pattern is invalid.
    pub fn from_json(content: &str) -> Result<Self> {
        let doc: PatternDocument = serde_json::from_str(content)?;
        Self::compile(&doc.patterns)
    }

    /// Loads the pattern document at `path`.
    ///
    /// Accepts either a bare JSON document or a manifest (such as a
    /// `ConfigMap`) with the JSON object embedded in it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read, holds no
    /// JSON object, or fails to parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WatchError::Config(format!(
                "failed to read pattern file '{}': {e}",
                path.display()
            ))
        })?;

        let json = extract_json_object(&content).ok_or_else(|| {
            WatchError::Config(format!(
                "pattern file '{}' contains no JSON document",
                path.display()
            ))
        })?;

        let set = Self::from_json(json)?;
        debug!(path = %path.display(), patterns = set.len(), "loaded patterns");
        Ok(set)
    }

    /// Returns the first pattern matching `line`, or `None`.
    ///
    /// Blank and whitespace-only lines never match.
    #[must_use]
    pub fn classify(&self, line: &str) -> Option<&PatternSpec> {
        if line.trim().is_empty() {
            return None;
        }
        self.patterns.iter().find(|p| p.is_match(line))
    }

    /// Returns every pattern matching `line`, in priority order.
    #[must_use]
    pub fn matches(&self, line: &str) -> Vec<&PatternSpec> {
        if line.trim().is_empty() {
            return Vec::new();
        }
        self.patterns.iter().filter(|p| p.is_match(line)).collect()
    }

    /// Returns the patterns in priority order.
    #[must_use]
    pub fn patterns(&self) -> &[PatternSpec] {
        &self.patterns
    }

    /// Returns the number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true if there are no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Returns the span from the first `{` to the last `}`.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}
