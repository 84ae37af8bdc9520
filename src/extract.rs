//! Per-page field extraction: the identifier and the grouping key.

use regex::Regex;
use serde::Serialize;
use tracing::trace;

use crate::config::ExtractionConfig;
use crate::error::ConfigError;
use crate::logging::EXTRACT;

/// Fields pulled out of one page's text. Absent values mean "use the fallback".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedFields {
    pub identifier: Option<String>,
    pub group_key: Option<String>,
    /// Candidate key found on the page but rejected by validation.
    pub rejected_key: Option<String>,
}

impl ExtractedFields {
    pub fn new(identifier: Option<&str>, group_key: Option<&str>) -> Self {
        ExtractedFields {
            identifier: identifier.map(str::to_string),
            group_key: group_key.map(str::to_string),
            rejected_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldExtractor {
    identifier: Regex,
    group_key_line: Option<usize>,
    key_prefixes: Vec<String>,
    min_key_length: usize,
}

impl FieldExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ConfigError> {
        Ok(FieldExtractor {
            identifier: Regex::new(&config.identifier_pattern)?,
            group_key_line: config.group_key_line,
            key_prefixes: config.key_prefixes.clone(),
            min_key_length: config.min_key_length,
        })
    }

    pub fn extract(&self, page_text: &str) -> ExtractedFields {
        let identifier = self.extract_identifier(page_text);
        let (group_key, rejected_key) = match self.key_candidate(page_text) {
            Some(candidate) if self.is_valid_key(&candidate) => (Some(candidate), None),
            Some(candidate) => {
                trace!(target: EXTRACT, candidate = %candidate, "group key rejected");
                (None, Some(candidate))
            }
            None => (None, None),
        };

        ExtractedFields {
            identifier,
            group_key,
            rejected_key,
        }
    }

    pub fn extract_identifier(&self, page_text: &str) -> Option<String> {
        let captures = self.identifier.captures(page_text)?;
        let code: String = captures
            .get(1)?
            .as_str()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        (!code.is_empty()).then_some(code)
    }

    /// Leading token of the key line, plus the next character when the key
    /// wrapped and its last digit ended up after a space.
    fn key_candidate(&self, page_text: &str) -> Option<String> {
        let line = page_text.lines().nth(self.group_key_line?)?.trim_start();
        let (token, rest) = match line.find(char::is_whitespace) {
            Some(split) => line.split_at(split),
            None => (line, ""),
        };
        if token.is_empty() {
            return None;
        }

        let mut candidate = token.to_string();
        if let Some(digit) = rest.trim_start().chars().next().filter(char::is_ascii_digit) {
            candidate.push(digit);
        }
        Some(candidate)
    }

    pub fn is_valid_key(&self, candidate: &str) -> bool {
        if candidate.chars().count() < self.min_key_length {
            return false;
        }
        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if all_digits(candidate) {
            return true;
        }
        self.key_prefixes.iter().any(|prefix| {
            candidate
                .strip_prefix(prefix.as_str())
                .is_some_and(all_digits)
        })
    }
}
