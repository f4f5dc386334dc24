//! Named regex families shared by the request validator and the XSS detector.
//!
//! A family is a name, a severity and a list of case-insensitive expressions.
//! Scanning a text reports every family with at least one hit and the highest
//! severity among them.

use regex::Regex;
use std::collections::BTreeSet;

use crate::domain::value_objects::Severity;

/// A named group of expressions sharing one severity
#[derive(Debug, Clone)]
pub struct PatternFamily {
    pub name: &'static str,
    pub severity: Severity,
    patterns: Vec<Regex>,
}

impl PatternFamily {
    /// Compile a family from constant sources.
    ///
    /// # Panics
    /// Panics if a source is not a valid regular expression.
    pub fn new(name: &'static str, severity: Severity, sources: &[&str]) -> Self {
        let patterns = sources
            .iter()
            .map(|source| {
                Regex::new(&format!("(?i){source}"))
                    .unwrap_or_else(|e| panic!("invalid pattern in family {name}: {e}"))
            })
            .collect();
        Self { name, severity, patterns }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(text))
    }
}

/// A family that matched somewhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyMatch {
    pub family: &'static str,
    pub severity: Severity,
}

/// Result of scanning one or more texts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub matches: Vec<FamilyMatch>,
}

impl ScanReport {
    pub fn detected(&self) -> bool {
        !self.matches.is_empty()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.matches.iter().map(|m| m.severity).max()
    }

    pub fn families(&self) -> BTreeSet<&'static str> {
        self.matches.iter().map(|m| m.family).collect()
    }

    pub fn push(&mut self, family: &'static str, severity: Severity) {
        self.matches.push(FamilyMatch { family, severity });
    }

    pub fn merge(&mut self, other: ScanReport) {
        self.matches.extend(other.matches);
    }
}

/// An ordered table of pattern families
#[derive(Debug, Clone)]
pub struct PatternSet {
    families: Vec<PatternFamily>,
}

impl PatternSet {
    pub fn new(families: Vec<PatternFamily>) -> Self {
        Self { families }
    }

    /// Report every family matching `text`
    pub fn scan(&self, text: &str) -> ScanReport {
        let mut report = ScanReport::default();
        for family in &self.families {
            if family.is_match(text) {
                report.push(family.name, family.severity);
            }
        }
        report
    }

    /// First matching family, in table order
    pub fn first_match(&self, text: &str) -> Option<&PatternFamily> {
        self.families.iter().find(|family| family.is_match(text))
    }
}
