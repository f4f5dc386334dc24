//! Heuristic cross-site scripting detection over every user-controlled part
//! of a request.

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::patterns::{PatternFamily, PatternSet, ScanReport};
use crate::domain::entities::RequestContext;
use crate::domain::value_objects::Severity;

/// Request headers that commonly reflect into pages
pub const SCANNED_HEADERS: &[&str] =
    &["referer", "user-agent", "x-forwarded-host", "origin", "x-requested-with", "cookie"];

const MAX_ENTITIES: usize = 10;
const DENSITY_MIN_LENGTH: usize = 20;
const DENSITY_LIMIT: f64 = 0.3;

static XSS_PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(vec![
        PatternFamily::new(
            "script",
            Severity::Critical,
            &[r"<\s*script\b", r"<\s*/\s*script\s*>"],
        ),
        PatternFamily::new("events", Severity::High, &[r"\bon[a-z]+\s*=", r"\bformaction\s*="]),
        PatternFamily::new(
            "html",
            Severity::High,
            &[
                r"<\s*(iframe|frame|frameset|object|embed|applet|meta|link|base|form|svg|math|img|body|video|audio|isindex)\b",
            ],
        ),
        PatternFamily::new(
            "encoded",
            Severity::Medium,
            &[
                r"%3c\s*(script|iframe|img|svg)",
                r"&lt;\s*(script|iframe|img|svg)",
                r"&#0*60;?",
                r"&#x0*3c;?",
                r"\\u003c",
                r"\\x3c",
            ],
        ),
        PatternFamily::new(
            "advanced",
            Severity::Medium,
            &[
                r"\beval\s*\(",
                r"\bFunction\s*\(",
                r#"\bset(Timeout|Interval)\s*\(\s*['"`]"#,
                r"\bdocument\s*\.\s*(cookie|write|location|domain)",
                r"\bwindow\s*\.\s*location",
                r"\.\s*innerHTML\s*=",
                r"\bString\s*\.\s*fromCharCode",
                r"\batob\s*\(",
            ],
        ),
        PatternFamily::new(
            "css",
            Severity::Medium,
            &[
                r"expression\s*\(",
                r"<\s*style\b",
                r"@import",
                r"-moz-binding",
                r"\bbehavior\s*:",
                r#"url\s*\(\s*['"]?\s*javascript:"#,
            ],
        ),
        PatternFamily::new(
            "protocols",
            Severity::Medium,
            &[r"javascript\s*:", r"vbscript\s*:", r"livescript\s*:", r"data\s*:\s*text/html"],
        ),
    ])
});

static ENTITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#?[a-zA-Z0-9]+;").expect("valid entity pattern"));
static BASE64_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/_-]{20,}={0,2}").expect("valid base64 pattern"));
static PERCENT_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%[0-9a-fA-F]{2}").expect("valid escape pattern"));

const DECODED_MARKERS: &[&str] = &["<script", "javascript:", "onerror=", "onload="];

/// Findings across all scanned locations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XssReport {
    pub detected: bool,
    pub severity: Option<Severity>,
    pub families: BTreeSet<&'static str>,
    pub locations: Vec<String>,
}

impl XssReport {
    fn record(&mut self, location: String, report: &ScanReport) {
        if !report.detected() {
            return;
        }
        self.detected = true;
        self.severity = self.severity.max(report.max_severity());
        self.families.extend(report.families());
        self.locations.push(location);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XssDetector;

impl XssDetector {
    pub fn new() -> Self {
        Self
    }

    /// Scan the path, query, selected headers and any buffered body
    pub fn scan(&self, ctx: &RequestContext) -> XssReport {
        let mut report = XssReport::default();

        report.record("url".to_string(), &Self::scan_raw(&ctx.path));
        if let Some(query) = ctx.query.as_deref() {
            report.record("query".to_string(), &Self::scan_raw(query));
        }
        for (key, value) in ctx.query_pairs() {
            report.record(format!("query:{key}"), &Self::scan_text(&key));
            report.record(format!("query:{key}"), &Self::scan_text(&value));
        }

        for name in SCANNED_HEADERS {
            if let Some(value) = ctx.header(name) {
                report.record(format!("header:{name}"), &Self::scan_text(value));
            }
        }

        if let Some(body) = ctx.body.as_ref().filter(|body| !body.is_empty()) {
            for (location, text) in body_texts(ctx.content_type(), body) {
                report.record(location, &Self::scan_text(&text));
            }
        }

        report
    }

    /// Decoded, user-supplied text
    pub fn scan_text(text: &str) -> ScanReport {
        let mut report = XSS_PATTERNS.scan(text);
        if ENTITY_PATTERN.find_iter(text).count() > MAX_ENTITIES {
            report.push("entities", Severity::Medium);
        }
        if density_exceeded(text, text.chars().filter(|c| is_special(*c)).count()) {
            report.push("special_chars", Severity::Medium);
        }
        if contains_encoded_script(text) {
            report.push("base64", Severity::Critical);
        }
        report
    }

    /// Raw URL parts, where percent-encoding density is also suspicious
    pub fn scan_raw(text: &str) -> ScanReport {
        let mut report = Self::scan_text(text);
        let escapes = PERCENT_ESCAPE.find_iter(text).count() * 3;
        if density_exceeded(text, escapes) {
            report.push("url_encoding", Severity::Medium);
        }
        report
    }
}

fn is_special(c: char) -> bool {
    matches!(c, '<' | '>' | '"' | '\'' | '&' | ';' | '(' | ')' | '{' | '}' | '`' | '\\')
}

fn density_exceeded(text: &str, count: usize) -> bool {
    let length = text.chars().count();
    length >= DENSITY_MIN_LENGTH && count as f64 / length as f64 > DENSITY_LIMIT
}

fn contains_encoded_script(text: &str) -> bool {
    BASE64_RUN.find_iter(text).any(|run| {
        let run = run.as_str();
        let decoded = STANDARD
            .decode(run)
            .or_else(|_| URL_SAFE_NO_PAD.decode(run.trim_end_matches('=')));
        decoded.ok().and_then(|bytes| String::from_utf8(bytes).ok()).is_some_and(|decoded| {
            let decoded = decoded.to_lowercase();
            DECODED_MARKERS.iter().any(|marker| decoded.contains(marker))
        })
    })
}

/// Split a body into labelled texts: JSON keys and string values, form pairs, or the raw text
fn body_texts(content_type: Option<&str>, body: &[u8]) -> Vec<(String, String)> {
    let content_type = content_type.unwrap_or_default();

    if content_type.contains("application/x-www-form-urlencoded") {
        return url::form_urlencoded::parse(body)
            .flat_map(|(key, value)| {
                let location = format!("body:{key}");
                [(location.clone(), key.into_owned()), (location, value.into_owned())]
            })
            .collect();
    }

    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        let mut texts = Vec::new();
        collect_json_texts(&json, "body", &mut texts);
        return texts;
    }

    vec![("body".to_string(), String::from_utf8_lossy(body).into_owned())]
}

fn collect_json_texts(value: &Value, location: &str, texts: &mut Vec<(String, String)>) {
    match value {
        Value::String(s) => texts.push((location.to_string(), s.clone())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_json_texts(item, &format!("{location}[{index}]"), texts);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let child = format!("{location}.{key}");
                texts.push((child.clone(), key.clone()));
                collect_json_texts(item, &child, texts);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
