//! Normalization of raw model output into typed task results
//!
//! Parsing is JSON-first: the raw text is read as JSON when it is JSON, when
//! it holds a fenced JSON block, or when a JSON object or array is embedded in
//! prose. Canonical payload keys and a few common aliases are accepted. When
//! no usable JSON is present, a small line grammar takes over: list markers,
//! `Heading: a, b` lines, `key: value` pairs and explicit "none" phrases.
//!
//! Normalization absorbs most malformed output by substituting defaults. JSON
//! tagged with a different task carries nothing for the requested one, so risk
//! classification and business summary fall back to their defaults. Only the
//! consistency check escalates to [`ParseFailure`]: for JSON answering another
//! task, for JSON listing the supported risks instead of the unsupported ones,
//! and for output that yields neither labels nor an explicit "none" answer.

use crate::processing::schema;
use crate::protocol::messages::{BusinessSummary, TaskResult, TaskType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Label used when no risk category can be extracted
pub const DEFAULT_RISK_LABEL: &str = "Unclassified Risk";

/// Placeholder for a business summary field the model did not supply
pub const UNKNOWN_FIELD: &str = "Unknown";

const MAX_LABEL_CHARS: usize = 80;
const MAX_LABEL_WORDS: usize = 8;

/// Separators between a label and its description
const DASHES: [&str; 3] = [" - ", " – ", " — "];

const RISK_KEYS: [&str; 4] = [
    "risk_classification",
    "risk_categories",
    "categories",
    "risks",
];

const CONSISTENCY_KEYS: [&str; 4] = [
    "consistency_check",
    "inconsistent_risks",
    "unsupported_risks",
    "risks",
];

/// Keys holding the complement of a consistency answer
const SUPPORTED_KEYS: [&str; 3] = ["consistent_risks", "discussed_risks", "supported_risks"];

const LABEL_OBJECT_KEYS: [&str; 5] = ["name", "category", "risk", "label", "title"];

static LIST_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*•+]|\d+[.)]|\(\d+\)|[a-zA-Z][.)])\s+").expect("list marker regex")
});

/// An explicit empty answer, anchored at the start and closed by a sentence
/// end or the end of the text
static EMPTY_ANSWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:none|n/a|\[\s*\]|no\s+(?:inconsistenc(?:y|ies)|inconsistent\s+risks?|unsupported\s+risks?)(?:\s+(?:were\s+)?(?:found|identified))?|no\s+(?:risks?|issues?)\s+(?:were\s+)?(?:identified|found)|nothing\s+(?:is\s+)?inconsistent|all\s+(?:listed\s+|prior\s+)?risks\s+(?:are\s+)?(?:supported|consistent)(?:\s+(?:by|with)\s+the\s+(?:company\s+)?(?:context|filing))?)\s*(?:[.!]|$)",
    )
    .expect("empty answer regex")
});

/// Normalization could not produce a value of the required shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not normalize {task_type} output: {message}")]
pub struct ParseFailure {
    pub task_type: TaskType,
    pub message: String,
}

impl ParseFailure {
    fn new(task_type: TaskType, message: impl Into<String>) -> Self {
        Self {
            task_type,
            message: message.into(),
        }
    }
}

/// Extraction state of one business summary field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldMatch {
    Matched(String),
    #[default]
    Unmatched,
}

impl FieldMatch {
    /// First non-blank value wins
    fn offer(&mut self, value: &str) {
        if matches!(self, FieldMatch::Unmatched) {
            let value = clean_value(value);
            if !value.is_empty() {
                *self = FieldMatch::Matched(value);
            }
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, FieldMatch::Matched(_))
    }

    pub fn or_unknown(self) -> String {
        match self {
            FieldMatch::Matched(value) => value,
            FieldMatch::Unmatched => UNKNOWN_FIELD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SummaryField {
    Industry,
    Products,
    Geography,
}

#[derive(Debug, Default)]
struct SummaryFields {
    industry: FieldMatch,
    products: FieldMatch,
    geography: FieldMatch,
}

impl SummaryFields {
    fn offer(&mut self, field: SummaryField, value: &str) {
        match field {
            SummaryField::Industry => self.industry.offer(value),
            SummaryField::Products => self.products.offer(value),
            SummaryField::Geography => self.geography.offer(value),
        }
    }

    fn any_matched(&self) -> bool {
        self.industry.is_matched() || self.products.is_matched() || self.geography.is_matched()
    }

    fn into_summary(self) -> BusinessSummary {
        BusinessSummary {
            industry: self.industry.or_unknown(),
            products: self.products.or_unknown(),
            geography: self.geography.or_unknown(),
        }
    }
}

/// What a JSON candidate contributed
enum JsonReading {
    Parsed(TaskResult),
    /// JSON that answers a different question than the one asked
    Mismatched(String),
    Unusable,
}

/// Stateless response parser
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn parse(task_type: TaskType, raw_text: &str) -> Result<TaskResult, ParseFailure> {
        let from_json = match extract_json(raw_text) {
            Some(value) => read_json(task_type, &value),
            None => JsonReading::Unusable,
        };

        let result = match from_json {
            JsonReading::Parsed(result) => result,
            JsonReading::Mismatched(reason) => {
                if task_type == TaskType::ConsistencyCheck {
                    return Err(ParseFailure::new(task_type, reason));
                }
                debug!(task_type = %task_type, reason = %reason, "Ignoring mismatched JSON answer");
                match task_type {
                    TaskType::BusinessSummary => TaskResult::BusinessSummary {
                        business_summary: SummaryFields::default().into_summary(),
                    },
                    _ => risk_result(Vec::new()),
                }
            }
            JsonReading::Unusable => read_text(task_type, raw_text)?,
        };

        schema::validate_result(&result).map_err(|message| ParseFailure::new(task_type, message))?;
        Ok(result)
    }
}

fn risk_result(labels: Vec<String>) -> TaskResult {
    let risk_classification = if labels.is_empty() {
        vec![DEFAULT_RISK_LABEL.to_string()]
    } else {
        labels
    };
    TaskResult::RiskClassification {
        risk_classification,
    }
}

fn read_json(task_type: TaskType, value: &Value) -> JsonReading {
    if let Some(tagged) = value
        .get("task")
        .and_then(Value::as_str)
        .and_then(TaskType::parse)
    {
        if tagged != task_type {
            return JsonReading::Mismatched(format!("model answered for task '{tagged}'"));
        }
    }

    match task_type {
        TaskType::RiskClassification => match list_payload(value, &RISK_KEYS) {
            Some(labels) => JsonReading::Parsed(risk_result(labels)),
            None => JsonReading::Unusable,
        },
        TaskType::ConsistencyCheck => match list_payload(value, &CONSISTENCY_KEYS) {
            Some(labels) => JsonReading::Parsed(TaskResult::ConsistencyCheck {
                consistency_check: labels,
            }),
            None if SUPPORTED_KEYS.iter().any(|key| value.get(*key).is_some()) => {
                JsonReading::Mismatched(
                    "model listed the supported risks instead of the unsupported ones".to_string(),
                )
            }
            None => JsonReading::Unusable,
        },
        TaskType::BusinessSummary => {
            let fields = summary_from_json(value);
            if fields.any_matched() {
                JsonReading::Parsed(TaskResult::BusinessSummary {
                    business_summary: fields.into_summary(),
                })
            } else {
                JsonReading::Unusable
            }
        }
    }
}

/// Labels under the first present key. `Some(vec![])` is an explicit empty answer.
fn list_payload(value: &Value, keys: &[&str]) -> Option<Vec<String>> {
    let payload = match value {
        Value::Array(_) => value,
        Value::Object(map) => keys.iter().find_map(|key| map.get(*key))?,
        _ => return None,
    };

    match payload {
        Value::Null => Some(Vec::new()),
        Value::Array(items) if items.is_empty() => Some(Vec::new()),
        Value::Array(items) => {
            let mut labels = Vec::new();
            let mut empty_answer = false;
            for label in items.iter().filter_map(json_label) {
                if EMPTY_ANSWER.is_match(&label) {
                    empty_answer = true;
                } else {
                    push_unique(&mut labels, label);
                }
            }
            (!labels.is_empty() || empty_answer).then_some(labels)
        }
        Value::String(text) => {
            let scan = scan_labels(text);
            if scan.labels.is_empty() && !scan.empty_answer && !text.trim().is_empty() {
                None
            } else {
                Some(scan.labels)
            }
        }
        _ => None,
    }
}

fn json_label(item: &Value) -> Option<String> {
    let text = match item {
        Value::String(text) => text.as_str(),
        Value::Object(map) => LABEL_OBJECT_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))?,
        _ => return None,
    };
    let label = clean_value(text);
    (!label.is_empty()).then_some(label)
}

fn summary_from_json(value: &Value) -> SummaryFields {
    let mut fields = SummaryFields::default();
    let object = ["business_summary", "summary"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_object))
        .or_else(|| value.as_object());

    if let Some(object) = object {
        for (key, value) in object {
            let Some(field) = classify_field(key) else {
                continue;
            };
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .collect::<Vec<_>>()
                    .join(", "),
                Value::Number(number) => number.to_string(),
                _ => continue,
            };
            fields.offer(field, &text);
        }
    }
    fields
}

fn read_text(task_type: TaskType, raw_text: &str) -> Result<TaskResult, ParseFailure> {
    match task_type {
        TaskType::RiskClassification => Ok(risk_result(extract_labels(raw_text))),
        TaskType::BusinessSummary => Ok(TaskResult::BusinessSummary {
            business_summary: summary_from_text(raw_text).into_summary(),
        }),
        TaskType::ConsistencyCheck => {
            let scan = scan_labels(raw_text);
            if scan.labels.is_empty() && !scan.empty_answer {
                return Err(ParseFailure::new(
                    task_type,
                    "no risk labels and no explicit empty answer in model output",
                ));
            }
            Ok(TaskResult::ConsistencyCheck {
                consistency_check: scan.labels,
            })
        }
    }
}

/// Distinct labels from list-shaped free text, in order of appearance
pub fn extract_labels(text: &str) -> Vec<String> {
    scan_labels(text).labels
}

#[derive(Debug, Default)]
struct LabelScan {
    labels: Vec<String>,
    /// A line or list item was exactly an empty answer such as "None"
    empty_answer: bool,
}

fn scan_labels(text: &str) -> LabelScan {
    let mut scan = LabelScan::default();

    for line in text.lines() {
        let line = LIST_MARKER.replace(line.trim(), "");
        let line = without_notes(&line);
        let line = line.trim().trim_matches('*').trim();
        if line.is_empty() || line.starts_with('#') || line.ends_with(':') {
            continue;
        }
        if EMPTY_ANSWER.is_match(&clean_value(leading_clause(line))) {
            scan.empty_answer = true;
            continue;
        }

        for piece in list_body(line).split([',', ';']) {
            if EMPTY_ANSWER.is_match(&clean_value(piece)) {
                scan.empty_answer = true;
            } else if let Some(label) = clean_label(piece) {
                push_unique(&mut scan.labels, label);
            }
        }
    }
    scan
}

/// Text with parenthesized asides removed
fn without_notes(text: &str) -> String {
    let mut kept = String::with_capacity(text.len());
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => kept.push(ch),
            _ => {}
        }
    }
    kept
}

/// Line up to its first `: explanation` or ` - explanation` tail
fn leading_clause(line: &str) -> &str {
    let head = line.split(':').next().unwrap_or(line);
    DASHES
        .iter()
        .fold(head, |head, dash| head.split(dash).next().unwrap_or(head))
}

/// Part of a line that holds labels
fn list_body(line: &str) -> &str {
    let body = match line.split_once(':') {
        Some((head, _)) if clean_value(head).eq_ignore_ascii_case("task") => "",
        Some((head, tail)) if is_list_heading(head) || tail.contains([',', ';']) => tail,
        Some((head, _)) => head,
        None => line,
    };

    DASHES
        .iter()
        .fold(body, |body, dash| body.split(dash).next().unwrap_or(body))
}

fn is_list_heading(head: &str) -> bool {
    let lower = clean_value(head).to_lowercase();
    if RISK_KEYS.contains(&lower.as_str()) || CONSISTENCY_KEYS.contains(&lower.as_str()) {
        return true;
    }
    lower.split_whitespace().count() <= 3
        && (lower.ends_with("risks")
            || lower.contains("categor")
            || lower.contains("inconsisten")
            || matches!(lower.as_str(), "answer" | "result" | "labels" | "output"))
}

fn clean_label(piece: &str) -> Option<String> {
    let mut label = clean_value(piece);
    for conjunction in ["and ", "or "] {
        if let Some(rest) = label.strip_prefix(conjunction) {
            label = rest.trim().to_string();
        }
    }

    if !label.chars().any(char::is_alphanumeric)
        || label.chars().count() > MAX_LABEL_CHARS
        || label.split_whitespace().count() > MAX_LABEL_WORDS
        || EMPTY_ANSWER.is_match(&label)
    {
        return None;
    }
    Some(label)
}

fn is_wrapping(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '*' | '[' | ']' | ',')
}

/// Strip quoting, emphasis, brackets and trailing punctuation
fn clean_value(value: &str) -> String {
    value
        .trim_matches(is_wrapping)
        .trim_end_matches('.')
        .trim_matches(is_wrapping)
        .to_string()
}

fn push_unique(labels: &mut Vec<String>, label: String) {
    if !labels
        .iter()
        .any(|existing| existing.eq_ignore_ascii_case(&label))
    {
        labels.push(label);
    }
}

fn classify_field(key: &str) -> Option<SummaryField> {
    let key = key
        .trim()
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '*' | '#' | '-'))
        .to_lowercase();
    if key.is_empty() || key.split_whitespace().count() > 4 {
        return None;
    }

    if key.contains("industry") || key.contains("sector") {
        Some(SummaryField::Industry)
    } else if key.contains("product") || key.contains("service") || key.contains("offering") {
        Some(SummaryField::Products)
    } else if ["geograph", "region", "market", "location", "countr"]
        .iter()
        .any(|needle| key.contains(needle))
    {
        Some(SummaryField::Geography)
    } else {
        None
    }
}

fn summary_from_text(text: &str) -> SummaryFields {
    let mut fields = SummaryFields::default();

    for line in text.lines() {
        let line = LIST_MARKER.replace(line.trim(), "");
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if let Some(field) = classify_field(key) {
            fields.offer(field, value);
        }
    }
    fields
}

/// First JSON object or array found in the text
fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Some(value) = parse_container(trimmed) {
        return Some(value);
    }

    if let Some(fenced) = extract_json_from_markdown(text) {
        if let Some(value) = parse_container(fenced) {
            return Some(value);
        }
    }

    find_embedded(text, '{', '}').or_else(|| find_embedded(text, '[', ']'))
}

fn parse_container(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(|value| value.is_object() || value.is_array())
}

fn extract_json_from_markdown(text: &str) -> Option<&str> {
    let (start, skip) = match text.find("```json") {
        Some(start) => (start, 7),
        None => (text.find("```")?, 3),
    };
    let content = &text[start + skip..];
    let end = content.find("```")?;
    Some(content[..end].trim())
}

fn find_embedded(text: &str, open: char, close: char) -> Option<Value> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(open) {
        let start = search_from + offset;
        if let Some(len) = balanced_len(&text[start..], open, close) {
            if let Some(value) = parse_container(&text[start..start + len]) {
                return Some(value);
            }
        }
        search_from = start + open.len_utf8();
    }
    None
}

/// Byte length of the balanced span starting at the first char, string-aware
fn balanced_len(text: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(i + ch.len_utf8());
            }
        }
    }
    None
}
