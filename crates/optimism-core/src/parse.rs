//! Layered parsing of provider replies.
//!
//! Providers are asked for a JSON object but do not always comply. A
//! [`ReplyParserChain`] tries typed parsers in fixed order and stops at the
//! first success:
//!
//! 1. [`DirectJson`]: the whole reply is an object
//! 2. [`BraceSpan`]: the first top-level `{...}` span in the reply
//! 3. [`FenceStripped`]: code fences removed, then the brace span again
//! 4. [`LabeledFields`]: `Label: value` lines, accepted with enough fields
//!
//! Nothing here fills in content; gaps are the caller's concern.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    DirectJson,
    BraceSpan,
    FenceStripped,
    LabeledFields,
}

impl ParseStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStrategy::DirectJson => "direct_json",
            ParseStrategy::BraceSpan => "brace_span",
            ParseStrategy::FenceStripped => "fence_stripped",
            ParseStrategy::LabeledFields => "labeled_fields",
        }
    }
}

/// One expected field: canonical key plus the labels a model might write.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub labels: &'static [&'static str],
}

/// Expected fields of a reply and how many labeled fields make a usable reply.
#[derive(Debug, Clone, Copy)]
pub struct ReplySchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
    pub min_labeled_fields: usize,
}

pub const ANALYSIS_SCHEMA: ReplySchema = ReplySchema {
    name: "analysis",
    fields: &[
        FieldSpec { key: "trigger_event", labels: &["trigger_event", "trigger event", "triggerEvent"] },
        FieldSpec {
            key: "likely_interpretation",
            labels: &["likely_interpretation", "likely interpretation", "likelyInterpretation", "interpretation"],
        },
        FieldSpec { key: "underlying_fear", labels: &["underlying_fear", "underlying fear", "underlyingFear"] },
        FieldSpec { key: "emotional_need", labels: &["emotional_need", "emotional need", "emotionalNeed"] },
    ],
    min_labeled_fields: 3,
};

pub const GUIDANCE_SCHEMA: ReplySchema = ReplySchema {
    name: "guidance",
    fields: &[
        FieldSpec { key: "acknowledgment", labels: &["acknowledgment", "acknowledgement"] },
        FieldSpec { key: "thoughtPattern", labels: &["thoughtPattern", "thought pattern", "distortionType", "distortion type"] },
        FieldSpec { key: "patternNote", labels: &["patternNote", "pattern note", "distortionExplanation"] },
        FieldSpec { key: "reframe", labels: &["reframe"] },
        FieldSpec { key: "question", labels: &["question", "probingQuestion", "probing question"] },
        FieldSpec { key: "encouragement", labels: &["encouragement"] },
        FieldSpec { key: "icebergLayer", labels: &["icebergLayer", "iceberg layer"] },
        FieldSpec { key: "layerInsight", labels: &["layerInsight", "layer insight"] },
    ],
    min_labeled_fields: 3,
};

/// Tagged result of one parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseAttempt {
    Parsed(Map<String, Value>),
    Rejected(String),
}

pub trait ReplyParser: Send + Sync {
    fn strategy(&self) -> ParseStrategy;
    fn parse(&self, raw: &str, schema: &ReplySchema) -> ParseAttempt;
}

/// Successful parse with the strategy that recovered it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub fields: Map<String, Value>,
    pub strategy: ParseStrategy,
}

fn parse_object(text: &str) -> ParseAttempt {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => ParseAttempt::Parsed(map),
        Ok(_) => ParseAttempt::Rejected("json is not an object".to_string()),
        Err(e) => ParseAttempt::Rejected(e.to_string()),
    }
}

/// Byte range of the first balanced `{...}` span, ignoring braces inside strings.
fn first_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_brace_span(text: &str) -> ParseAttempt {
    if let Some(span) = first_brace_span(text) {
        if let ParseAttempt::Parsed(map) = parse_object(span) {
            return ParseAttempt::Parsed(map);
        }
    }
    // Widest span: first '{' to last '}'.
    match (text.find('{'), text.rfind('}')) {
        (Some(a), Some(b)) if a < b => parse_object(&text[a..=b]),
        _ => ParseAttempt::Rejected("no brace-delimited span".to_string()),
    }
}

pub struct DirectJson;

impl ReplyParser for DirectJson {
    fn strategy(&self) -> ParseStrategy {
        ParseStrategy::DirectJson
    }

    fn parse(&self, raw: &str, _schema: &ReplySchema) -> ParseAttempt {
        parse_object(raw)
    }
}

pub struct BraceSpan;

impl ReplyParser for BraceSpan {
    fn strategy(&self) -> ParseStrategy {
        ParseStrategy::BraceSpan
    }

    fn parse(&self, raw: &str, _schema: &ReplySchema) -> ParseAttempt {
        parse_brace_span(raw)
    }
}

static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```(?:json)?").expect("fence pattern"));

pub struct FenceStripped;

impl ReplyParser for FenceStripped {
    fn strategy(&self) -> ParseStrategy {
        ParseStrategy::FenceStripped
    }

    fn parse(&self, raw: &str, _schema: &ReplySchema) -> ParseAttempt {
        let cleaned = FENCE.replace_all(raw, "");
        parse_brace_span(cleaned.trim())
    }
}

/// `Label: value` and `**Label:** value` lines. Unlabeled lines continue the
/// previous field.
pub struct LabeledFields;

impl LabeledFields {
    fn line_pattern(schema: &ReplySchema) -> Option<Regex> {
        let mut labels: Vec<&str> = schema
            .fields
            .iter()
            .flat_map(|f| f.labels.iter().copied())
            .collect();
        // Longest first so "probing question" wins over "question".
        labels.sort_by_key(|l| std::cmp::Reverse(l.len()));
        let alternatives = labels
            .iter()
            .map(|l| regex::escape(l))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(
            r"(?i)^[\s>#*\-]*\**\s*({})\s*\**\s*:\s*\**\s*(.*)$",
            alternatives
        ))
        .ok()
    }

    fn key_for<'s>(schema: &'s ReplySchema, label: &str) -> Option<&'s str> {
        schema
            .fields
            .iter()
            .find(|f| f.labels.iter().any(|l| l.eq_ignore_ascii_case(label)))
            .map(|f| f.key)
    }
}

impl ReplyParser for LabeledFields {
    fn strategy(&self) -> ParseStrategy {
        ParseStrategy::LabeledFields
    }

    fn parse(&self, raw: &str, schema: &ReplySchema) -> ParseAttempt {
        let Some(pattern) = Self::line_pattern(schema) else {
            return ParseAttempt::Rejected("label pattern did not compile".to_string());
        };

        let mut found: Vec<(&str, String)> = Vec::new();
        let mut current: Option<usize> = None;

        for line in raw.lines() {
            if let Some(caps) = pattern.captures(line) {
                let label = caps.get(1).map_or("", |m| m.as_str());
                let value = caps.get(2).map_or("", |m| m.as_str());
                if let Some(key) = Self::key_for(schema, label) {
                    if found.iter().any(|(k, _)| *k == key) {
                        // First occurrence wins.
                        current = None;
                    } else {
                        found.push((key, value.to_string()));
                        current = Some(found.len() - 1);
                    }
                    continue;
                }
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(idx) = current {
                let entry = &mut found[idx].1;
                if !entry.is_empty() {
                    entry.push(' ');
                }
                entry.push_str(trimmed);
            }
        }

        let mut map = Map::new();
        for (key, value) in found {
            let value = value.trim().trim_matches('*').trim().trim_matches('"').trim();
            if !value.is_empty() {
                map.insert(key.to_string(), Value::String(value.to_string()));
            }
        }

        if map.len() >= schema.min_labeled_fields {
            ParseAttempt::Parsed(map)
        } else {
            ParseAttempt::Rejected(format!(
                "found {} labeled fields, need {}",
                map.len(),
                schema.min_labeled_fields
            ))
        }
    }
}

/// Ordered chain of parsers.
pub struct ReplyParserChain {
    parsers: Vec<Box<dyn ReplyParser>>,
}

impl Default for ReplyParserChain {
    fn default() -> Self {
        Self {
            parsers: vec![
                Box::new(DirectJson),
                Box::new(BraceSpan),
                Box::new(FenceStripped),
                Box::new(LabeledFields),
            ],
        }
    }
}

impl ReplyParserChain {
    pub fn parse(&self, raw: &str, schema: &ReplySchema) -> Result<ParsedReply, PipelineError> {
        let mut reasons = Vec::with_capacity(self.parsers.len());
        for parser in &self.parsers {
            match parser.parse(raw, schema) {
                ParseAttempt::Parsed(fields) => {
                    tracing::debug!(
                        target: "optimism::parse",
                        schema = schema.name,
                        strategy = parser.strategy().as_str(),
                        fields = fields.len(),
                        "reply parsed"
                    );
                    return Ok(ParsedReply {
                        fields,
                        strategy: parser.strategy(),
                    });
                }
                ParseAttempt::Rejected(reason) => {
                    reasons.push(format!("{}: {}", parser.strategy().as_str(), reason));
                }
            }
        }
        tracing::warn!(
            target: "optimism::parse",
            schema = schema.name,
            reply_len = raw.len(),
            "all parse strategies failed"
        );
        Err(PipelineError::ParseFailure(reasons.join("; ")))
    }
}
