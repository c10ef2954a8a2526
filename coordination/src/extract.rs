//! Result extractor — turns free model text into typed predictions.
//!
//! Stages, applied in order, stopping at the first success:
//!
//! ```text
//! first '{' .. last '}'  →  strict JSON
//!                        →  repaired JSON (comments, trailing commas, Python literals)
//! raw text               →  regex field scan
//! question text          →  domain fallback
//! ```
//!
//! Whatever path is taken, the resulting probability is clamped into
//! `[0.01, 0.99]`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::QuestionDomain;
use crate::types::{clamp_probability, ConfidenceLabel, ExtractedPrediction, TimeHorizon};

/// Longest reasoning excerpt kept when falling back to raw text.
const MAX_REASONING_CHARS: usize = 500;

/// Which stage produced an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPath {
    Json,
    RepairedJson,
    Regex,
    DomainFallback,
}

impl std::fmt::Display for ExtractionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::RepairedJson => write!(f, "repaired_json"),
            Self::Regex => write!(f, "regex"),
            Self::DomainFallback => write!(f, "domain_fallback"),
        }
    }
}

/// A prediction plus the path that produced its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub prediction: ExtractedPrediction,
    pub path: ExtractionPath,
}

// ── Patterns ──────────────────────────────────────────────────────────────────

static KEYED_PROBABILITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"?(?:final_)?probability"?\s*[:=]\s*"?(\d+(?:\.\d+)?|\.\d+)"#)
        .expect("KEYED_PROBABILITY_RE regex should compile")
});

static LOOSE_PROBABILITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)probability[^0-9]{0,40}?(\d+(?:\.\d+)?|\.\d+)")
        .expect("LOOSE_PROBABILITY_RE regex should compile")
});

static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("PERCENT_RE regex should compile")
});

static CONFIDENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)confidence(?:_level)?"?\s*(?:[:=]|is|level)?\s*"?\s*(low|medium|moderate|high)\b"#)
        .expect("CONFIDENCE_RE regex should compile")
});

static BASE_RATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)base[_ ]rate(?:_anchor)?[^0-9]{0,20}?(\d+(?:\.\d+)?|\.\d+)")
        .expect("BASE_RATE_RE regex should compile")
});

static REASONING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"reasoning(?:_summary)?"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("REASONING_RE regex should compile")
});

// ── JSON location and repair ─────────────────────────────────────────────────

/// Locate the first `{` .. last `}` span and parse it, repairing if needed.
pub fn extract_json_object(text: &str) -> Option<(Value, ExtractionPath)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = &text[start..=end];

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
        return Some((value, ExtractionPath::Json));
    }

    let repaired = repair_json(candidate);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value @ Value::Object(_)) => Some((value, ExtractionPath::RepairedJson)),
        _ => None,
    }
}

/// Light repair of near-JSON model output.
///
/// Outside string literals: drops `//` comments while inside a brace, drops
/// commas that directly precede `}` or `]`, and rewrites the Python literals
/// `True`, `False`, `None`.
pub fn repair_json(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut depth: i32 = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' | '[' => {
                depth += 1;
                out.push(c);
            }
            '}' | ']' => {
                depth -= 1;
                out.push(c);
            }
            '/' if depth > 0 && chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            ',' => {
                let next = chars[i + 1..]
                    .iter()
                    .enumerate()
                    .find(|(_, ch)| !ch.is_whitespace())
                    .map(|(offset, ch)| (i + 1 + offset, *ch));
                match next {
                    Some((_, '}' | ']')) => {}
                    // A comment may sit between the comma and the closer.
                    Some((j, '/')) if chars.get(j + 1) == Some(&'/') => {
                        let mut k = j;
                        while k < chars.len() && chars[k] != '\n' {
                            k += 1;
                        }
                        let closes = chars[k..]
                            .iter()
                            .find(|ch| !ch.is_whitespace())
                            .is_some_and(|ch| matches!(ch, '}' | ']'));
                        if !closes {
                            out.push(c);
                        }
                    }
                    _ => out.push(c),
                }
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

// ── Field coercion ───────────────────────────────────────────────────────────

/// Percentages (> 1) become fractions once; the result is clamped.
pub fn normalize_probability(raw: f64) -> f64 {
    let p = if raw > 1.0 { raw / 100.0 } else { raw };
    clamp_probability(p)
}

/// Read a number from a JSON value that may be a number or a string like `"72%"`.
fn number_from_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn first_number(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(number_from_value))
}

fn first_text<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn confidence_from_value(value: &Value) -> Option<ConfidenceLabel> {
    match value {
        Value::String(s) => ConfidenceLabel::from_text(s).or_else(|| {
            number_from_value(value).map(|n| ConfidenceLabel::from_score(fraction(n)))
        }),
        Value::Number(_) => {
            number_from_value(value).map(|n| ConfidenceLabel::from_score(fraction(n)))
        }
        _ => None,
    }
}

fn fraction(v: f64) -> f64 {
    if v > 1.0 {
        v / 100.0
    } else {
        v
    }
}

fn confidence_from_text(text: &str) -> Option<ConfidenceLabel> {
    CONFIDENCE_RE
        .captures(text)
        .and_then(|c| ConfidenceLabel::from_text(&c[1]))
}

/// Base rates are reported as fractions or percentages; values above 1 are
/// divided by 100 and the result must land in `[0, 1]`.
fn normalize_base_rate(raw: f64) -> Option<f64> {
    let v = fraction(raw);
    (0.0..=1.0).contains(&v).then_some(v)
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_REASONING_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_REASONING_CHARS).collect();
        format!("{cut}...")
    }
}

/// Regex scan for a probability. Takes the first match of the first
/// pattern that matches at all.
pub fn regex_probability(text: &str) -> Option<f64> {
    [&*KEYED_PROBABILITY_RE, &*LOOSE_PROBABILITY_RE, &*PERCENT_RE]
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|c| c[1].parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

// ── Single-prediction extraction ─────────────────────────────────────────────

/// Extract one prediction from raw model text.
///
/// `question` feeds the domain fallback when no probability is found.
pub fn extract_prediction(text: &str, question: &str) -> Extraction {
    if let Some((json, path)) = extract_json_object(text) {
        if let Some(raw) = first_number(
            &json,
            &["final_probability", "probability", "forecast_probability"],
        ) {
            let confidence = ["confidence_level", "confidence"]
                .iter()
                .find_map(|k| json.get(*k).and_then(confidence_from_value))
                .unwrap_or(ConfidenceLabel::Medium);
            let reasoning = first_text(
                &json,
                &["reasoning_summary", "reasoning", "position_statement", "debate_summary"],
            )
            .map(str::to_string)
            .unwrap_or_else(|| excerpt(text));
            let base_rate = first_number(&json, &["base_rate", "base_rate_anchor"])
                .and_then(normalize_base_rate);

            return Extraction {
                prediction: ExtractedPrediction::new(
                    normalize_probability(raw),
                    confidence,
                    reasoning,
                    base_rate,
                ),
                path,
            };
        }
    }

    if let Some(raw) = regex_probability(text) {
        let confidence = confidence_from_text(text).unwrap_or(ConfidenceLabel::Medium);
        let reasoning = REASONING_RE
            .captures(text)
            .map(|c| c[1].replace("\\\"", "\""))
            .unwrap_or_else(|| excerpt(text));
        let base_rate = BASE_RATE_RE
            .captures(text)
            .and_then(|c| c[1].parse::<f64>().ok())
            .and_then(normalize_base_rate);

        return Extraction {
            prediction: ExtractedPrediction::new(
                normalize_probability(raw),
                confidence,
                reasoning,
                base_rate,
            ),
            path: ExtractionPath::Regex,
        };
    }

    debug!(chars = text.len(), "no probability in model output; using domain fallback");
    domain_fallback(question)
}

/// The prediction used when no probability can be recovered at all.
pub fn domain_fallback(question: &str) -> Extraction {
    let domain = QuestionDomain::classify(question);
    Extraction {
        prediction: ExtractedPrediction::new(
            domain.fallback_probability(),
            ConfidenceLabel::Low,
            format!("No probability could be extracted; using the {domain} base rate"),
            Some(domain.fallback_probability()),
        ),
        path: ExtractionPath::DomainFallback,
    }
}

// ── Multi-horizon extraction ─────────────────────────────────────────────────

/// Structured fields a judge or advocate may report beyond per-horizon values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnSignals {
    pub base_rate: Option<f64>,
    pub evidence_quality: Option<f64>,
    pub overwhelming_evidence: bool,
}

/// Result of parsing a judge or advocate turn into one prediction per horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonExtraction {
    pub predictions: BTreeMap<TimeHorizon, Extraction>,
    pub signals: TurnSignals,
    /// Parsed JSON object, or `Value::Null` when none could be recovered.
    pub json: Value,
}

fn lookup<'a>(map: Option<&'a Value>, horizon: &TimeHorizon) -> Option<&'a Value> {
    let map = map?;
    horizon.lookup_keys().iter().find_map(|k| map.get(k.as_str()))
}

/// Parse a turn that reports one probability per horizon.
///
/// Reads `final_predictions` (judge contract) or `time_horizon_predictions`
/// (advocate contract). Each entry may be a bare number or an object with
/// `probability`, `confidence` and `reasoning`. Horizons missing from the
/// maps fall back to single-prediction extraction over the whole text.
pub fn extract_horizon_predictions(
    text: &str,
    question: &str,
    horizons: &[TimeHorizon],
) -> HorizonExtraction {
    let (json, json_path) = match extract_json_object(text) {
        Some((v, p)) => (v, Some(p)),
        None => (Value::Null, None),
    };

    let predictions_map = json
        .get("final_predictions")
        .or_else(|| json.get("time_horizon_predictions"));
    let confidence_map = json.get("confidence_scores");
    let reasoning_field = json.get("reasoning");
    let shared_reasoning = first_text(
        &json,
        &["debate_summary", "position_statement", "reasoning_summary"],
    )
    .or_else(|| reasoning_field.and_then(Value::as_str));

    let base_rate =
        first_number(&json, &["base_rate", "base_rate_anchor"]).and_then(normalize_base_rate);
    let signals = TurnSignals {
        base_rate,
        evidence_quality: first_number(&json, &["evidence_quality"])
            .map(fraction)
            .filter(|v| (0.0..=1.0).contains(v)),
        overwhelming_evidence: json
            .get("overwhelming_evidence")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    };

    let mut fallback: Option<Extraction> = None;
    let mut predictions = BTreeMap::new();

    for horizon in horizons {
        let entry = lookup(predictions_map, horizon);
        let raw = entry
            .and_then(|e| number_from_value(e).or_else(|| first_number(e, &["probability"])));

        let extraction = match (raw, json_path) {
            (Some(raw), Some(path)) => {
                let confidence = lookup(confidence_map, horizon)
                    .and_then(confidence_from_value)
                    .or_else(|| {
                        entry
                            .and_then(|e| e.get("confidence"))
                            .and_then(confidence_from_value)
                    })
                    .unwrap_or(ConfidenceLabel::Medium);
                let reasoning = lookup(reasoning_field, horizon)
                    .and_then(Value::as_str)
                    .or_else(|| entry.and_then(|e| e.get("reasoning")).and_then(Value::as_str))
                    .or(shared_reasoning)
                    .map(str::to_string)
                    .unwrap_or_else(|| excerpt(text));
                Extraction {
                    prediction: ExtractedPrediction::new(
                        normalize_probability(raw),
                        confidence,
                        reasoning,
                        base_rate,
                    ),
                    path,
                }
            }
            _ => fallback
                .get_or_insert_with(|| extract_prediction(text, question))
                .clone(),
        };
        predictions.insert(*horizon, extraction);
    }

    HorizonExtraction {
        predictions,
        signals,
        json,
    }
}
