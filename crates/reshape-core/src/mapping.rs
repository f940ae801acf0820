//! Mapping profiles and type coercion
//!
//! A [`Profile`] is an ordered list of [`MappingRule`]s from a source template
//! to a target template. Applying it to a source [`Row`] produces a target row:
//!
//! ```yaml
//! name: people
//! source_template: people-csv
//! target_template: people-json
//! rules:
//!   - source: Name
//!     target: FullName
//!     kind: String
//!   - source: Born
//!     target: BirthDate
//!     kind: DateTime
//!     date_format: dd/MM/yyyy
//! ```
//!
//! Rules never see each other's output. A source field that is absent skips
//! its rule; a value that cannot be coerced fails the whole row.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::{FieldKind, FlatField};
use crate::value::{Row, Value};

/// Per-rule conversion that replaces the generic coercion
pub type CustomTransform = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// One source path → target path projection
#[derive(Clone, Serialize, Deserialize)]
pub struct MappingRule {
    /// Field name in the source row
    #[serde(rename = "source")]
    pub source_path: String,

    /// Field name in the target row
    #[serde(rename = "target")]
    pub target_path: String,

    /// Kind the value is coerced to
    #[serde(rename = "kind")]
    pub target_kind: FieldKind,

    /// Exact format for DateTime targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,

    /// Optional replacement for the generic coercion
    #[serde(skip)]
    pub transform: Option<CustomTransform>,
}

impl fmt::Debug for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRule")
            .field("source_path", &self.source_path)
            .field("target_path", &self.target_path)
            .field("target_kind", &self.target_kind)
            .field("date_format", &self.date_format)
            .field("transform", &self.transform.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl MappingRule {
    /// Create a rule with generic coercion
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            source_path: source.into(),
            target_path: target.into(),
            target_kind: kind,
            date_format: None,
            transform: None,
        }
    }

    /// Set an exact date format
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }

    /// Replace coercion with a custom function
    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    /// Produce the target value for a present source value
    pub fn apply(&self, value: &Value) -> Result<Value> {
        match &self.transform {
            Some(transform) => transform(value),
            None => coerce(value, self.target_kind, self.date_format.as_deref()),
        }
    }
}

/// An ordered rule set for one source → target template pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Profile name (mapping template id)
    pub name: String,

    /// Source template name
    #[serde(default)]
    pub source_template: Option<String>,

    /// Target template name
    #[serde(default)]
    pub target_template: Option<String>,

    /// Rules, applied in order
    #[serde(default)]
    pub rules: Vec<MappingRule>,
}

impl Profile {
    /// Create an empty profile
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_template: None,
            target_template: None,
            rules: Vec::new(),
        }
    }

    /// Append a rule
    pub fn rule(mut self, rule: MappingRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Check that no two rules write the same target path
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.target_path.as_str()) {
                return Err(Error::ConfigInvalid {
                    message: format!(
                        "profile '{}' maps more than one rule to '{}'",
                        self.name, rule.target_path
                    ),
                });
            }
        }
        Ok(())
    }

    /// Check every rule's target against a flattened target template
    pub fn validate_targets(&self, target_fields: &[FlatField]) -> Result<()> {
        for rule in &self.rules {
            let Some(field) = target_fields.iter().find(|f| f.path == rule.target_path) else {
                return Err(Error::ConfigInvalid {
                    message: format!(
                        "profile '{}' targets '{}', which the target template does not declare",
                        self.name, rule.target_path
                    ),
                });
            };
            if field.kind.is_scalar() && field.kind != rule.target_kind {
                return Err(Error::ConfigInvalid {
                    message: format!(
                        "profile '{}' maps '{}' as {} but the template declares {}",
                        self.name, rule.target_path, rule.target_kind, field.kind
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Project one source row onto the target schema
pub fn map_row(source: &Row, profile: &Profile) -> Result<Row> {
    let mut target = Row::new();
    for rule in &profile.rules {
        let Some(value) = source.get(&rule.source_path) else {
            continue;
        };
        target.insert(rule.target_path.clone(), rule.apply(value)?);
    }
    Ok(target)
}

/// What to do with a row whose mapping fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnRowError {
    /// Abort the batch on the first failing row
    #[default]
    StopOnError,
    /// Log the failure and drop the row
    LogAndSkip,
}

/// Map a sequence of parsed rows. Parse errors always abort.
pub fn map_rows<I>(rows: I, profile: &Profile, policy: OnRowError) -> Result<Vec<Row>>
where
    I: IntoIterator<Item = Result<Row>>,
{
    let mut out = Vec::new();
    for (index, row) in rows.into_iter().enumerate() {
        let row = row?;
        match map_row(&row, profile) {
            Ok(mapped) => out.push(mapped),
            Err(e @ Error::Coercion { .. }) if policy == OnRowError::LogAndSkip => {
                tracing::warn!(row = index + 1, profile = %profile.name, error = %e, "skipping row");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

fn coercion_error(value: &Value, kind: FieldKind, message: impl Into<String>) -> Error {
    Error::Coercion {
        value: value.to_string(),
        kind,
        message: message.into(),
    }
}

/// Convert a value to `kind`
///
/// Null stays null. Text is trimmed before numeric, boolean, and date parsing,
/// and blank text becomes null for every kind except String.
pub fn coerce(value: &Value, kind: FieldKind, date_format: Option<&str>) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if kind != FieldKind::String && value.as_str().is_some_and(|s| s.trim().is_empty()) {
        return Ok(Value::Null);
    }

    match kind {
        FieldKind::String => Ok(Value::String(value.to_string())),
        FieldKind::Integer => to_integer(value),
        FieldKind::Decimal => to_decimal(value),
        FieldKind::Boolean => to_boolean(value),
        FieldKind::DateTime => to_datetime(value, date_format),
        FieldKind::Object | FieldKind::Array => Ok(value.clone()),
    }
}

fn to_integer(value: &Value) -> Result<Value> {
    match value {
        Value::Integer(i) => Ok(Value::Integer(*i)),
        Value::Decimal(d) if d.fract() == 0.0 && d.abs() < 9.2e18 => Ok(Value::Integer(*d as i64)),
        Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            let s = s.strip_prefix('+').unwrap_or(s);
            s.parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| coercion_error(value, FieldKind::Integer, e.to_string()))
        }
        _ => Err(coercion_error(
            value,
            FieldKind::Integer,
            format!("{} is not a whole number", value.type_name()),
        )),
    }
}

fn to_decimal(value: &Value) -> Result<Value> {
    match value {
        Value::Integer(i) => Ok(Value::Decimal(*i as f64)),
        Value::Decimal(d) => Ok(Value::Decimal(*d)),
        Value::String(s) => {
            let s = s.trim();
            // f64 parsing accepts "inf" and "NaN"
            if !s.bytes().any(|b| b.is_ascii_digit()) {
                return Err(coercion_error(value, FieldKind::Decimal, "no digits"));
            }
            let d = s
                .parse::<f64>()
                .map_err(|e| coercion_error(value, FieldKind::Decimal, e.to_string()))?;
            if !d.is_finite() {
                return Err(coercion_error(value, FieldKind::Decimal, "out of range"));
            }
            Ok(Value::Decimal(d))
        }
        _ => Err(coercion_error(
            value,
            FieldKind::Decimal,
            format!("{} is not a number", value.type_name()),
        )),
    }
}

fn to_boolean(value: &Value) -> Result<Value> {
    match value {
        Value::Boolean(b) => Ok(Value::Boolean(*b)),
        Value::Integer(0) => Ok(Value::Boolean(false)),
        Value::Integer(1) => Ok(Value::Boolean(true)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(Value::Boolean(true)),
            "false" | "no" | "n" | "0" => Ok(Value::Boolean(false)),
            _ => Err(coercion_error(value, FieldKind::Boolean, "not a boolean")),
        },
        _ => Err(coercion_error(
            value,
            FieldKind::Boolean,
            format!("{} is not a boolean", value.type_name()),
        )),
    }
}

/// Formats tried, in order, when a DateTime rule has no explicit format
const GENERIC_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

const GENERIC_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d %B %Y", "%B %d, %Y"];

fn to_datetime(value: &Value, date_format: Option<&str>) -> Result<Value> {
    let text = match value {
        Value::DateTime(dt) => return Ok(Value::DateTime(*dt)),
        Value::String(s) => s.trim(),
        _ => {
            return Err(coercion_error(
                value,
                FieldKind::DateTime,
                format!("{} is not a date", value.type_name()),
            ));
        }
    };

    let parsed = match date_format {
        Some(format) => parse_exact(text, &strftime_pattern(format)),
        None => parse_generic(text),
    };

    parsed.map(Value::DateTime).ok_or_else(|| {
        let message = match date_format {
            Some(format) => format!("does not match format '{}'", format),
            None => "unrecognized date".to_string(),
        };
        coercion_error(value, FieldKind::DateTime, message)
    })
}

fn parse_exact(text: &str, pattern: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_str(text, pattern) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(text, pattern)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_generic(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.naive_utc());
    }
    GENERIC_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            GENERIC_DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Translate a `yyyy-MM-dd HH:mm:ss` style date format to a chrono pattern
///
/// Patterns that already contain `%` are passed through unchanged.
pub fn strftime_pattern(format: &str) -> String {
    if format.contains('%') {
        return format.to_string();
    }

    let chars: Vec<char> = format.chars().collect();
    let mut out = String::with_capacity(format.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' || c == '"' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }
        if c == '\\' && i + 1 < chars.len() {
            push_literal(&mut out, chars[i + 1]);
            i += 2;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let token = match (c, run) {
            ('y', 1 | 2) => Some("%y"),
            ('y', _) => Some("%Y"),
            ('M', 1 | 2) => Some("%m"),
            ('M', 3) => Some("%b"),
            ('M', _) => Some("%B"),
            ('d', 1 | 2) => Some("%d"),
            ('d', 3) => Some("%a"),
            ('d', _) => Some("%A"),
            ('H', _) => Some("%H"),
            ('h', _) => Some("%I"),
            ('m', _) => Some("%M"),
            ('s', _) => Some("%S"),
            ('f' | 'F', 1..=3) => Some("%3f"),
            ('f' | 'F', 4..=6) => Some("%6f"),
            ('f' | 'F', _) => Some("%9f"),
            ('t', _) => Some("%p"),
            ('z', 1 | 2) => Some("%#z"),
            ('z', _) => Some("%:z"),
            ('K', _) => Some("%:z"),
            _ => None,
        };

        match token {
            Some(token) => {
                // ".fff" in the source format maps onto chrono's "%.3f"
                if matches!(c, 'f' | 'F') && out.ends_with('.') {
                    out.pop();
                    out.push_str(&token.replacen('%', "%.", 1));
                } else {
                    out.push_str(token);
                }
                i += run;
            }
            None => {
                push_literal(&mut out, c);
                i += 1;
            }
        }
    }
    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
