//! Built-in record stages: field normalization and the active/age filter.
//!
//! Both stages are total. The mapper never faults: malformed input is
//! coerced to a documented default (`Null`, `NaN` or `false`). The filter
//! treats a missing or `NaN` age as failing the age bound.

use crate::config::PipelineConfig;
use crate::error::BoxError;
use crate::record::{Record, Value};
use crate::stage::Stage;

/// How a declared field is normalized by [`FieldMapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Text copied as is; absent or non-text input yields `Null`.
    Text,
    /// Text lower-cased; absent or non-text input yields `Null`.
    Lowercase,
    /// Text coerced to `f64` with JavaScript `Number()` rules: blank text
    /// is `0`, unparseable text is `NaN`.
    Number,
    /// `true` iff the lower-cased text is exactly `"true"` (no trimming).
    Flag,
}

impl FieldKind {
    fn normalize(self, input: Option<Value>) -> Value {
        match (self, input) {
            (FieldKind::Text, Some(Value::Text(s))) => Value::Text(s),
            (FieldKind::Lowercase, Some(Value::Text(s))) => Value::Text(s.to_lowercase()),
            (FieldKind::Text | FieldKind::Lowercase, _) => Value::Null,

            (FieldKind::Number, Some(Value::Number(n))) => Value::Number(n),
            (FieldKind::Number, Some(Value::Text(s))) => Value::Number(parse_number(&s)),
            (FieldKind::Number, _) => Value::Number(f64::NAN),

            (FieldKind::Flag, Some(Value::Flag(b))) => Value::Flag(b),
            (FieldKind::Flag, Some(Value::Text(s))) => {
                Value::Flag(s.to_lowercase() == "true")
            }
            (FieldKind::Flag, _) => Value::Flag(false),
        }
    }
}

/// Coerce text the way JavaScript's `Number()` does.
///
/// Accepts decimal literals with an optional sign and exponent, `Infinity`
/// with an optional sign, and unsigned `0x`/`0o`/`0b` integers. Blank text
/// is `0`. Spellings Rust accepts but JavaScript does not (`inf`, `nan`,
/// `infinity`) are `NaN`.
fn parse_number(text: &str) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }
    match text {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let radix = match text.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &text[2..];
        if digits.starts_with(['+', '-']) {
            return f64::NAN;
        }
        return u128::from_str_radix(digits, radix)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }

    let decimal = text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if !decimal {
        return f64::NAN;
    }
    text.parse::<f64>().unwrap_or(f64::NAN)
}

/// A declared output field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Normalizes a record to a declared field layout.
///
/// The output holds exactly the declared fields, in declared order; input
/// fields that are not declared are discarded.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    rules: Vec<FieldRule>,
}

impl FieldMapper {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    /// The canonical user layout: `name`, `email` (lower-cased), `age`,
    /// `salary` and `isActive`.
    pub fn users() -> Self {
        Self::new(vec![
            FieldRule::new("name", FieldKind::Text),
            FieldRule::new("email", FieldKind::Lowercase),
            FieldRule::new("age", FieldKind::Number),
            FieldRule::new("salary", FieldKind::Number),
            FieldRule::new("isActive", FieldKind::Flag),
        ])
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Apply the mapping. Total: never fails.
    pub fn map(&self, mut record: Record) -> Record {
        let mut output = Record::new();
        for rule in &self.rules {
            let value = rule.kind.normalize(record.take(&rule.name));
            output.set(&rule.name, value);
        }
        output
    }
}

impl Stage for FieldMapper {
    fn process(&mut self, record: Record) -> Result<Option<Record>, BoxError> {
        Ok(Some(self.map(record)))
    }

    fn name(&self) -> &str {
        "Mapper"
    }
}

/// Keeps records whose `isActive` flag is set (when required) and whose
/// `age` does not exceed the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveAgeFilter {
    pub age_threshold: f64,
    pub require_active: bool,
}

impl Default for ActiveAgeFilter {
    fn default() -> Self {
        Self {
            age_threshold: 20.0,
            require_active: true,
        }
    }
}

impl ActiveAgeFilter {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            age_threshold: config.age_threshold as f64,
            require_active: config.require_active,
        }
    }

    /// Side-effect-free keep decision.
    pub fn keep(&self, record: &Record) -> bool {
        let active = record.get("isActive").and_then(Value::as_flag) == Some(true);
        if self.require_active && !active {
            return false;
        }
        // NaN compares unordered, so `<=` is false for it.
        let age = record
            .get("age")
            .and_then(Value::as_number)
            .unwrap_or(f64::NAN);
        age <= self.age_threshold
    }
}

impl Stage for ActiveAgeFilter {
    fn process(&mut self, record: Record) -> Result<Option<Record>, BoxError> {
        Ok(self.keep(&record).then_some(record))
    }

    fn name(&self) -> &str {
        "Filter"
    }
}

/// The canonical stage list: [`FieldMapper::users`] then [`ActiveAgeFilter`].
pub fn default_stages(config: &PipelineConfig) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(FieldMapper::users()),
        Box::new(ActiveAgeFilter::from_config(config)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(age: &str, active: &str) -> Record {
        Record::from_pairs([
            ("name", "Al"),
            ("email", "X@Y.com"),
            ("age", age),
            ("salary", "50000"),
            ("isActive", active),
        ])
    }

    #[test]
    fn test_mapper_normalizes_user() {
        let out = FieldMapper::users().map(user("19", "true"));
        assert_eq!(out.get("name"), Some(&Value::Text("Al".into())));
        assert_eq!(out.get("email"), Some(&Value::Text("x@y.com".into())));
        assert_eq!(out.get("age"), Some(&Value::Number(19.0)));
        assert_eq!(out.get("salary"), Some(&Value::Number(50000.0)));
        assert_eq!(out.get("isActive"), Some(&Value::Flag(true)));
    }

    #[test]
    fn test_mapper_output_is_declared_layout() {
        let input = user("19", "true").with("extra", "dropped");
        let out = FieldMapper::users().map(input);
        let names: Vec<_> = out.field_names().collect();
        assert_eq!(names, vec!["name", "email", "age", "salary", "isActive"]);
        let declared: Vec<_> = FieldMapper::users()
            .rules()
            .iter()
            .map(|rule| rule.name.clone())
            .collect();
        assert_eq!(names, declared);
    }

    fn mapped_age(text: &str) -> f64 {
        let out = FieldMapper::users().map(user(text, "true"));
        out.get("age").and_then(Value::as_number).unwrap()
    }

    #[test]
    fn test_mapper_bad_number_is_nan() {
        let bad = [
            "abc", "19 years", "inf", "-inf", "+inf", "nan", "NaN", "infinity", "1e", "0x",
            "-0x10", "0x+1A", "0xZZ",
        ];
        for text in bad {
            assert!(mapped_age(text).is_nan(), "expected NaN for {text:?}");
        }
    }

    #[test]
    fn test_mapper_blank_number_is_zero() {
        for text in ["", "  ", "\t"] {
            assert_eq!(mapped_age(text), 0.0, "expected 0 for {text:?}");
        }
    }

    #[test]
    fn test_mapper_number_spellings() {
        assert_eq!(mapped_age("Infinity"), f64::INFINITY);
        assert_eq!(mapped_age("-Infinity"), f64::NEG_INFINITY);
        assert_eq!(mapped_age("0x1A"), 26.0);
        assert_eq!(mapped_age("0b101"), 5.0);
        assert_eq!(mapped_age("0o17"), 15.0);
        assert_eq!(mapped_age("1e3"), 1000.0);
        assert_eq!(mapped_age(".5"), 0.5);
        assert_eq!(mapped_age("-7"), -7.0);
    }

    #[test]
    fn test_blank_and_rust_only_ages_through_filter() {
        let filter = ActiveAgeFilter::default();
        let blank = FieldMapper::users().map(user("", "true"));
        assert!(filter.keep(&blank));
        let rust_inf = FieldMapper::users().map(user("-inf", "true"));
        assert!(!filter.keep(&rust_inf));
        let padded_flag = FieldMapper::users().map(user("19", " true "));
        assert_eq!(padded_flag.get("isActive"), Some(&Value::Flag(false)));
        assert!(!filter.keep(&padded_flag));
    }

    #[test]
    fn test_mapper_trims_numbers() {
        let out = FieldMapper::users().map(user(" 21 ", "true"));
        assert_eq!(out.get("age"), Some(&Value::Number(21.0)));
    }

    #[test]
    fn test_mapper_flag_policy() {
        let cases = [
            ("true", true),
            ("TRUE", true),
            ("True", true),
            (" true ", false),
            ("true\n", false),
            ("false", false),
            ("yes", false),
            ("1", false),
            ("", false),
        ];
        for (text, expected) in cases {
            let out = FieldMapper::users().map(user("19", text));
            assert_eq!(
                out.get("isActive"),
                Some(&Value::Flag(expected)),
                "flag for {text:?}"
            );
        }
    }

    #[test]
    fn test_mapper_missing_fields() {
        let out = FieldMapper::users().map(Record::new());
        assert!(out.get("name").is_some_and(Value::is_null));
        assert!(out.get("email").is_some_and(Value::is_null));
        assert!(out.get("age").and_then(Value::as_number).unwrap().is_nan());
        assert!(out.get("salary").and_then(Value::as_number).unwrap().is_nan());
        assert_eq!(out.get("isActive"), Some(&Value::Flag(false)));
    }

    #[test]
    fn test_mapper_keeps_typed_input() {
        let input = Record::new().with("age", 30.0).with("isActive", true);
        let out = FieldMapper::users().map(input);
        assert_eq!(out.get("age"), Some(&Value::Number(30.0)));
        assert_eq!(out.get("isActive"), Some(&Value::Flag(true)));
    }

    #[test]
    fn test_mapper_stage_never_faults() {
        let mut stage = FieldMapper::users();
        for record in [Record::new(), user("abc", "maybe"), user("1e3", "TRUE")] {
            assert!(stage.process(record).unwrap().is_some());
        }
    }

    fn mapped(age: f64, active: bool) -> Record {
        Record::new().with("age", age).with("isActive", active)
    }

    #[test]
    fn test_filter_truth_table() {
        let filter = ActiveAgeFilter::default();
        assert!(filter.keep(&mapped(19.0, true)));
        assert!(filter.keep(&mapped(20.0, true)));
        assert!(!filter.keep(&mapped(20.5, true)));
        assert!(!filter.keep(&mapped(25.0, true)));
        assert!(!filter.keep(&mapped(18.0, false)));
        assert!(!filter.keep(&mapped(25.0, false)));
    }

    #[test]
    fn test_filter_nan_age_dropped() {
        let filter = ActiveAgeFilter::default();
        assert!(!filter.keep(&mapped(f64::NAN, true)));
        assert!(!filter.keep(&Record::new().with("isActive", true)));
    }

    #[test]
    fn test_filter_without_active_gate() {
        let filter = ActiveAgeFilter {
            age_threshold: 30.0,
            require_active: false,
        };
        assert!(filter.keep(&mapped(25.0, false)));
        assert!(!filter.keep(&mapped(31.0, true)));
        assert!(!filter.keep(&mapped(f64::NAN, false)));
    }

    #[test]
    fn test_filter_stage_drops() {
        let mut stage = ActiveAgeFilter::default();
        assert!(stage.process(mapped(25.0, true)).unwrap().is_none());
        assert!(stage.process(mapped(19.0, true)).unwrap().is_some());
    }

    #[test]
    fn test_default_stages_from_config() {
        let config = PipelineConfig {
            age_threshold: 30,
            ..PipelineConfig::default()
        };
        let mut stages = default_stages(&config);
        let names: Vec<_> = stages.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["Mapper", "Filter"]);

        let mapped = stages[0].process(user("25", "true")).unwrap().unwrap();
        assert!(stages[1].process(mapped).unwrap().is_some());
    }
}
