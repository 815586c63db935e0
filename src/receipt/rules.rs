//! Ordered rule chain that decides whether a receipt is acceptable.
//!
//! Rules run in list order and evaluation stops at the first failure, so the
//! order decides which reason a receipt that breaks several rules gets back.
//! The default order is:
//! 1. expected name present
//! 2. operation reference present
//! 3. forbidden amount absent
//! 4. first date on the receipt within the tolerance window

use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use regex::Regex;
use tracing::debug;

use crate::config::ValidationConfig;
use crate::error::ConfigError;
use crate::receipt::types::ValidationResult;

pub const MISSING_NAME: &str = "missing name";
pub const MISSING_OPERATION: &str = "no valid operation number found";
pub const FORBIDDEN_AMOUNT: &str = "receipt contains an amount near the forbidden value";
pub const INVALID_DATE: &str = "invalid date or outside allowed range";

/// `D/M/YYYY` (one or two digit day and month) or `YYYY-MM-DD`.
static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[0-9]{1,2}/[0-9]{1,2}/[0-9]{4}\b|\b[0-9]{4}-[0-9]{2}-[0-9]{2}\b")
        .expect("date pattern is valid")
});

/// Accepted date layouts, tried in this order.
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];

/// A single check over the extracted receipt text.
#[derive(Debug, Clone)]
pub enum ValidationRule {
    /// The expected name appears anywhere in the text, ignoring case.
    NamePresent { expected_lowercase: String },
    /// `operación` followed by an alphanumeric reference token.
    OperationReference { pattern: Regex },
    /// The forbidden amount does not appear, bare or after the currency symbol.
    ForbiddenAmount { pattern: Regex },
    /// The first date in the text is at most `tolerance_days` away from today.
    DateWithinTolerance { tolerance_days: i64 },
}

impl ValidationRule {
    pub fn name_present(expected: &str) -> Self {
        Self::NamePresent {
            expected_lowercase: expected.to_lowercase(),
        }
    }

    pub fn operation_reference(min_length: usize) -> Result<Self, ConfigError> {
        let pattern = format!(r"(?i)operación\s*[:\-]?\s*[[:alnum:]]{{{min_length},}}");
        let pattern = Regex::new(&pattern).map_err(|source| ConfigError::Pattern {
            rule: "operation_reference",
            source,
        })?;
        Ok(Self::OperationReference { pattern })
    }

    pub fn forbidden_amount(amount: &str, currency_symbol: &str) -> Result<Self, ConfigError> {
        let amount = amount.trim();
        if amount.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "forbidden_amount".into(),
                message: "must not be empty".into(),
            });
        }
        let amount = regex::escape(amount);
        let mut pattern = format!(r"(?i)\b{amount}(?:\.00)?\b");
        let currency_symbol = currency_symbol.trim();
        if !currency_symbol.is_empty() {
            pattern.push_str(&format!(r"|{}\s*{amount}", regex::escape(currency_symbol)));
        }
        let pattern = Regex::new(&pattern).map_err(|source| ConfigError::Pattern {
            rule: "forbidden_amount",
            source,
        })?;
        Ok(Self::ForbiddenAmount { pattern })
    }

    pub fn date_within(tolerance_days: i64) -> Self {
        Self::DateWithinTolerance { tolerance_days }
    }

    /// Short identifier for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NamePresent { .. } => "name_present",
            Self::OperationReference { .. } => "operation_reference",
            Self::ForbiddenAmount { .. } => "forbidden_amount",
            Self::DateWithinTolerance { .. } => "date_within_tolerance",
        }
    }

    /// Rejection reason reported when this rule fails.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NamePresent { .. } => MISSING_NAME,
            Self::OperationReference { .. } => MISSING_OPERATION,
            Self::ForbiddenAmount { .. } => FORBIDDEN_AMOUNT,
            Self::DateWithinTolerance { .. } => INVALID_DATE,
        }
    }

    /// Whether `text` passes this rule when evaluated on `today`.
    pub fn check(&self, text: &str, today: NaiveDate) -> bool {
        match self {
            Self::NamePresent { expected_lowercase } => {
                text.to_lowercase().contains(expected_lowercase.as_str())
            }
            Self::OperationReference { pattern } => pattern.is_match(text),
            Self::ForbiddenAmount { pattern } => !pattern.is_match(text),
            Self::DateWithinTolerance { tolerance_days } => match first_date(text) {
                Some(date) => (date - today).num_days().abs() <= *tolerance_days,
                None => false,
            },
        }
    }
}

/// Parse the leftmost date-like substring, if it is a real calendar date.
fn first_date(text: &str) -> Option<NaiveDate> {
    let found = DATE_PATTERN.find(text)?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(found.as_str(), fmt).ok())
}

/// Short-circuiting evaluator over an ordered list of rules.
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    rules: Vec<ValidationRule>,
}

impl ValidationEngine {
    /// Build the standard four-rule chain from configuration.
    pub fn from_config(config: &ValidationConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_rules(vec![
            ValidationRule::name_present(&config.expected_name),
            ValidationRule::operation_reference(config.min_operation_length)?,
            ValidationRule::forbidden_amount(&config.forbidden_amount, &config.currency_symbol)?,
            ValidationRule::date_within(config.date_tolerance_days),
        ]))
    }

    /// Build an engine from an explicit rule list, evaluated in the given order.
    pub fn with_rules(rules: Vec<ValidationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    /// Evaluate against today's local date.
    pub fn evaluate(&self, text: &str) -> ValidationResult {
        self.evaluate_on(text, Local::now().date_naive())
    }

    /// Evaluate as if the current date were `today`.
    pub fn evaluate_on(&self, text: &str, today: NaiveDate) -> ValidationResult {
        for rule in &self.rules {
            if !rule.check(text, today) {
                debug!(rule = rule.name(), "Receipt failed validation rule");
                return ValidationResult::rejected(rule.reason());
            }
        }
        ValidationResult::accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::types::ACCEPTED_REASON;

    fn engine() -> ValidationEngine {
        ValidationEngine::from_config(&ValidationConfig::default()).unwrap()
    }

    fn march(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn receipt(date: &str) -> String {
        format!("Yape\nPago a Angel Vilca\nNro. de operación: AB12345\nS/ 120.00\n{date} 10:42")
    }

    #[test]
    fn accepts_valid_receipt() {
        let text = "... Angel Vilca ... operación: AB12345 ... 15/03/2024 ...";
        let result = engine().evaluate_on(text, march(15));
        assert!(result.accepted);
        assert_eq!(result.reason, ACCEPTED_REASON);
    }

    #[test]
    fn rejects_injected_currency_amount() {
        let text = "... Angel Vilca ... operación: AB12345 ... S/ 500.00 ... 15/03/2024 ...";
        let result = engine().evaluate_on(text, march(15));
        assert!(!result.accepted);
        assert_eq!(result.reason, FORBIDDEN_AMOUNT);
    }

    #[test]
    fn missing_name_wins_over_everything_else() {
        let texts = [
            "",
            "operación: AB12345 15/03/2024",
            "Angel Vilcx operación: AB12345 S/ 500 15/03/2024",
            "pago de S/ 500 sin fecha",
        ];
        for text in texts {
            let result = engine().evaluate_on(text, march(15));
            assert_eq!(result.reason, MISSING_NAME, "text: {text:?}");
            assert!(!result.accepted);
        }
    }

    #[test]
    fn name_match_ignores_case() {
        let text = receipt("15/03/2024").replace("Angel Vilca", "ANGEL vilca");
        assert!(engine().evaluate_on(&text, march(15)).accepted);
    }

    #[test]
    fn rejects_missing_operation_reference() {
        let text = "Angel Vilca 15/03/2024 total S/ 20";
        assert_eq!(engine().evaluate_on(text, march(15)).reason, MISSING_OPERATION);
    }

    #[test]
    fn rejects_short_operation_token() {
        let text = "Angel Vilca operación: AB12 15/03/2024";
        assert_eq!(engine().evaluate_on(text, march(15)).reason, MISSING_OPERATION);
    }

    #[test]
    fn operation_reference_accepts_separators_and_case() {
        for text in [
            "Angel Vilca OPERACIÓN-XY98765 15/03/2024",
            "Angel Vilca operación 0012345 15/03/2024",
            "Angel Vilca Operación:ZZZZZ 15/03/2024",
        ] {
            assert!(engine().evaluate_on(text, march(15)).accepted, "text: {text:?}");
        }
    }

    #[test]
    fn operation_checked_before_date() {
        let text = "Angel Vilca sin fecha ni referencia";
        assert_eq!(engine().evaluate_on(text, march(15)).reason, MISSING_OPERATION);
    }

    #[test]
    fn rejects_forbidden_amount_variants() {
        for amount in ["500", "500.00", "S/ 500", "S/500", "s/  500.00"] {
            let text = receipt("15/03/2024").replace("S/ 120.00", amount);
            let result = engine().evaluate_on(&text, march(15));
            assert_eq!(result.reason, FORBIDDEN_AMOUNT, "amount: {amount:?}");
        }
    }

    #[test]
    fn other_amounts_pass() {
        for amount in ["1500", "5000", "S/ 50.00", "S/ 1500.00"] {
            let text = receipt("15/03/2024").replace("S/ 120.00", amount);
            let result = engine().evaluate_on(&text, march(15));
            assert!(result.accepted, "amount: {amount:?} -> {}", result.reason);
        }
    }

    #[test]
    fn amount_checked_before_date() {
        let text = "Angel Vilca operación: AB12345 S/ 500";
        assert_eq!(engine().evaluate_on(text, march(15)).reason, FORBIDDEN_AMOUNT);
    }

    #[test]
    fn date_at_tolerance_boundary_is_accepted() {
        assert!(engine().evaluate_on(&receipt("14/03/2024"), march(15)).accepted);
        assert!(engine().evaluate_on(&receipt("16/03/2024"), march(15)).accepted);
    }

    #[test]
    fn date_one_past_tolerance_is_rejected() {
        assert_eq!(
            engine().evaluate_on(&receipt("13/03/2024"), march(15)).reason,
            INVALID_DATE
        );
        assert_eq!(
            engine().evaluate_on(&receipt("17/03/2024"), march(15)).reason,
            INVALID_DATE
        );
    }

    #[test]
    fn iso_dates_are_accepted() {
        assert!(engine().evaluate_on(&receipt("2024-03-16"), march(15)).accepted);
        assert_eq!(
            engine().evaluate_on(&receipt("2024-03-20"), march(15)).reason,
            INVALID_DATE
        );
    }

    #[test]
    fn single_digit_day_and_month() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert!(engine().evaluate_on(&receipt("5/3/2024"), today).accepted);
    }

    #[test]
    fn missing_and_invalid_dates_share_one_reason() {
        let no_date = "Angel Vilca operación: AB12345 S/ 120.00";
        assert_eq!(engine().evaluate_on(no_date, march(15)).reason, INVALID_DATE);
        // Day/month swapped: month 15 does not exist in either format.
        assert_eq!(
            engine().evaluate_on(&receipt("03/15/2024"), march(15)).reason,
            INVALID_DATE
        );
        assert_eq!(
            engine().evaluate_on(&receipt("31/02/2024"), march(15)).reason,
            INVALID_DATE
        );
    }

    #[test]
    fn only_leftmost_date_counts() {
        let text = format!("{} emitido 01/01/2024", receipt("15/03/2024"));
        assert!(engine().evaluate_on(&text, march(15)).accepted);

        let text = receipt("15/03/2024").replace("Yape", "Yape 01/01/2024");
        assert_eq!(engine().evaluate_on(&text, march(15)).reason, INVALID_DATE);
    }

    #[test]
    fn tolerance_is_configurable() {
        let config = ValidationConfig {
            date_tolerance_days: 3,
            ..ValidationConfig::default()
        };
        let engine = ValidationEngine::from_config(&config).unwrap();
        assert!(engine.evaluate_on(&receipt("12/03/2024"), march(15)).accepted);
        assert_eq!(
            engine.evaluate_on(&receipt("11/03/2024"), march(15)).reason,
            INVALID_DATE
        );
    }

    #[test]
    fn custom_name_and_amount() {
        let config = ValidationConfig {
            expected_name: "María Quispe".into(),
            forbidden_amount: "99.90".into(),
            currency_symbol: "$".into(),
            ..ValidationConfig::default()
        };
        let engine = ValidationEngine::from_config(&config).unwrap();
        let base = "maría quispe operación: QQ00001 15/03/2024";
        assert!(engine.evaluate_on(base, march(15)).accepted);
        assert_eq!(
            engine.evaluate_on(&format!("{base} $99.90"), march(15)).reason,
            FORBIDDEN_AMOUNT
        );
        // The dot in the amount is literal, not a wildcard.
        assert!(engine.evaluate_on(&format!("{base} 99x90"), march(15)).accepted);
    }

    #[test]
    fn blank_forbidden_amount_is_a_config_error() {
        for amount in ["", "   "] {
            let config = ValidationConfig {
                forbidden_amount: amount.into(),
                ..ValidationConfig::default()
            };
            let err = ValidationEngine::from_config(&config).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "forbidden_amount"),
                "amount {amount:?}: {err}"
            );
        }
    }

    #[test]
    fn default_rule_order() {
        let names: Vec<_> = engine().rules().iter().map(ValidationRule::name).collect();
        assert_eq!(
            names,
            vec![
                "name_present",
                "operation_reference",
                "forbidden_amount",
                "date_within_tolerance"
            ]
        );
    }

    #[test]
    fn rule_order_decides_reason() {
        let text = "nobody S/ 500";
        let name_first = ValidationEngine::with_rules(vec![
            ValidationRule::name_present("Angel Vilca"),
            ValidationRule::forbidden_amount("500", "S/").unwrap(),
        ]);
        let amount_first = ValidationEngine::with_rules(vec![
            ValidationRule::forbidden_amount("500", "S/").unwrap(),
            ValidationRule::name_present("Angel Vilca"),
        ]);
        assert_eq!(name_first.evaluate_on(text, march(15)).reason, MISSING_NAME);
        assert_eq!(amount_first.evaluate_on(text, march(15)).reason, FORBIDDEN_AMOUNT);
    }

    #[test]
    fn empty_chain_accepts() {
        let engine = ValidationEngine::with_rules(vec![]);
        assert!(engine.evaluate_on("", march(15)).accepted);
    }
}
