//! Configuration validation errors and semantic validation.
//!
//! Thresholds are clamped into [0, 100] rather than rejected. Everything
//! else that cannot be honoured (bad regex, empty pattern, zero caps, zero
//! grace window, wrong schema version) is an error, and the caller keeps
//! its last-known-good policy.

use regex::RegexBuilder;
use thiserror::Error;

use crate::policy::{PatternEntry, PatternKind, Policy};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

impl From<ValidationError> for pc_common::Error {
    fn from(err: ValidationError) -> Self {
        pc_common::Error::ConfigurationInvalid(err.to_string())
    }
}

/// A threshold that was pulled back into range.
#[derive(Debug, Clone, PartialEq)]
pub struct Clamped {
    pub field: String,
    pub from: f64,
    pub to: f64,
}

/// Clamp every percentage threshold into [0, 100].
///
/// Non-finite values cannot be clamped meaningfully and are rejected.
pub fn clamp_thresholds(policy: &mut Policy) -> ValidationResult<Vec<Clamped>> {
    let mut clamped = Vec::new();

    for (mode, pair) in policy.thresholds.pairs_mut() {
        clamp_field(
            &format!("thresholds.{mode}.cpu_percent"),
            &mut pair.cpu_percent,
            &mut clamped,
        )?;
        clamp_field(
            &format!("thresholds.{mode}.memory_percent"),
            &mut pair.memory_percent,
            &mut clamped,
        )?;
    }

    for (mode, value) in policy.individual_cpu_threshold.values_mut() {
        clamp_field(
            &format!("individual_cpu_threshold.{mode}"),
            value,
            &mut clamped,
        )?;
    }

    clamp_field(
        "scoring.helper_weight",
        &mut policy.scoring.helper_weight,
        &mut clamped,
    )?;

    Ok(clamped)
}

fn clamp_field(field: &str, value: &mut f64, out: &mut Vec<Clamped>) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be a finite number, got {}", value),
        });
    }
    let bounded = value.clamp(0.0, 100.0);
    if bounded != *value {
        out.push(Clamped {
            field: field.to_string(),
            from: *value,
            to: bounded,
        });
        *value = bounded;
    }
    Ok(())
}

/// Validate policy configuration semantically.
pub fn validate_policy(policy: &Policy) -> ValidationResult<()> {
    // Check schema version
    if policy.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: policy.schema_version.clone(),
        });
    }

    validate_patterns("never_kill", &policy.never_kill)?;
    validate_patterns("allowlist", &policy.allowlist)?;
    validate_patterns("background_helpers", &policy.background_helpers)?;
    validate_patterns("safe_sweep", &policy.safe_sweep)?;

    if policy.scoring.fd_cap == 0 {
        return Err(ValidationError::InvalidValue {
            field: "scoring.fd_cap".to_string(),
            message: "Must be positive".to_string(),
        });
    }

    if policy.scoring.age_cap_seconds == 0 {
        return Err(ValidationError::InvalidValue {
            field: "scoring.age_cap_seconds".to_string(),
            message: "Must be positive".to_string(),
        });
    }

    if policy.guardrails.grace_ms == 0 {
        return Err(ValidationError::InvalidValue {
            field: "guardrails.grace_ms".to_string(),
            message: "Must be positive; the graceful signal needs a window".to_string(),
        });
    }

    for (mode, pair) in [
        ("conservative", &policy.thresholds.conservative),
        ("balanced", &policy.thresholds.balanced),
        ("aggressive", &policy.thresholds.aggressive),
    ] {
        if !(0.0..=100.0).contains(&pair.cpu_percent)
            || !(0.0..=100.0).contains(&pair.memory_percent)
        {
            return Err(ValidationError::SemanticError(format!(
                "thresholds.{mode} must be clamped into [0, 100] before use"
            )));
        }
    }

    Ok(())
}

/// Clamp, then validate. This is the single entry point used by loaders.
pub fn sanitize_policy(mut policy: Policy) -> ValidationResult<(Policy, Vec<Clamped>)> {
    let clamped = clamp_thresholds(&mut policy)?;
    validate_policy(&policy)?;
    Ok((policy, clamped))
}

fn validate_patterns(table: &str, entries: &[PatternEntry]) -> ValidationResult<()> {
    for (idx, entry) in entries.iter().enumerate() {
        let field = format!("{table}[{idx}].pattern");
        if entry.pattern.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field,
                message: "Pattern must not be empty".to_string(),
            });
        }
        if entry.kind == PatternKind::Regex {
            RegexBuilder::new(&entry.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| ValidationError::InvalidValue {
                    field,
                    message: format!("Invalid regex: {}", e),
                })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyMode;
    use pc_common::ProcessCategory;

    #[test]
    fn test_default_policy_is_valid() {
        validate_policy(&Policy::default()).unwrap();
    }

    #[test]
    fn test_thresholds_are_clamped() {
        let mut policy = Policy::default();
        policy.thresholds.aggressive.cpu_percent = 150.0;
        policy.individual_cpu_threshold.balanced = -5.0;

        let (policy, clamped) = sanitize_policy(policy).unwrap();
        assert_eq!(policy.thresholds.aggressive.cpu_percent, 100.0);
        assert_eq!(policy.individual_cpu_threshold.balanced, 0.0);
        assert_eq!(clamped.len(), 2);
        assert_eq!(clamped[0].field, "thresholds.aggressive.cpu_percent");
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let mut policy = Policy::default();
        policy.thresholds.balanced.memory_percent = f64::NAN;
        assert!(matches!(
            sanitize_policy(policy),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_bad_regex_rejected() {
        let mut policy = Policy::default();
        policy.never_kill.push(PatternEntry::new(
            "(unclosed",
            PatternKind::Regex,
            ProcessCategory::Editor,
        ));
        let err = validate_policy(&policy).unwrap_err();
        assert!(err.to_string().contains("never_kill["));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let mut policy = Policy::default();
        policy.allowlist = vec![PatternEntry::literal("  ", ProcessCategory::Browser)];
        assert!(validate_policy(&policy).is_err());
    }

    #[test]
    fn test_zero_grace_rejected() {
        let mut policy = Policy::default().with_mode(PolicyMode::Balanced);
        policy.guardrails.grace_ms = 0;
        assert!(validate_policy(&policy).is_err());
    }

    #[test]
    fn test_version_mismatch() {
        let mut policy = Policy::default();
        policy.schema_version = "9.9.9".to_string();
        assert_eq!(validate_policy(&policy).unwrap_err().code(), 66);
    }

    #[test]
    fn test_converts_to_configuration_invalid() {
        let err: pc_common::Error = ValidationError::ParseError("bad".into()).into();
        assert_eq!(err.code(), 10);
    }
}
