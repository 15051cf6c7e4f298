use super::{RiskScore, TargetLag};
use anyhow::Result;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[test]
fn test_risk_score_successfully_parses_valid_strings() -> Result<()> {
    let test_cases = vec![
        ("0", "0"),
        ("1", "1"),
        ("0.85", "0.85"),
        ("  0.5  ", "0.5"),
        ("0.700", "0.7"),
        ("1.0000", "1"),
    ];

    for (input_string, expected_output) in test_cases {
        assert_eq!(RiskScore::from_str(input_string)?.to_string(), expected_output);
    }

    Ok(())
}

#[test]
fn test_risk_score_rejects_values_outside_the_unit_interval() {
    assert!(RiskScore::from_str("1.0001").is_err());
    assert!(RiskScore::from_str("-0.1").is_err());
    assert!(RiskScore::from_str("abc").is_err());
    assert!(RiskScore::from_str("").is_err());
    assert!(RiskScore::try_from(Decimal::TWO).is_err());
}

#[test]
fn test_risk_score_ordering_follows_the_numeric_value() -> Result<()> {
    assert!(RiskScore::from_str("0.7")? < RiskScore::from_str("0.71")?);
    assert_eq!(RiskScore::from_str("0.70")?, RiskScore::from_str("0.7")?);

    Ok(())
}

#[derive(Debug, Deserialize)]
struct Threshold {
    score: RiskScore
}

#[test]
fn test_risk_score_deserializes_from_toml_numbers() -> Result<()> {
    let threshold: Threshold = toml::from_str("score = 0.85")?;

    assert_eq!(threshold.score, RiskScore::from_str("0.85")?);
    assert!(toml::from_str::<Threshold>("score = 1.5").is_err());

    Ok(())
}

#[test]
fn test_target_lag_parses_durations_and_downstream() -> Result<()> {
    let test_cases = vec![
        ("downstream", TargetLag::Downstream),
        ("DOWNSTREAM", TargetLag::Downstream),
        ("30s", TargetLag::Duration(Duration::from_secs(30))),
        ("30", TargetLag::Duration(Duration::from_secs(30))),
        ("1 minute", TargetLag::Duration(Duration::from_secs(60))),
        ("5m", TargetLag::Duration(Duration::from_secs(300))),
        ("2 hours", TargetLag::Duration(Duration::from_secs(7_200))),
        ("250ms", TargetLag::Duration(Duration::from_millis(250))),
    ];

    for (input_string, expected) in test_cases {
        assert_eq!(TargetLag::from_str(input_string)?, expected);
    }

    Ok(())
}

#[test]
fn test_target_lag_fails_to_parse_invalid_strings() {
    assert!(TargetLag::from_str("").is_err());
    assert!(TargetLag::from_str("soon").is_err());
    assert!(TargetLag::from_str("5 fortnights").is_err());
    assert!(TargetLag::from_str("m5").is_err());
    assert!(TargetLag::from_str("99999999999999999999s").is_err());
}

#[test]
fn test_target_lag_display_uses_the_largest_whole_unit() -> Result<()> {
    assert_eq!(TargetLag::from_str("120s")?.to_string(), "2m");
    assert_eq!(TargetLag::from_str("60m")?.to_string(), "1h");
    assert_eq!(TargetLag::from_str("45s")?.to_string(), "45s");
    assert_eq!(TargetLag::from_str("1500ms")?.to_string(), "1500ms");
    assert_eq!(TargetLag::Downstream.to_string(), "downstream");

    Ok(())
}
