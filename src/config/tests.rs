//! Configuration tests

use super::*;

/// Verify that serialized config can be parsed back. Catches TOML syntax
/// errors in the template before a user ever sees them.
#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let toml_str = config.to_toml();

    let parsed: Result<FileConfig, _> = toml::from_str(&toml_str);
    assert!(
        parsed.is_ok(),
        "Default config should round-trip.\nTOML:\n{}\nError: {:?}",
        toml_str,
        parsed.err()
    );
}

/// Every persistable field must survive the round trip with its value.
#[test]
fn test_config_roundtrip_preserves_values() {
    let mut config = Config::default();
    config.api_url = "https://chat.example.com".to_string();
    config.case_insensitive_search = true;
    config.logging.level = "debug".to_string();
    config.logging.file_enabled = true;
    config.logging.file_rotation = LogRotation::Hourly;

    let parsed: FileConfig = toml::from_str(&config.to_toml()).unwrap();

    assert_eq!(parsed.api_url.as_deref(), Some("https://chat.example.com"));
    assert_eq!(parsed.case_insensitive_search, Some(true));

    let logging = parsed.logging.unwrap();
    assert_eq!(logging.level.as_deref(), Some("debug"));
    assert_eq!(logging.file_enabled, Some(true));
    assert_eq!(logging.file_rotation.as_deref(), Some("hourly"));
}

#[test]
fn test_log_rotation_parse_is_lenient() {
    assert_eq!(LogRotation::parse("hourly"), LogRotation::Hourly);
    assert_eq!(LogRotation::parse("NEVER"), LogRotation::Never);
    // Unknown values fall back to the default
    assert_eq!(LogRotation::parse("weekly"), LogRotation::Daily);
}
