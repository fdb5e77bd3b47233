// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Parley configuration system.

use figment::Jail;
use parley_config::diagnostic::ConfigError;
use parley_config::model::ParleyConfig;
use parley_config::{load_and_validate_str, load_config, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_parley_config() {
    let toml = r#"
[client]
name = "desktop-1"
log_level = "debug"

[storage]
database_path = "/tmp/parley-test.db"
wal_mode = false
checkpoint_path = "/tmp/parley-test.counter"

[directory]
base_url = "https://directory.example.org"
username = "device-7"
password = "hunter2"
timeout_secs = 10
max_retries = 3

[lookup]
max_batch_size = 250
max_concurrent_batches = 2

[counter]
quiet_period_ms = 50
max_wait_ms = 1000
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.client.name, "desktop-1");
    assert_eq!(config.client.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/parley-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(
        config.storage.resolved_checkpoint_path(),
        "/tmp/parley-test.counter"
    );
    assert_eq!(config.directory.base_url, "https://directory.example.org");
    assert_eq!(config.directory.username.as_deref(), Some("device-7"));
    assert_eq!(config.directory.timeout_secs, 10);
    assert_eq!(config.directory.max_retries, 3);
    assert_eq!(config.lookup.max_batch_size, 250);
    assert_eq!(config.lookup.max_concurrent_batches, 2);
    assert_eq!(config.counter.quiet_period_ms, 50);
    assert_eq!(config.counter.max_wait_ms, 1000);
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.client.name, "parley");
    assert_eq!(config.client.log_level, "info");
    assert!(config.storage.database_path.ends_with("parley.db"));
    assert!(config.storage.wal_mode);
    assert!(config.storage.checkpoint_path.is_none());
    assert!(config
        .storage
        .resolved_checkpoint_path()
        .ends_with("parley.db.counter"));
    assert!(config.directory.username.is_none());
    assert_eq!(config.lookup.max_batch_size, 1000);
    assert_eq!(config.lookup.max_concurrent_batches, 4);
    assert_eq!(config.counter.quiet_period_ms, 25);
    assert_eq!(config.counter.max_wait_ms, 250);
}

#[test]
fn unknown_field_in_lookup_produces_error() {
    let toml = r#"
[lookup]
max_bach_size = 10
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("max_bach_size"),
        "error should mention unknown field, got: {err_str}"
    );
}

#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[groups]
enabled = true
"#;

    let err = load_config_from_str(toml).expect_err("unknown section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("groups"),
        "error should mention unknown field, got: {err_str}"
    );
}

/// Unknown key produces an UnknownKey diagnostic with a suggestion and the valid keys.
#[test]
fn diagnostic_error_suggests_correct_key() {
    let toml = r#"
[counter]
max_wait_msx = 10
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "max_wait_msx"
                && suggestion.as_deref() == Some("max_wait_ms")
                && valid_keys.contains("quiet_period_ms")
        })
    });
    assert!(found, "expected UnknownKey with suggestion, got: {errors:?}");
}

#[test]
fn diagnostic_invalid_type_names_key() {
    let toml = r#"
[lookup]
max_batch_size = "lots"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject invalid type");
    let found = errors.iter().any(|e| match e {
        ConfigError::InvalidType { key, .. } => key.contains("max_batch_size"),
        ConfigError::Other(msg) => msg.contains("max_batch_size"),
        _ => false,
    });
    assert!(found, "expected type error naming the key, got: {errors:?}");
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "max_bach_size".to_string(),
        suggestion: Some("max_batch_size".to_string()),
        valid_keys: "max_batch_size, max_concurrent_batches".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some(), "should have diagnostic code");
    let help = error.help().expect("should have help text").to_string();
    assert!(help.contains("did you mean `max_batch_size`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("max_bach_size"));
}

#[test]
fn validation_runs_after_successful_parse() {
    let toml = r#"
[lookup]
max_batch_size = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero batch size should fail");
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::Validation { message } if message.contains("max_batch_size"))
    ));
}

/// Local `parley.toml` and `PARLEY_*` variables layer over the defaults.
#[test]
fn local_file_and_env_vars_are_layered() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "parley.toml",
            r#"
[client]
name = "from-file"

[lookup]
max_batch_size = 300
"#,
        )?;
        jail.set_env("PARLEY_LOOKUP_MAX_BATCH_SIZE", "42");
        jail.set_env("PARLEY_COUNTER_MAX_WAIT_MS", "900");

        let config: ParleyConfig = load_config()?;
        assert_eq!(config.client.name, "from-file");
        assert_eq!(config.lookup.max_batch_size, 42);
        assert_eq!(config.counter.max_wait_ms, 900);
        Ok(())
    });
}

#[test]
fn env_var_with_underscored_key_maps_to_single_field() {
    Jail::expect_with(|jail| {
        jail.set_env("PARLEY_STORAGE_CHECKPOINT_PATH", "/var/lib/parley/counter");

        let config = load_config()?;
        assert_eq!(
            config.storage.checkpoint_path.as_deref(),
            Some("/var/lib/parley/counter")
        );
        Ok(())
    });
}
