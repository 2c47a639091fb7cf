//! Integration tests for configuration parsing and its effect on a session.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use prax_prefetch::prelude::*;

/// Test minimal configuration
#[test]
fn test_config_minimal() {
    let config = PrefetchConfig::from_str("").expect("Failed to parse config");
    assert_eq!(config, PrefetchConfig::default());
    assert!(config.prefetch.validate_empty_levels);
    assert!(config.prefetch.follow_default_prefetches);
    assert_eq!(config.prefetch.max_in_list, None);
}

/// Test full configuration with all options
#[test]
fn test_config_full() {
    let config_str = r#"
        [prefetch]
        max_in_list = 500
        validate_empty_levels = false
        follow_default_prefetches = false

        [debug]
        log_queries = true
        log_level = "trace"
        log_format = "compact"
    "#;

    let config = PrefetchConfig::from_str(config_str).expect("Failed to parse config");
    assert_eq!(config.prefetch.max_in_list, Some(500));
    assert!(!config.prefetch.validate_empty_levels);
    assert!(!config.prefetch.follow_default_prefetches);
    assert!(config.debug.log_queries);
    assert_eq!(config.debug.log_level, "trace");
    assert_eq!(config.debug.log_format, "compact");
}

#[test]
fn test_config_serializes_back() {
    let config = PrefetchConfig::default().with_max_in_list(100);
    let text = toml::to_string(&config).expect("Failed to serialize config");
    assert_eq!(PrefetchConfig::from_str(&text).unwrap(), config);
}

#[test]
fn test_config_rejects_unknown_keys() {
    let err = PrefetchConfig::from_str("[prefetch]\nbatch_size = 10\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_config_rejects_zero_in_list() {
    let err = PrefetchConfig::from_str("[prefetch]\nmax_in_list = 0\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.message.contains("max_in_list"));
}

#[test]
fn test_config_from_file() {
    let path = std::env::temp_dir().join(format!("prax-prefetch-{}.toml", std::process::id()));
    std::fs::write(&path, "[prefetch]\nmax_in_list = 1\n").unwrap();
    let config = PrefetchConfig::from_file(&path);
    std::fs::remove_file(&path).unwrap();
    assert_eq!(config.unwrap().prefetch.max_in_list, Some(1));

    let err = PrefetchConfig::from_file(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_configured_session_chunks_queries() {
    let config = PrefetchConfig::from_str("[prefetch]\nmax_in_list = 1\n").unwrap();
    let lib = Library::with_db(Db::with_config(config));
    let db = &lib.db;

    let (_, queries) = db.counting(|| db.fetch(QuerySet::new("Book").prefetch_related(["authors"])));
    assert_eq!(queries, 5);
}

#[test]
fn test_empty_level_validation_can_be_disabled() {
    let config = PrefetchConfig::from_str("[prefetch]\nvalidate_empty_levels = false\n").unwrap();
    let db = Db::with_config(config);
    let records = db.fetch(QuerySet::new("Author").prefetch_related(["books__nope"]));
    assert!(records.is_empty());

    let err = Db::new()
        .session
        .fetch(&QuerySet::new("Author").prefetch_related(["books__nope"]))
        .unwrap_err();
    assert!(err.is_attribute_error());
}

#[test]
fn test_logging_init_is_idempotent() {
    let config = PrefetchConfig::from_str("[debug]\nlog_queries = true\n").unwrap();
    prax_prefetch::query::init_with_config(&config.debug);
    prax_prefetch::query::init_with_config(&config.debug);

    let lib = Library::with_db(Db::with_config(config));
    let (_, queries) = lib.db.counting(|| lib.db.fetch(QuerySet::new("Book").prefetch_related(["authors"])));
    assert_eq!(queries, 2);
}
