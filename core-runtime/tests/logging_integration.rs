//! Integration tests for logging system

use core_runtime::logging::{filter_directives, init_logging, LogFormat, LogLevel, LoggingConfig};

#[test]
fn test_format_selection() {
    // Debug builds should default to Pretty
    #[cfg(debug_assertions)]
    {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
    }

    // Release builds should default to JSON
    #[cfg(not(debug_assertions))]
    {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Json);
    }
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}

#[test]
fn test_filter_configuration() {
    let config = LoggingConfig::default().with_filter("core_delivery=debug,core_behavior=trace");

    assert_eq!(
        config.filter,
        Some("core_delivery=debug,core_behavior=trace".to_string())
    );

    if std::env::var("RUST_LOG").is_err() {
        assert_eq!(
            filter_directives(&config),
            "core_delivery=debug,core_behavior=trace"
        );
    }
}

#[test]
fn test_init_only_once() {
    // The global subscriber can only be installed once per process
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_filter("core_runtime=info");

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());

    tracing::info!(component = "logging_integration", "Logging initialized");
}
