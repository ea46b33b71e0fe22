// ABOUTME: Behavioral tests for configuration loading and CLI overrides
// Verifies file values, override precedence, and route policy validation

use std::fs;
use std::time::Duration;

use clap::Parser;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wsfleet::cli::Cli;
use wsfleet::config::{AppConfig, LogFormat};
use wsfleet::fleet::{ConfigError, EgressRoute, RouteProvider};

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

fn load_with_args(path: &std::path::Path, args: &[&str]) -> AppConfig {
    let cli = Cli::try_parse_from(std::iter::once("wsfleet").chain(args.iter().copied())).unwrap();
    let command = cli.command.unwrap_or_default();
    let mut config = AppConfig::load(Some(path)).unwrap();
    command.overrides().apply(&mut config);
    config
}

/// Test that defaults match the documented behaviour of the tool
#[test]
fn test_defaults_without_file() {
    let config = AppConfig::default();

    assert_eq!(config.fleet.target, "wss://dimden.dev/services/chat");
    assert_eq!(config.fleet.batch_count, 200);
    assert_eq!(config.fleet.batch_size, 4);
    assert_eq!(config.fleet.connection.reconnect_interval, Duration::from_secs(1));
    assert_eq!(config.fleet.connection.max_reconnect_attempts, 4);
    assert_eq!(config.logging.format, LogFormat::Pretty);

    // Neither proxies nor direct chosen: refuse to run
    assert!(matches!(config.fleet.validate(), Err(ConfigError::NoRoutePolicy)));
}

#[test]
fn test_cli_overrides_file_values() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [fleet]
        target = "ws://10.0.0.1:9000/"
        batch_count = 10
        proxies = ["127.0.0.1:8087", "127.0.0.1:8088"]

        [fleet.connection]
        reconnect_interval_ms = 500
        "#,
    );

    let config = load_with_args(&path, &["run", "--batches", "2", "--reconnect-interval", "250"]);

    assert_eq!(config.fleet.target, "ws://10.0.0.1:9000/");
    assert_eq!(config.fleet.batch_count, 2);
    assert_eq!(config.fleet.connection.reconnect_interval, Duration::from_millis(250));
    assert_eq!(config.fleet.routes().unwrap().len(), 2);
}

#[test]
fn test_direct_flag_overrides_file_proxies() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [fleet]
        proxies = ["127.0.0.1:8087"]
        "#,
    );

    let config = load_with_args(&path, &["run", "--direct"]);
    assert!(config.fleet.direct);

    let mut provider = config.fleet.route_provider().unwrap();
    assert_eq!(provider.current(), EgressRoute::Direct);
    provider.advance();
    assert_eq!(provider.current(), EgressRoute::Direct);
}

#[test]
fn test_proxy_rotation_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [fleet]
        proxies = ["http://127.0.0.1:8087", "127.0.0.1:8088"]
        "#,
    );

    let config = load_with_args(&path, &[]);
    assert!(config.fleet.validate().is_ok());

    let mut provider = config.fleet.route_provider().unwrap();
    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(provider.current().to_string());
        provider.advance();
    }
    assert_eq!(
        seen,
        vec!["http://127.0.0.1:8087", "http://127.0.0.1:8088", "http://127.0.0.1:8087"]
    );
}

#[test]
fn test_bad_proxy_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [fleet]
        proxies = ["127.0.0.1:not-a-port"]
        "#,
    );

    let config = load_with_args(&path, &[]);
    assert!(matches!(config.fleet.validate(), Err(ConfigError::Route(_))));
}

#[test]
fn test_effective_config_renders_back() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [fleet]
        direct = true

        [logging]
        status_interval_secs = 0
        "#,
    );

    let config = load_with_args(&path, &["config", "--keepalive-interval", "20"]);
    let rendered = config.to_toml().unwrap();
    let reparsed: AppConfig = toml::from_str(&rendered).unwrap();

    assert_eq!(reparsed.fleet.connection.keepalive_interval, Duration::from_millis(20));
    assert_eq!(reparsed.logging.status_interval_secs, 0);
    assert!(reparsed.fleet.direct);
}
