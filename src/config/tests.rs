use std::fs;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use super::{Settings, load_config_from};

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.stream.poll_interval_secs, 15);
    assert_eq!(settings.stream.heartbeat_secs, 30);
    assert_eq!(settings.stream.data_event, "update");
    assert_eq!(settings.variants.hidden_fields, vec!["internal".to_string()]);
    assert_eq!(settings.client.reconnect_delay_secs, 5);
}

#[test]
fn test_stream_durations_never_zero() {
    let mut settings = Settings::default();
    settings.stream.poll_interval_secs = 0;
    settings.stream.heartbeat_secs = 0;
    assert_eq!(settings.stream.poll_interval(), Duration::from_secs(1));
    assert_eq!(settings.stream.heartbeat_interval(), Duration::from_secs(1));

    let options = Settings::default().stream.engine_options();
    assert_eq!(options.poll_interval, Duration::from_secs(15));
    assert_eq!(options.error_event, "error");
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("absent");
    let cfg = load_config_from(path.to_str().unwrap()).expect("load_config failed");
    assert_eq!(cfg, Settings::default());
}

#[test]
#[serial]
fn test_file_overrides_defaults_partially() {
    let tmp = TempDir::new().expect("create tempdir");
    let toml = r#"
        [server]
        port = 9000

        [stream]
        poll_interval_secs = 5
        data_event = "projects"

        [variants]
        hidden_fields = ["internal", "cost"]
    "#;
    let file = tmp.path().join("pollcast.toml");
    fs::write(&file, toml).expect("write config file");
    let base = tmp.path().join("pollcast");

    let cfg = load_config_from(base.to_str().unwrap()).expect("load_config failed");
    assert_eq!(cfg.server.host, "127.0.0.1");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.stream.poll_interval_secs, 5);
    assert_eq!(cfg.stream.heartbeat_secs, 30);
    assert_eq!(cfg.stream.data_event, "projects");
    assert_eq!(cfg.variants.hidden_fields, vec!["internal", "cost"]);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let file = tmp.path().join("pollcast.toml");
    fs::write(&file, "[stream]\nheartbeat_secs = 10\n").expect("write config file");
    let base = tmp.path().join("pollcast");

    temp_env::with_vars(
        [
            ("POLLCAST__STREAM__HEARTBEAT_SECS", Some("3")),
            ("POLLCAST__CLIENT__JITTER", Some("0.5")),
            ("POLLCAST__VARIANTS__HIDDEN_FIELDS", Some("secret,notes")),
        ],
        || {
            let cfg = load_config_from(base.to_str().unwrap()).expect("load_config failed");
            assert_eq!(cfg.stream.heartbeat_secs, 3);
            assert_eq!(cfg.client.jitter, 0.5);
            assert_eq!(cfg.variants.hidden_fields, vec!["secret", "notes"]);
        },
    );
}

#[test]
fn test_client_settings_build_policy() {
    let policy = Settings::default().client.reconnect_policy();
    assert_eq!(policy.base(), Duration::from_secs(5));
    assert_eq!(policy.max(), Duration::from_secs(60));
}
