//! Config loading tests against real YAML files

use sentinel_common::SentinelConfig;
use std::io::Write;

fn write_config(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn partial_yaml_overlays_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "config.yml",
        r#"
app:
  port: 9000
  dev_mode: true
github:
  token: ghp_example
  retries: 5
schedule:
  daily_time: "07:30"
log_level: debug
"#,
    );

    let config = SentinelConfig::load_from(&path).unwrap();
    assert_eq!(config.app.port, 9000);
    assert!(config.app.dev_mode);
    assert_eq!(config.github.token, "ghp_example");
    assert_eq!(config.github.retries, 5);
    // untouched sections keep their defaults
    assert_eq!(config.github.api_url, "https://api.github.com");
    assert_eq!(config.schedule.daily_time, "07:30");
    assert_eq!(config.schedule.weekly_day, 1);
    assert_eq!(config.log_level, "debug");
}

#[test]
fn notification_subsections_parse() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "config.yaml",
        r#"
notification:
  enabled: true
  email:
    enabled: true
    smtp_host: smtp.example.com
    smtp_port: 587
    username: sentinel
    password: hunter2
    from: sentinel@example.com
  webhook:
    enabled: true
    urls:
      - https://hooks.example.com/a
      - https://hooks.example.com/b
    secret: shh
"#,
    );

    let config = SentinelConfig::load_from(&path).unwrap();
    assert!(config.notification.email.enabled);
    assert_eq!(config.notification.email.smtp_port, 587);
    assert_eq!(config.notification.webhook.urls.len(), 2);
    assert_eq!(config.notification.webhook.secret.as_deref(), Some("shh"));

    let redacted = config.redacted();
    assert_eq!(redacted.notification.email.password, "***");
    assert_eq!(redacted.notification.webhook.secret.as_deref(), Some("***"));
}

#[test]
fn malformed_yaml_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "config.yml", "app: [not, a, mapping");
    let err = SentinelConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, sentinel_common::SentinelError::Config(_)));
}

#[test]
fn yaml_round_trip() {
    let config = SentinelConfig::default();
    let yaml = config.to_yaml().unwrap();
    let parsed: SentinelConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed.app.port, config.app.port);
    assert_eq!(parsed.schedule.timezone, config.schedule.timezone);
}
