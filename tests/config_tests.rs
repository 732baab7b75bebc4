use std::io::Write;

use tiny_healthcheck::{AppConfig, ConfigError, ServerConfig};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config_file() {
    let file = write_config(
        r#"
[server]
host = "127.0.0.1"
port = 8081
path = "/status/"

[response]
status = 200
body = "healthy"

[logging]
format = "json"
"#,
    );

    let config = AppConfig::load(file.path()).unwrap();
    assert_eq!(config.server, ServerConfig::new("127.0.0.1", 8081, "/status/"));
    assert_eq!(config.server.normalized_path(), "/status");
    assert_eq!(config.response.body, "healthy");
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_load_malformed_file_is_parse_error() {
    let file = write_config("[server\nport = 1");
    let err = AppConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_load_rejects_wrong_field_type() {
    let file = write_config("[server]\nport = \"eighty\"\n");
    let err = AppConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
