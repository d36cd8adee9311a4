//! Tests for layered configuration loading

use super::*;
use contentful_bridge_api::{ArchiveBackend, SecretsBackend};
use contentful_bridge_core::TimestampField;
use serial_test::serial;
use std::io::Write;

fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_no_sources_yields_defaults() {
    let config = load_config_from(None).unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.secrets.provider, SecretsBackend::AzureKeyVault);
}

#[test]
#[serial]
fn test_explicit_file_is_applied() {
    let file = yaml_file(
        r#"
server:
  port: 9090
secrets:
  provider: environment
analytics:
  dataset_id: contentful
  table_id: events
  timestamp_field: created
archive:
  enabled: true
  backend: filesystem
  directory: /var/lib/contentful-bridge
"#,
    );

    let config = load_config_from(file.path().to_str()).unwrap();

    assert_eq!(config.server.port, 9090);
    assert_eq!(config.secrets.provider, SecretsBackend::Environment);
    assert_eq!(config.analytics.timestamp_field, TimestampField::Created);
    assert_eq!(config.archive.backend, ArchiveBackend::Filesystem);
    assert_eq!(config.archive.directory, "/var/lib/contentful-bridge");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    assert!(load_config_from(Some("/nonexistent/contentful-bridge/service.yaml")).is_err());
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    let file = yaml_file("server: [not, a, map");

    assert!(load_config_from(file.path().to_str()).is_err());
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = yaml_file(
        r#"
analytics:
  dataset_id: from-file
  table_id: events
"#,
    );
    std::env::set_var("CB__ANALYTICS__DATASET_ID", "from-env");
    std::env::set_var("CB__IDENTITY__ENABLED", "true");
    std::env::set_var("CB__IDENTITY__ORGANIZATION_ID", "org-1");

    let result = load_config_from(file.path().to_str());

    std::env::remove_var("CB__ANALYTICS__DATASET_ID");
    std::env::remove_var("CB__IDENTITY__ENABLED");
    std::env::remove_var("CB__IDENTITY__ORGANIZATION_ID");

    let config = result.unwrap();
    assert_eq!(config.analytics.dataset_id, "from-env");
    assert_eq!(config.analytics.table_id, "events");
    assert!(config.identity.enabled);
    assert_eq!(config.identity.organization_id, "org-1");
}

#[test]
#[serial]
fn test_explicit_config_path_reads_environment() {
    std::env::remove_var(CONFIG_FILE_VAR);
    assert_eq!(explicit_config_path(), None);

    std::env::set_var(CONFIG_FILE_VAR, "");
    assert_eq!(explicit_config_path(), None);

    std::env::set_var(CONFIG_FILE_VAR, "/etc/contentful-bridge/override.yaml");
    assert_eq!(
        explicit_config_path().as_deref(),
        Some("/etc/contentful-bridge/override.yaml")
    );

    std::env::remove_var(CONFIG_FILE_VAR);
}
