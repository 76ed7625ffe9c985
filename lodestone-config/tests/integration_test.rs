//! Integration tests for lodestone-config

use lodestone_config::*;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use temp_env::with_vars;

#[test]
fn test_default_config_validation() {
    let config = LodestoneConfig::default();
    assert!(config.validate_all().is_ok());
}

#[test]
fn test_config_loader_from_env() {
    let vars = vec![
        ("LODESTONE_LOG_LEVEL", Some("debug")),
        ("LODESTONE_WORKER_LOG_LEVEL", Some("trace")),
        ("LODESTONE_WORKER_PROGRAM", Some("/opt/lodestone/bin/worker")),
        ("LODESTONE_POLL_INTERVAL_MS", Some("25")),
        ("LODESTONE_SHUTDOWN_GRACE_MS", Some("750")),
    ];

    with_vars(vars, || {
        let config = ConfigLoader::new().from_env().unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.effective_worker_level(), LogLevel::Trace);
        assert_eq!(
            config.engine.worker_program,
            Some(PathBuf::from("/opt/lodestone/bin/worker"))
        );
        assert_eq!(config.engine.poll_interval, Duration::from_millis(25));
        assert_eq!(config.engine.shutdown_grace, Duration::from_millis(750));
    });
}

#[test]
fn test_invalid_env_value() {
    with_vars(vec![("LODESTONE_POLL_INTERVAL_MS", Some("soon"))], || {
        let err = ConfigLoader::new().from_env().unwrap_err();
        assert!(matches!(err, ConfigError::EnvError(_)));
    });
}

#[test]
fn test_zero_interval_from_env_fails_validation() {
    with_vars(vec![("LODESTONE_POLL_INTERVAL_MS", Some("0"))], || {
        let err = ConfigLoader::new().from_env().unwrap_err();
        assert!(matches!(err, ConfigError::DomainError { domain, .. } if domain == "engine"));
    });
}

#[test]
fn test_yaml_file_with_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
engine:
  worker_args: ["--worker", "--quiet"]
  pause_poll_interval: 10
  worker_log_file: /tmp/lodestone-worker.log
logging:
  level: warn
"#
    )
    .unwrap();

    with_vars(vec![("LODESTONE_LOG_LEVEL", Some("error"))], || {
        let config = ConfigLoader::new().load(Some(file.path())).unwrap();

        assert_eq!(config.engine.worker_args, vec!["--worker", "--quiet"]);
        assert_eq!(config.engine.pause_poll_interval, Duration::from_millis(10));
        assert_eq!(config.engine.poll_interval, Duration::from_millis(200));
        assert_eq!(
            config.engine.worker_log_file,
            Some(PathBuf::from("/tmp/lodestone-worker.log"))
        );
        assert_eq!(config.logging.level, LogLevel::Error);
        assert_eq!(config.logging.effective_worker_level(), LogLevel::Error);
    });
}

#[test]
fn test_sample_round_trips() {
    let yaml = LodestoneConfig::generate_sample();
    let parsed: LodestoneConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed, LodestoneConfig::default());
}
