use solar_placement::{Config, ObstacleLabel, PlacementError};
use std::io::Write;

#[test]
fn loads_full_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
host = "127.0.0.1"
port = 8000

[detector]
endpoint = "http://inference:9000"
labels = ["pole", "tank"]
timeout_secs = 5

[advisor]
model = "gemini-1.5-pro"

[analysis]
default_timezone = "Asia/Kolkata"
worker_threads = 2

[export]
enabled = true
directory = "out"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:8000");
    assert_eq!(config.detector.labels, vec![ObstacleLabel::Pole, ObstacleLabel::Tank]);
    assert_eq!(config.detector.timeout_secs, 5);
    assert_eq!(config.advisor.model, "gemini-1.5-pro");
    assert!(config.advisor.api_key.is_none());
    assert_eq!(config.analysis.worker_threads, 2);
    assert_eq!(config.export_dir().unwrap(), std::path::PathBuf::from("out"));
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, PlacementError::Config(_)));
}

#[test]
fn malformed_file_is_a_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[detector\nendpoint = ").unwrap();
    assert!(matches!(
        Config::from_file(file.path()),
        Err(PlacementError::Config(_))
    ));
}

#[test]
fn unknown_label_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[detector]\nlabels = [\"chimney\"]").unwrap();
    assert!(Config::from_file(file.path()).is_err());
}
