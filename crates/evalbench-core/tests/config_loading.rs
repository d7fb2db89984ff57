//! Loading benchmark configuration from TOML files.

use std::io::Write;

use evalbench_core::{BenchConfig, BenchError};

#[test]
fn test_load_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[sandbox]\npython = \"python3.12\"\n\n[performance]\nrepetitions = 9\ndecay_exponent = 2.0\n"
    )
    .unwrap();

    let config = BenchConfig::load(file.path()).unwrap();
    assert_eq!(config.sandbox.python, "python3.12");
    assert_eq!(config.performance.repetitions, 9);
    assert_eq!(config.performance.decay_exponent, 2.0);
    assert_eq!(config.correctness, BenchConfig::default().correctness);
    assert_eq!(config.tolerance, BenchConfig::default().tolerance);
}

#[test]
fn test_load_rejects_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[tolerance]\nrtol = -1.0\n").unwrap();
    let err = BenchConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, BenchError::InvalidConfig(_)));
}

#[test]
fn test_load_reports_parse_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[performance\nrepetitions = ").unwrap();
    let err = BenchConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, BenchError::ConfigParse(_)));
}

#[test]
fn test_load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = BenchConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, BenchError::Io(_)));
}
