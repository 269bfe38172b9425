use revu::config::{self, Config};

#[test]
fn partial_file_keeps_other_defaults() {
    let config = config::parse("port = 4000\nbase_ref = \"main\"\n").unwrap();
    assert_eq!(config.port, 4000);
    assert_eq!(config.base_ref, "main");
    assert_eq!(config.review_file, ".revu.json");
    assert_eq!(config.debounce_ms, Config::default().debounce_ms);
}

#[test]
fn broken_or_missing_file_falls_back() {
    assert!(config::parse("port = \"not a number\"").is_err());

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    assert_eq!(config::load(&path), Config::default());

    std::fs::write(&path, "poll_interval_ms = [").unwrap();
    assert_eq!(config::load(&path), Config::default());

    std::fs::write(&path, "mailbox_capacity = 8").unwrap();
    assert_eq!(config::load(&path).mailbox_capacity, 8);
}
