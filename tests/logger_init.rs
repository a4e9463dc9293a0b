//! Process-wide logger initialization. Lives in its own test binary because
//! it installs the global subscriber.

use std::fs;

use httpserver::observability::logging::{self, Config, Field};

#[test]
fn test_init_only_first_config_applies() {
    let first_dir = tempfile::tempdir().unwrap();
    let second_dir = tempfile::tempdir().unwrap();

    // Records before init must not fail.
    logging::bg().info("before init");

    let first = Config {
        service_name: "first-svc".into(),
        log_level: "debug".into(),
        log_dir: first_dir.path().to_path_buf(),
    };
    let second = Config {
        service_name: "second-svc".into(),
        log_level: "error".into(),
        log_dir: second_dir.path().to_path_buf(),
    };

    assert!(logging::init(&first).unwrap());
    assert!(!logging::init(&second).unwrap());
    assert!(!logging::init(&first).unwrap());

    assert_eq!(logging::service_name(), "first-svc");

    logging::bg().with([Field::new("case", "idempotent")]).info("after init");
    logging::shutdown();

    let files: Vec<_> = fs::read_dir(first_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(files.len(), 1, "{files:?}");
    assert!(files[0].starts_with("first-svc."));
    assert!(files[0].ends_with(".log"));

    let content = fs::read_to_string(first_dir.path().join(&files[0])).unwrap();
    assert!(content.contains("after init"), "{content}");
    assert!(content.contains("case=idempotent"), "{content}");
    assert!(content.contains("first-svc"), "{content}");

    assert_eq!(fs::read_dir(second_dir.path()).unwrap().count(), 0);
}
