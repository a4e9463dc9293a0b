//! Concurrent logger initialization. Separate test binary so the global
//! subscriber is still unset when the threads start.

use std::thread;

use httpserver::observability::logging::{self, Config};

#[test]
fn test_concurrent_init_installs_once() {
    let root = tempfile::tempdir().unwrap();
    let configs: Vec<Config> = (0..8)
        .map(|i| Config {
            service_name: format!("race-{i}"),
            log_level: "info".into(),
            log_dir: root.path().join(i.to_string()),
        })
        .collect();

    let outcomes: Vec<bool> = thread::scope(|scope| {
        let handles: Vec<_> = configs
            .iter()
            .map(|config| scope.spawn(move || logging::init(config).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outcomes.iter().filter(|installed| **installed).count(), 1, "{outcomes:?}");

    let winner = outcomes.iter().position(|installed| *installed).unwrap();
    assert_eq!(logging::service_name(), format!("race-{winner}"));

    // Only the winning configuration created its log directory.
    let dirs: Vec<_> = std::fs::read_dir(root.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(dirs, vec![winner.to_string()]);

    logging::shutdown();
}
