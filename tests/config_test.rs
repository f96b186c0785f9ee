use handoff::config::Config;
use handoff::engine::DEFAULT_MAX_CONCURRENCY;
use handoff::error::Error;
use handoff::event::DEFAULT_JOURNAL_CAPACITY;
use handoff::job::compute::DEFAULT_ITERATIONS;
use handoff::telemetry::DEFAULT_METRIC_INTERVAL;

// Environment is process-global, so every case runs in one test.
#[test]
fn config_from_env_defaults_overrides_and_rejects() {
    unsafe {
        std::env::remove_var("HANDOFF_MAX_CONCURRENCY");
        std::env::remove_var("HANDOFF_MAX_PENDING");
        std::env::remove_var("HANDOFF_COMPUTE_ITERATIONS");
        std::env::remove_var("HANDOFF_JOURNAL_CAPACITY");
        std::env::remove_var("HANDOFF_METRIC_INTERVAL_SECS");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
    assert_eq!(config.max_pending, None);
    assert_eq!(config.compute_iterations, DEFAULT_ITERATIONS);
    assert_eq!(config.journal_capacity, DEFAULT_JOURNAL_CAPACITY);
    assert_eq!(config.metric_interval, DEFAULT_METRIC_INTERVAL);
    assert!(!config.log_level.is_empty());

    unsafe {
        std::env::set_var("HANDOFF_MAX_CONCURRENCY", "4");
        std::env::set_var("HANDOFF_MAX_PENDING", "100");
        std::env::set_var("HANDOFF_COMPUTE_ITERATIONS", "1000");
        std::env::set_var("HANDOFF_JOURNAL_CAPACITY", "256");
        std::env::set_var("HANDOFF_METRIC_INTERVAL_SECS", "2");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.max_concurrency, 4);
    assert_eq!(config.max_pending, Some(100));
    assert_eq!(config.compute_iterations, 1000);
    assert_eq!(config.queue().max_concurrency, 4);
    assert_eq!(config.journal_capacity, 256);
    assert_eq!(config.metric_interval, std::time::Duration::from_secs(2));

    unsafe {
        std::env::set_var("HANDOFF_JOURNAL_CAPACITY", "0");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));
    unsafe {
        std::env::remove_var("HANDOFF_JOURNAL_CAPACITY");
    }

    unsafe {
        std::env::set_var("HANDOFF_MAX_CONCURRENCY", "lots");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    unsafe {
        std::env::set_var("HANDOFF_MAX_CONCURRENCY", "0");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    // Clean up
    unsafe {
        std::env::remove_var("HANDOFF_MAX_CONCURRENCY");
        std::env::remove_var("HANDOFF_MAX_PENDING");
        std::env::remove_var("HANDOFF_COMPUTE_ITERATIONS");
        std::env::remove_var("HANDOFF_METRIC_INTERVAL_SECS");
    }
}

#[test]
fn manifest_load_resolves_placeholder_next_to_file() {
    use handoff::config::FetchManifest;

    let dir = std::env::temp_dir()
        .join("handoff-test")
        .join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("missing.bin"), b"placeholder").unwrap();
    let path = dir.join("fetch.toml");
    std::fs::write(
        &path,
        "identifiers = [\"https://example.org/a\", \"https://example.org/b\"]\nplaceholder = \"missing.bin\"\n",
    )
    .unwrap();

    let manifest = FetchManifest::load(&path).unwrap();
    assert_eq!(manifest.identifiers.len(), 2);
    assert_eq!(manifest.placeholder, Some(dir.join("missing.bin")));
    assert_eq!(
        manifest.placeholder_bytes().unwrap(),
        Some(b"placeholder".to_vec())
    );

    let missing = FetchManifest::load(&dir.join("nope.toml")).unwrap_err();
    assert!(matches!(missing, Error::Manifest { .. }));

    let _ = std::fs::remove_dir_all(&dir);
}
