#[cfg(test)]
mod loading_tests {
    use crate::AppConfig;
    use orchestrator_domain::SchedulingStrategyKind;

    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("orchestrator.toml");
        fs::write(
            &config_path,
            r#"
[scheduler]
strategy = "adaptive"
starvation_threshold_seconds = 120

[pool]
min_workers = 2
max_workers = 6
default_worker_type = "lint"

[autoscaler]
evaluation_interval_seconds = 15

[autoscaler.policy]
min_pool_size = 2
max_pool_size = 6
cooldown_seconds = 90
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(config_path.to_str().unwrap())).unwrap();
        assert_eq!(config.scheduler.strategy, SchedulingStrategyKind::Adaptive);
        assert_eq!(config.scheduler.starvation_threshold_seconds, 120);
        assert_eq!(config.pool.min_workers, 2);
        assert_eq!(config.pool.default_worker_type, "lint");
        assert_eq!(config.autoscaler.evaluation_interval_seconds, 15);
        assert_eq!(config.autoscaler.policy.cooldown_seconds, 90);
        // 未配置的字段保持默认值
        assert_eq!(config.queue.default_timeout_seconds, 3600);
        assert_eq!(config.autoscaler.policy.scale_up_increment, 2);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");
        assert!(AppConfig::load(Some(missing.to_str().unwrap())).is_err());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("orchestrator.toml");
        fs::write(
            &config_path,
            r#"
[autoscaler.policy]
scale_up_threshold = 0.2
scale_down_threshold = 0.6
"#,
        )
        .unwrap();

        assert!(AppConfig::load(Some(config_path.to_str().unwrap())).is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("orchestrator.toml");
        fs::write(
            &config_path,
            r#"
[dispatch]
max_assignments_per_tick = 4
"#,
        )
        .unwrap();

        std::env::set_var("ORCHESTRATOR__DISPATCH__MAX_ASSIGNMENTS_PER_TICK", "7");
        let config = AppConfig::load(Some(config_path.to_str().unwrap()));
        std::env::remove_var("ORCHESTRATOR__DISPATCH__MAX_ASSIGNMENTS_PER_TICK");

        assert_eq!(config.unwrap().dispatch.max_assignments_per_tick, 7);
    }
}
