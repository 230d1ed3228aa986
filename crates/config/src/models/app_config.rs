use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    autoscaler::AutoscalerConfig, dispatch::DispatchConfig, observability::ObservabilityConfig,
    pool::PoolConfig, queue::QueueConfig, scheduler::SchedulerConfig,
};
use crate::validation::{ConfigValidator, ValidationUtils};

/// 环境变量前缀，例如 `ORCHESTRATOR__POOL__MAX_WORKERS=20`
pub const ENV_PREFIX: &str = "ORCHESTRATOR";

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/orchestrator.toml",
    "orchestrator.toml",
    "/etc/orchestrator/config.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub queue: QueueConfig,
    pub pool: PoolConfig,
    pub autoscaler: AutoscalerConfig,
    pub dispatch: DispatchConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置：TOML 文件在前，环境变量覆盖在后
    ///
    /// 未指定路径时依次查找默认位置，都不存在则只使用内置默认值。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate().context("配置校验失败")?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate().context("配置校验失败")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.scheduler.validate()?;
        self.queue.validate()?;
        self.pool.validate()?;
        self.autoscaler.validate()?;
        self.dispatch.validate()?;
        self.observability.validate()?;

        // 扩缩容决策必须落在池管理器能执行的范围内
        let policy = &self.autoscaler.policy;
        ValidationUtils::validate_bounds(
            self.pool.min_workers,
            policy.min_pool_size,
            "pool.min_workers",
            "autoscaler.policy.min_pool_size",
        )?;
        ValidationUtils::validate_bounds(
            policy.max_pool_size,
            self.pool.max_workers,
            "autoscaler.policy.max_pool_size",
            "pool.max_workers",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::SchedulingStrategyKind;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.scheduler.strategy, SchedulingStrategyKind::Priority);
        assert_eq!(config.scheduler.starvation_threshold_seconds, 300);
        assert_eq!(config.queue.default_max_retries, 3);
        assert_eq!(config.pool.heartbeat_timeout_seconds, 30);
        assert_eq!(config.autoscaler.policy.cooldown_seconds, 60);
        assert_eq!(config.autoscaler.policy.scale_up_increment, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_toml_round_trip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().expect("Failed to serialize");
        let parsed = AppConfig::from_toml(&toml_str).expect("Failed to parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [scheduler]
            strategy = "edf"

            [pool]
            max_workers = 20

            [autoscaler.policy]
            min_pool_size = 2
            max_pool_size = 20
            "#,
        )
        .expect("Failed to parse");

        assert_eq!(config.scheduler.strategy, SchedulingStrategyKind::Edf);
        assert_eq!(config.autoscaler.policy.min_pool_size, 2);
        assert_eq!(config.autoscaler.policy.max_pool_size, 20);
        assert_eq!(config.autoscaler.policy.scale_up_threshold, 0.8);
        assert_eq!(config.pool.max_workers, 20);
        assert_eq!(config.pool.min_workers, 1);
    }

    #[test]
    fn test_policy_bounds_must_fit_pool_bounds() {
        let result = AppConfig::from_toml(
            r#"
            [pool]
            max_workers = 10

            [autoscaler.policy]
            max_pool_size = 20
            "#,
        );
        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("autoscaler.policy.max_pool_size"));

        let result = AppConfig::from_toml(
            r#"
            [pool]
            min_workers = 3
            max_workers = 10

            [autoscaler.policy]
            min_pool_size = 1
            max_pool_size = 10
            "#,
        );
        assert!(result.is_err());

        let config = AppConfig::from_toml(
            r#"
            [pool]
            min_workers = 1
            max_workers = 12

            [autoscaler.policy]
            min_pool_size = 2
            max_pool_size = 8
            "#,
        )
        .expect("Failed to parse");
        assert_eq!(config.autoscaler.policy.max_pool_size, 8);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let result = AppConfig::from_toml(
            r#"
            [pool]
            min_workers = 8
            max_workers = 4
            "#,
        );
        assert!(result.is_err());

        let result = AppConfig::from_toml(
            r#"
            [scheduler]
            strategy = "round_robin"
            "#,
        );
        assert!(result.is_err());
    }
}
