use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use orchestrator::{Application, LoggingProvisioner, LoopTickers, ShutdownManager};
use orchestrator_config::{AppConfig, LogFormat as ConfigLogFormat};
use orchestrator_domain::ports::SystemClock;
use orchestrator_observability::{init_metrics, init_structured_logging, LogFormat, LoggingConfig};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("orchestrator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("任务编排控制平面")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时查找默认位置"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("覆盖配置中的日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("覆盖配置中的日志格式")
                .value_parser(["json", "pretty", "compact"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");

    let mut config = AppConfig::load(config_path.map(String::as_str)).with_context(|| {
        format!(
            "加载配置失败: {}",
            config_path.map(String::as_str).unwrap_or("<默认位置>")
        )
    })?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
    }

    init_structured_logging(LoggingConfig {
        level: config.observability.log_level.clone(),
        format: match config.observability.log_format {
            ConfigLogFormat::Json => LogFormat::Json,
            ConfigLogFormat::Pretty => LogFormat::Pretty,
            ConfigLogFormat::Compact => LogFormat::Compact,
        },
        ..LoggingConfig::default()
    })
    .context("初始化日志系统失败")?;

    info!("启动任务编排控制平面");

    if config.observability.metrics_enabled {
        let address: SocketAddr = config
            .observability
            .metrics_listen_address
            .parse()
            .with_context(|| {
                format!(
                    "无效的指标监听地址: {}",
                    config.observability.metrics_listen_address
                )
            })?;
        init_metrics(address)?;
    }

    let tickers = LoopTickers::from_config(&config);
    let app = Arc::new(Application::new(
        config,
        Arc::new(LoggingProvisioner::new()),
        Arc::new(SystemClock),
    )?);

    // 创建优雅关闭管理器
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe();
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            if let Err(e) = app.run(tickers, shutdown_rx).await {
                error!("控制平面运行失败: {e}");
            }
        })
    };

    wait_for_shutdown_signal().await;

    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown();

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("控制平面已优雅关闭"),
        Ok(Err(e)) => error!("控制平面关闭时发生错误: {e}"),
        Err(_) => warn!("控制平面关闭超时，强制退出"),
    }

    info!("任务编排控制平面已退出");
    Ok(())
}

/// 等待关闭信号
///
/// 信号处理器安装失败时只记录错误，并继续等待另一种信号。
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
