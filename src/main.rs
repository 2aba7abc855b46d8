use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use compute_engine::{wait_for_shutdown_signal, EngineContainer, EngineLifecycle};
use engine_core::{init_logging, AppConfig};
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("compute-engine")
        .version("1.0.0")
        .about("计算引擎任务队列服务")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时按默认路径查找"),
        )
        .arg(
            Arg::new("node-id")
                .long("node-id")
                .value_name("ID")
                .help("集群节点ID，覆盖配置文件"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let node_id = matches.get_one::<String>("node-id");
    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    let log_format = matches
        .get_one::<String>("log-format")
        .map(String::as_str)
        .unwrap_or("pretty");

    init_logging(log_level, log_format)?;

    info!("启动计算引擎");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    let mut config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("<默认路径>")))?;
    if let Some(id) = node_id {
        config.cluster.node_id = Some(id.clone());
    }

    let container = EngineContainer::build(config).await?;
    let lifecycle = Arc::new(EngineLifecycle::new(Arc::new(container)));

    if let Err(e) = lifecycle.startup().await {
        error!("计算引擎启动失败: {e}");
        if let Err(e) = lifecycle.shutdown().await {
            error!("启动失败后关闭计算引擎出错: {e}");
        }
        return Err(e.into());
    }

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");

    let stopping = {
        let lifecycle = Arc::clone(&lifecycle);
        async move {
            if let Err(e) = lifecycle.stop_processing().await {
                warn!("停止Worker失败: {e}");
            }
            lifecycle.shutdown().await
        }
    };

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, stopping).await {
        Ok(Ok(())) => info!("计算引擎已优雅关闭"),
        Ok(Err(e)) => error!("计算引擎关闭时发生错误: {e}"),
        Err(_) => warn!("计算引擎关闭超时，强制退出"),
    }

    info!("计算引擎已退出");
    Ok(())
}
