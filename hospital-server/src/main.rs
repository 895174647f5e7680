//! 医院管理服务器主程序

use anyhow::Context;
use clap::Parser;
use hospital_admin::{init_tracing, ConfigManager, HospitalConfig, LoggingConfig};
use hospital_database::{DatabasePool, PgHospitalStore, PoolSettings};
use hospital_scheduling::{MemoryHospital, SchedulingPolicy};
use hospital_web::{AppState, TokenIssuer, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 医院管理服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "hospital-server")]
#[command(about = "医院管理系统 HTTP 服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听地址
    #[arg(long)]
    host: Option<String>,

    /// 服务器端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut HospitalConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

async fn build_state(config: &HospitalConfig) -> anyhow::Result<AppState> {
    let tokens = TokenIssuer::new(&config.auth.secret, config.auth.token_lifetime_secs);

    match &config.database.url {
        Some(url) => {
            info!("使用PostgreSQL存储");
            let pool = DatabasePool::connect(&PoolSettings {
                url: url.clone(),
                max_connections: config.database.max_connections,
                min_connections: config.database.min_connections,
                connect_timeout: Duration::from_secs(config.database.connect_timeout_secs),
            })
            .await
            .context("failed to connect to database")?;
            pool.health_check().await.context("database health check failed")?;

            Ok(AppState::from_store(Arc::new(PgHospitalStore::new(pool)), tokens))
        }
        None => {
            info!("未配置数据库，使用内存存储");
            let hospital = MemoryHospital::new(SchedulingPolicy {
                appointment_minutes: config.scheduling.appointment_minutes,
                appointment_fee: config.billing.appointment_fee,
                surgery_fee: config.billing.surgery_fee,
            });
            Ok(AppState {
                credentials: hospital.directory.clone(),
                bookings: hospital.scheduler.clone(),
                ledger: hospital.ledger.clone(),
                records: hospital.records.clone(),
                tokens: Arc::new(tokens),
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 配置文件加载之前先按命令行级别输出日志
    let bootstrap = LoggingConfig {
        level: args.log_level.clone().unwrap_or_else(|| LoggingConfig::default().level),
        ..LoggingConfig::default()
    };
    let log = init_tracing(&bootstrap)?;

    let manager = ConfigManager::new(args.config.as_deref())?;
    manager.update_config(|config| args.apply(config)).await?;
    let config = manager.get_config().await;
    log.apply(&config.logging)?;

    info!("启动医院管理服务器...");
    info!("服务器配置:");
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  令牌有效期: {}秒", config.auth.token_lifetime_secs);
    info!("  门诊时长: {}分钟", config.scheduling.appointment_minutes);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;

    let state = build_state(&config).await?;
    let server = WebServer::new(addr, state);

    if let Err(e) = server.run().await {
        error!("服务器运行失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}
