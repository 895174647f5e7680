//! 配置管理
//!
//! 配置来源依次为：内置默认值 → 配置文件（可选）→ `HOSPITAL_` 前缀的环境变量，
//! 嵌套字段用 `__` 分隔，例如 `HOSPITAL_AUTH__SECRET`。

use std::sync::Arc;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};
use anyhow::{Result, Context};
use tracing::{info, warn, error};
use config::{Config, Environment, File};

/// 开发环境使用的默认签名密钥
pub const DEV_SECRET: &str = "dev-only-secret-change-me-before-deploying!!";

/// 门诊时长上限：一整天
const MAX_APPOINTMENT_MINUTES: i64 = 24 * 60;

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<HospitalConfig>>,
    /// 配置验证器
    validator: ConfigValidator,
}

/// 系统完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HospitalConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 认证配置
    pub auth: AuthConfig,
    /// 排期配置
    pub scheduling: SchedulingConfig,
    /// 计费配置
    pub billing: BillingConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 连接字符串，未设置时使用进程内存储
    pub url: Option<String>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 连接超时时间（秒）
    pub connect_timeout_secs: u64,
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 令牌签名密钥
    pub secret: String,
    /// 令牌有效期（秒）
    pub token_lifetime_secs: i64,
}

/// 排期配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// 门诊预约占用时长（分钟）
    pub appointment_minutes: i64,
}

/// 计费配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// 门诊预约费用
    pub appointment_fee: i64,
    /// 每台手术费用
    pub surgery_fee: i64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（EnvFilter 语法）
    pub level: String,
    /// 是否输出彩色日志
    pub ansi: bool,
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&HospitalConfig) -> Result<()>,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new(config_path: Option<&str>) -> Result<Self> {
        let config = Self::load_config(config_path)?;
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            validator,
        })
    }

    /// 加载配置
    fn load_config(config_path: Option<&str>) -> Result<HospitalConfig> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("HOSPITAL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: HospitalConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match config_path {
            Some(path) => info!("Configuration loaded from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 获取配置
    pub async fn get_config(&self) -> HospitalConfig {
        self.config.read().await.clone()
    }

    /// 在当前配置上应用修改（如命令行覆盖），修改后的配置通过校验才会生效
    pub async fn update_config<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut HospitalConfig),
    {
        let mut updated = self.get_config().await;
        update(&mut updated);
        self.validator.validate(&updated)?;

        *self.config.write().await = updated;
        info!("Configuration updated");
        Ok(())
    }
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| {
                    if config.server.port == 0 {
                        Err(anyhow::anyhow!("Server port cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "database.max_connections",
                validator: |config| {
                    if config.database.max_connections == 0 {
                        Err(anyhow::anyhow!("Database max connections cannot be 0"))
                    } else if config.database.min_connections > config.database.max_connections {
                        Err(anyhow::anyhow!("Database min connections exceed max connections"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "auth.secret",
                validator: |config| {
                    if config.auth.secret.len() < 32 {
                        Err(anyhow::anyhow!("Token secret must be at least 32 bytes"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "auth.token_lifetime_secs",
                validator: |config| {
                    if (60..=3600).contains(&config.auth.token_lifetime_secs) {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("Token lifetime must be between 60 and 3600 seconds"))
                    }
                },
            },
            ValidationRule {
                field_path: "scheduling.appointment_minutes",
                validator: |config| {
                    if (1..=MAX_APPOINTMENT_MINUTES).contains(&config.scheduling.appointment_minutes) {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!(
                            "Appointment length must be between 1 and {} minutes",
                            MAX_APPOINTMENT_MINUTES
                        ))
                    }
                },
            },
            ValidationRule {
                field_path: "billing",
                validator: |config| {
                    if config.billing.appointment_fee <= 0 || config.billing.surgery_fee <= 0 {
                        Err(anyhow::anyhow!("Fees must be positive"))
                    } else {
                        Ok(())
                    }
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &HospitalConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(e.context(format!("Invalid configuration value: {}", rule.field_path)));
            }
        }

        if config.auth.secret == DEV_SECRET {
            warn!("Using the built-in development token secret; set HOSPITAL_AUTH__SECRET in production");
        }

        info!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 5,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: DEV_SECRET.to_string(),
            token_lifetime_secs: 900,
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self { appointment_minutes: 60 }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            appointment_fee: 50,
            surgery_fee: 500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}
