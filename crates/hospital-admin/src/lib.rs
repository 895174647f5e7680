//! # 医院系统管理模块
//!
//! 提供配置加载、校验以及日志初始化等运维功能

pub mod config;
pub mod logging;

pub use config::{
    AuthConfig, BillingConfig, ConfigManager, ConfigValidator, DatabaseConfig, HospitalConfig,
    LoggingConfig, SchedulingConfig, ServerConfig,
};
pub use logging::{init_tracing, LogHandle};
