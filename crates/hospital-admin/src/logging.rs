//! 日志初始化
//!
//! 服务器在读取配置文件之前就要能输出日志，因此先按命令行级别安装订阅者，
//! 配置加载完成后再通过 [`LogHandle`] 替换过滤器和输出格式。

use anyhow::{Context, Result};
use tracing::debug;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::config::LoggingConfig;

type FilteredRegistry = Layered<reload::Layer<EnvFilter, Registry>, Registry>;
type OutputLayer = fmt::Layer<FilteredRegistry>;

/// 已安装订阅者的重载句柄
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    output: reload::Handle<OutputLayer, FilteredRegistry>,
    /// `RUST_LOG` 存在时配置中的级别不生效
    env_override: bool,
}

impl LogHandle {
    /// 按最终配置更新日志级别与输出格式
    pub fn apply(&self, config: &LoggingConfig) -> Result<()> {
        if !self.env_override {
            let filter = build_filter(&config.level)?;
            self.filter
                .reload(filter)
                .context("Failed to reload log filter")?;
        }
        self.output
            .modify(|layer| layer.set_ansi(config.ansi))
            .context("Failed to update log output")?;

        debug!("Logging configured with level {}", config.level);
        Ok(())
    }
}

/// 根据配置构造过滤器
fn build_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).with_context(|| format!("Invalid log filter: {}", level))
}

/// 初始化全局 tracing 订阅者
///
/// 设置了 `RUST_LOG` 时优先使用环境变量，否则使用传入的级别。
pub fn init_tracing(config: &LoggingConfig) -> Result<LogHandle> {
    let (filter, env_override) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (build_filter(&config.level)?, false),
    };

    let (filter, filter_handle) = reload::Layer::new(filter);
    let output: OutputLayer = fmt::layer().with_ansi(config.ansi).with_target(true);
    let (output, output_handle) = reload::Layer::new(output);

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(LogHandle {
        filter: filter_handle,
        output: output_handle,
        env_override,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        assert!(build_filter("info").is_ok());
        assert!(build_filter("hospital_web=debug,tower_http=info,warn").is_ok());
    }

    #[test]
    fn test_build_filter_rejects_garbage() {
        assert!(build_filter("hospital_web=loud").is_err());
    }

    #[test]
    fn test_handle_applies_loaded_config() {
        // 全局订阅者只能安装一次，整个测试进程里只有这里安装
        let handle = init_tracing(&LoggingConfig::default()).unwrap();

        let loaded = LoggingConfig {
            level: "hospital_admin=debug,warn".to_string(),
            ansi: false,
        };
        assert!(handle.apply(&loaded).is_ok());

        let broken = LoggingConfig {
            level: "hospital_admin=loud".to_string(),
            ansi: false,
        };
        assert_eq!(handle.apply(&broken).is_err(), !handle.env_override);
    }
}
