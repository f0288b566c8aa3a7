use std::fmt;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter, Layer, Registry};

use crate::config::Environment;
use crate::constants::{
    LOGGING_FILTER_KEY, LOGGING_FORMAT_KEY, LOGGING_LEVEL_KEY, LOGGING_SHOW_TARGET_KEY,
};
use crate::error::{ContainerError, ContainerResult};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 紧凑格式（默认）
    Compact,
    /// 完整格式
    Full,
    Json,
    /// 美化格式（适合开发）
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(name)
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,

    /// 是否显示目标（模块路径）
    pub show_target: bool,

    pub show_thread_ids: bool,
    pub show_thread_names: bool,

    /// 自定义过滤器，例如 "corm_core=debug,app_demo=info"
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_ids: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 从环境变量读取：`RUST_LOG`, `LOG_LEVEL`, `LOG_FORMAT`
    ///
    /// 无法解析的值会被忽略。
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            config.filter = Some(rust_log);
        }
        if let Some(level) = std::env::var("LOG_LEVEL").ok().and_then(|s| s.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = std::env::var("LOG_FORMAT").ok().and_then(|s| s.parse().ok()) {
            config.format = format;
        }

        config
    }

    /// 从 Environment 读取 `logging.*` 配置
    ///
    /// 无效的级别或格式字符串返回 [`ContainerError::Config`]。
    pub fn from_environment(environment: &Environment) -> ContainerResult<Self> {
        let mut config = Self::default();

        if let Some(level) = environment.get_string(LOGGING_LEVEL_KEY) {
            config.level = level.parse().map_err(ContainerError::Config)?;
        }
        if let Some(format) = environment.get_string(LOGGING_FORMAT_KEY) {
            config.format = format.parse().map_err(ContainerError::Config)?;
        }
        config.filter = environment.get_string(LOGGING_FILTER_KEY);
        config.show_target = environment.get_bool_or(LOGGING_SHOW_TARGET_KEY, false);

        Ok(config)
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }

    /// 初始化全局日志订阅者
    ///
    /// 已安装全局 subscriber 时失败。
    pub fn init(self) -> ContainerResult<()> {
        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            LogFormat::Compact => fmt_layer::layer()
                .compact()
                .with_target(self.show_target)
                .with_thread_ids(self.show_thread_ids)
                .with_thread_names(self.show_thread_names)
                .boxed(),
            LogFormat::Full => fmt_layer::layer()
                .with_target(self.show_target)
                .with_thread_ids(self.show_thread_ids)
                .with_thread_names(self.show_thread_names)
                .boxed(),
            LogFormat::Json => fmt_layer::layer()
                .json()
                .with_target(self.show_target)
                .boxed(),
            LogFormat::Pretty => fmt_layer::layer()
                .pretty()
                .with_target(self.show_target)
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(layer)
            .with(self.env_filter())
            .try_init()
            .map_err(|e| ContainerError::LoggingInitFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapPropertySource;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" trace ".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Debug.to_string(), "debug");
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Compact.to_string(), "compact");
    }

    #[test]
    fn test_from_environment() {
        let environment = Environment::new();
        environment.add_property_source(Box::new(
            MapPropertySource::new("logging")
                .with_property(LOGGING_LEVEL_KEY, "debug")
                .with_property(LOGGING_FORMAT_KEY, "json")
                .with_property(LOGGING_SHOW_TARGET_KEY, true)
                .with_property(LOGGING_FILTER_KEY, "corm_core=trace"),
        ));

        let config = LoggingConfig::from_environment(&environment).unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.show_target);
        assert_eq!(config.filter.as_deref(), Some("corm_core=trace"));
    }

    #[test]
    fn test_from_environment_rejects_bad_level() {
        let environment = Environment::new();
        environment.add_property_source(Box::new(
            MapPropertySource::new("logging").with_property(LOGGING_LEVEL_KEY, "loud"),
        ));

        let err = LoggingConfig::from_environment(&environment).unwrap_err();
        assert!(matches!(err, ContainerError::Config(ref msg) if msg.contains("loud")));
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = LoggingConfig::from_environment(&Environment::new()).unwrap();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.filter.is_none());
    }
}
