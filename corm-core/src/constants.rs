//! 保留的 Bean 名称与配置键
//!
//! 集中定义，使上下文、日志初始化与示例程序使用相同的标识。

/// 上下文暴露 `Environment` 所用的 Bean 名称
pub const ENVIRONMENT_BEAN_NAME: &str = "environment";

/// 日志中使用的会话名称
pub const CONTEXT_NAME_KEY: &str = "corm.context.name";
pub const DEFAULT_CONTEXT_NAME: &str = "context";

/// 是否把环境注册为实例 Bean
pub const EXPOSE_ENVIRONMENT_KEY: &str = "corm.context.expose-environment";

/// 日志配置键
pub const LOGGING_LEVEL_KEY: &str = "logging.level";
pub const LOGGING_FORMAT_KEY: &str = "logging.format";
pub const LOGGING_FILTER_KEY: &str = "logging.filter";
pub const LOGGING_SHOW_TARGET_KEY: &str = "logging.show-target";

/// 上下文自行注册的 Bean 名称，配置不得声明
pub const RESERVED_BEAN_NAMES: &[&str] = &[ENVIRONMENT_BEAN_NAME];

/// `name` 是否为上下文保留的 Bean 名称
///
/// # 示例
/// ```
/// use corm_core::constants::is_reserved_bean_name;
///
/// assert!(is_reserved_bean_name("environment"));
/// assert!(!is_reserved_bean_name("userService"));
/// ```
pub fn is_reserved_bean_name(name: &str) -> bool {
    RESERVED_BEAN_NAMES.contains(&name)
}
