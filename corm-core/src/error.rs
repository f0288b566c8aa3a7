//! 错误类型 - 注册表与配置装配器
//!
//! crate 中所有可失败操作都返回 [`ContainerResult`]。配置钩子抛出的错误
//! 也走同一类型：用户代码通过 `anyhow` 把任意失败转换为
//! [`ContainerError::Lifecycle`]，而钩子内部抛出的注册表错误会原样从
//! 装配中返回。
//!
//! # 示例
//!
//! ```
//! use corm_core::{BeanRegistry, ContainerError};
//!
//! let registry = BeanRegistry::new();
//! match registry.retrieve::<u32>("missing") {
//!     Err(ContainerError::UnknownName(name)) => assert_eq!(name, "missing"),
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

use std::fmt;

/// crate 统一使用的 Result 别名
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// Bean 注册、获取与配置装配产生的错误
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Bean 名称为空
    #[error("Invalid bean name \"\": bean name cannot be empty")]
    EmptyName,

    /// 名称已被占用
    #[error("Invalid bean name \"{0}\": bean is already registered")]
    DuplicateName(String),

    /// 没有以该名称注册的 Bean
    #[error("Invalid bean name \"{0}\": no bean of that name available")]
    UnknownName(String),

    /// 存储的 Bean 类型与请求的不符
    #[error("Invalid bean type for \"{name}\": wanted {expected} but was {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Bean 的构建过程间接请求了自身
    #[error("Cyclic retrieval detected: {}", render_chain(.stack))]
    CyclicRetrieval {
        /// 检测时的获取调用栈，以重复的名称结尾
        stack: Vec<String>,
    },

    /// 剩余配置之间存在循环依赖
    #[error("Dependency cycle detected: {}", render_cycle(.path))]
    CycleDetected {
        /// 裁剪后的 `configuration::resource` 循环，不含结尾重复
        path: Vec<String>,
    },

    /// 剩余配置等待的 Bean 没有任何配置会产出
    #[error("Unable to assemble configurations: {}", render_unresolved(.configurations))]
    UnresolvedDependencies {
        configurations: Vec<UnresolvedConfiguration>,
    },

    /// 配置在资源尚缺时被构建
    #[error("Unable to create configuration {configuration} due to missing resources: [{}]", .missing.join(", "))]
    MissingResources {
        configuration: String,
        missing: Vec<String>,
    },

    /// 配置源无法加载或解析
    #[error("Configuration error: {0}")]
    Config(String),

    /// 无法安装 tracing subscriber
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    /// 配置生命周期钩子抛出的不透明错误
    #[error(transparent)]
    Lifecycle(#[from] anyhow::Error),
}

/// 装配后仍在等待的配置及其缺失资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedConfiguration {
    pub name: String,
    pub missing: Vec<String>,
}

impl fmt::Display for UnresolvedConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is missing [{}]", self.name, self.missing.join(", "))
    }
}

fn render_chain(stack: &[String]) -> String {
    stack.join(" -> ")
}

fn render_cycle(path: &[String]) -> String {
    match path.first() {
        Some(first) => format!("{} -> {}", path.join(" -> "), first),
        None => String::from("[]"),
    }
}

fn render_unresolved(configurations: &[UnresolvedConfiguration]) -> String {
    configurations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_closes_the_loop() {
        let err = ContainerError::CycleDetected {
            path: vec!["A::y".to_string(), "B::x".to_string()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: A::y -> B::x -> A::y");
    }

    #[test]
    fn test_unresolved_display_names_configuration_and_resource() {
        let err = ContainerError::UnresolvedDependencies {
            configurations: vec![UnresolvedConfiguration {
                name: "Consumer".to_string(),
                missing: vec!["database".to_string(), "cache".to_string()],
            }],
        };
        let message = err.to_string();
        assert!(message.contains("Consumer"));
        assert!(message.contains("database, cache"));
    }

    #[test]
    fn test_lifecycle_error_is_transparent() {
        let err: ContainerError = anyhow::anyhow!("post init exploded").into();
        assert_eq!(err.to_string(), "post init exploded");
        assert!(matches!(err, ContainerError::Lifecycle(_)));
    }
}
