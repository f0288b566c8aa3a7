// corm-core: 命名 Bean 注册表与配置装配器
//
// 提供：
// - 七种创建策略（单例/工厂，值/引用/指针/共享）
// - 带类型检查与循环检索检测的 Bean 获取
// - 按依赖顺序装配配置单元，并诊断循环依赖或缺失资源

pub mod bean;
pub mod config;
pub mod configuration;
pub mod constants;
pub mod context;
pub mod creator;
pub mod cycle;
pub mod error;
pub mod logging;
pub mod provider;
pub mod registry;

// 重新导出常用类型
pub use bean::{Alias, Bean, BeanType, CreationPolicy, Ownership};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use configuration::{
    Configuration, ConfigurationDefinition, ConfigurationDescriptor, ConfigurationState,
    ConfigurationWrapper,
};
pub use context::{Context, ContextBuilder};
pub use creator::{
    BeanCreator, OwnedSingleton, PointerFactory, ReferenceSingleton, SharedFactory,
    SharedSingleton, ValueFactory, ValueSingleton,
};
pub use cycle::CycleChecker;
pub use error::{ContainerError, ContainerResult, UnresolvedConfiguration};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use provider::BeanProvider;
pub use registry::BeanRegistry;

/// Prelude - 常用导入
pub mod prelude {
    pub use crate::{
        Alias, BeanRegistry, Configuration, ConfigurationDefinition, ConfigurationDescriptor,
        ContainerError, ContainerResult, Context, CreationPolicy, Environment, OwnedSingleton,
        PointerFactory, ReferenceSingleton, SharedFactory, SharedSingleton, ValueFactory,
        ValueSingleton,
    };
}
