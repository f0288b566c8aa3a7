//! 配置单元
//!
//! 配置声明它需要的 Bean（即*资源*）以及它产出的 Bean。当所有资源都已
//! 出现在注册表中时，[`Context`](crate::Context) 构建它并运行生命周期钩子：
//! 先 [`Configuration::post_init`]，再 [`Configuration::provide_beans`]。
//!
//! 构建出的实例在整个会话期间存活，因此配置可以注册指向自身存储的别名。

use std::fmt;
use std::sync::Arc;

use crate::error::{ContainerError, ContainerResult};
use crate::registry::BeanRegistry;

/// 已构建配置的生命周期钩子
pub trait Configuration: Send + 'static {
    /// 在提供任何 Bean 之前准备内部状态
    fn post_init(&mut self) -> ContainerResult<()> {
        Ok(())
    }

    /// 注册本配置的 Bean
    fn provide_beans(&mut self, _registry: &BeanRegistry) -> ContainerResult<()> {
        Ok(())
    }
}

/// 资源就绪后构建配置实例
pub type ConfigurationFactory =
    Arc<dyn Fn(&BeanRegistry) -> ContainerResult<Box<dyn Configuration>> + Send + Sync>;

/// 配置类型的静态声明
///
/// 实现者通过关联函数描述自身，描述符可由 [`ConfigurationDescriptor::of`] 导出。
pub trait ConfigurationDefinition: Configuration + Sized {
    fn name() -> &'static str;

    /// 构建配置前必须已注册的 Bean
    fn resources() -> &'static [&'static str] {
        &[]
    }

    /// 配置在 `provide_beans` 中注册的 Bean
    fn beans() -> &'static [&'static str] {
        &[]
    }

    /// 与本配置一并调度的配置
    fn dependencies() -> Vec<ConfigurationDescriptor> {
        Vec::new()
    }

    fn construct(registry: &BeanRegistry) -> ContainerResult<Self>;
}

/// 配置的声明式描述
///
/// # 示例
///
/// ```
/// use corm_core::{BeanRegistry, Configuration, ConfigurationDescriptor, ContainerResult, SharedSingleton};
///
/// struct Database;
///
/// impl Configuration for Database {
///     fn provide_beans(&mut self, registry: &BeanRegistry) -> ContainerResult<()> {
///         registry.register("url", SharedSingleton::new(|_| Ok(String::from("sqlite::memory:"))))
///     }
/// }
///
/// let descriptor = ConfigurationDescriptor::new("Database", |_| Ok(Database)).provides(["url"]);
/// assert_eq!(descriptor.beans(), ["url"]);
/// ```
#[derive(Clone)]
pub struct ConfigurationDescriptor {
    name: String,
    resources: Vec<String>,
    beans: Vec<String>,
    dependencies: Vec<ConfigurationDescriptor>,
    factory: ConfigurationFactory,
}

impl ConfigurationDescriptor {
    pub fn new<C, F>(name: impl Into<String>, factory: F) -> Self
    where
        C: Configuration,
        F: Fn(&BeanRegistry) -> ContainerResult<C> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            resources: Vec::new(),
            beans: Vec::new(),
            dependencies: Vec::new(),
            factory: Arc::new(move |registry: &BeanRegistry| {
                let instance = factory(registry)?;
                Ok(Box::new(instance) as Box<dyn Configuration>)
            }),
        }
    }

    /// 从静态声明描述配置类型
    pub fn of<C: ConfigurationDefinition>() -> Self {
        let mut descriptor = Self::new(C::name(), C::construct)
            .requires(C::resources().iter().copied())
            .provides(C::beans().iter().copied());
        descriptor.dependencies = C::dependencies();
        descriptor
    }

    /// 添加需要的 Bean 名称
    pub fn requires<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources.extend(resources.into_iter().map(Into::into));
        self
    }

    /// 添加产出的 Bean 名称
    pub fn provides<I, S>(mut self, beans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.beans.extend(beans.into_iter().map(Into::into));
        self
    }

    /// 调度本配置时一并调度 `dependency`
    pub fn depends_on(mut self, dependency: ConfigurationDescriptor) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn beans(&self) -> &[String] {
        &self.beans
    }

    pub fn dependencies(&self) -> &[ConfigurationDescriptor] {
        &self.dependencies
    }
}

impl fmt::Debug for ConfigurationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationDescriptor")
            .field("name", &self.name)
            .field("resources", &self.resources)
            .field("beans", &self.beans)
            .field(
                "dependencies",
                &self.dependencies.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// 已调度配置的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationState {
    Declared,
    /// 部分资源尚未注册
    Waiting,
    /// 所有资源均已注册
    Satisfied,
    /// 实例已构建，钩子尚未运行
    Built,
    /// `post_init` 与 `provide_beans` 已完成
    Initialized,
    /// 由上下文保留至会话结束
    Active,
}

impl fmt::Display for ConfigurationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigurationState::Declared => "declared",
            ConfigurationState::Waiting => "waiting",
            ConfigurationState::Satisfied => "satisfied",
            ConfigurationState::Built => "built",
            ConfigurationState::Initialized => "initialized",
            ConfigurationState::Active => "active",
        };
        f.write_str(name)
    }
}

/// 已调度的配置及其仍在等待的资源
pub struct ConfigurationWrapper {
    descriptor: ConfigurationDescriptor,
    waiting: Vec<String>,
    state: ConfigurationState,
    instance: Option<Box<dyn Configuration>>,
}

impl ConfigurationWrapper {
    pub fn new(descriptor: ConfigurationDescriptor) -> Self {
        let waiting = descriptor.resources.clone();
        Self {
            descriptor,
            waiting,
            state: ConfigurationState::Declared,
            instance: None,
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &ConfigurationDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> ConfigurationState {
        self.state
    }

    /// 注册表中尚不存在的资源（按声明顺序）
    pub fn waiting_resources(&self) -> &[String] {
        &self.waiting
    }

    /// 移除注册表已持有的资源并更新状态
    ///
    /// 构建之后调用无效果。
    pub fn refresh(&mut self, registry: &BeanRegistry) -> ConfigurationState {
        if matches!(
            self.state,
            ConfigurationState::Declared | ConfigurationState::Waiting | ConfigurationState::Satisfied
        ) {
            self.waiting.retain(|resource| !registry.contains(resource));
            let next = if self.waiting.is_empty() {
                ConfigurationState::Satisfied
            } else {
                ConfigurationState::Waiting
            };
            self.transition(next);
        }
        self.state
    }

    pub fn is_satisfied(&self) -> bool {
        self.waiting.is_empty()
    }

    /// 构建配置实例
    ///
    /// 任何资源仍不在注册表中时返回 [`ContainerError::MissingResources`]。
    pub fn build(&mut self, registry: &BeanRegistry) -> ContainerResult<()> {
        if self.refresh(registry) != ConfigurationState::Satisfied {
            return Err(ContainerError::MissingResources {
                configuration: self.name().to_string(),
                missing: self.waiting.clone(),
            });
        }

        let instance = (self.descriptor.factory)(registry)?;
        self.instance = Some(instance);
        self.transition(ConfigurationState::Built);
        Ok(())
    }

    /// 在已构建实例上依次运行 `post_init` 与 `provide_beans`
    ///
    /// 钩子失败时丢弃实例，错误原样返回。
    pub fn initialize(&mut self, registry: &BeanRegistry) -> ContainerResult<()> {
        let Some(instance) = self.instance.as_mut() else {
            return Err(ContainerError::Lifecycle(anyhow::anyhow!(
                "configuration {} has not been built",
                self.descriptor.name
            )));
        };

        let result = instance
            .post_init()
            .and_then(|()| instance.provide_beans(registry));

        if let Err(e) = result {
            tracing::debug!(
                "Configuration '{}' failed to initialize, releasing instance",
                self.descriptor.name
            );
            self.instance = None;
            self.state = ConfigurationState::Satisfied;
            return Err(e);
        }

        for bean in &self.descriptor.beans {
            if !registry.contains(bean) {
                tracing::warn!(
                    "Configuration '{}' declares bean '{}' but did not provide it",
                    self.descriptor.name,
                    bean
                );
            }
        }

        self.transition(ConfigurationState::Initialized);
        Ok(())
    }

    pub(crate) fn activate(&mut self) {
        self.transition(ConfigurationState::Active);
    }

    fn transition(&mut self, next: ConfigurationState) {
        if self.state != next {
            tracing::debug!(
                "Configuration '{}': {} -> {}",
                self.descriptor.name,
                self.state,
                next
            );
            self.state = next;
        }
    }
}

impl fmt::Debug for ConfigurationWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationWrapper")
            .field("name", &self.descriptor.name)
            .field("state", &self.state)
            .field("waiting", &self.waiting)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creator::{OwnedSingleton, SharedSingleton};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        calls: Arc<parking_lot::Mutex<Vec<&'static str>>>,
    }

    impl Configuration for Recorder {
        fn post_init(&mut self) -> ContainerResult<()> {
            self.calls.lock().push("post_init");
            Ok(())
        }

        fn provide_beans(&mut self, registry: &BeanRegistry) -> ContainerResult<()> {
            self.calls.lock().push("provide_beans");
            registry.register("recorded", SharedSingleton::new(|_| Ok(1_u8)))
        }
    }

    #[test]
    fn test_refresh_shrinks_waiting_set() {
        let registry = BeanRegistry::new();
        let descriptor = ConfigurationDescriptor::new("Consumer", |_| Ok(Recorder {
            calls: Default::default(),
        }))
        .requires(["a", "b"]);
        let mut wrapper = ConfigurationWrapper::new(descriptor);
        assert_eq!(wrapper.state(), ConfigurationState::Declared);

        assert_eq!(wrapper.refresh(&registry), ConfigurationState::Waiting);
        assert_eq!(wrapper.waiting_resources(), ["a", "b"]);

        registry.register("b", SharedSingleton::new(|_| Ok(0_u8))).unwrap();
        wrapper.refresh(&registry);
        assert_eq!(wrapper.waiting_resources(), ["a"]);
        assert!(!wrapper.is_satisfied());

        registry.register("a", SharedSingleton::new(|_| Ok(0_u8))).unwrap();
        assert_eq!(wrapper.refresh(&registry), ConfigurationState::Satisfied);
        assert!(wrapper.is_satisfied());
    }

    #[test]
    fn test_build_refuses_missing_resources() {
        let registry = BeanRegistry::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let descriptor = ConfigurationDescriptor::new("Consumer", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Recorder {
                calls: Default::default(),
            })
        })
        .requires(["database"]);
        let mut wrapper = ConfigurationWrapper::new(descriptor);

        let err = wrapper.build(&registry).unwrap_err();
        match err {
            ContainerError::MissingResources { configuration, missing } => {
                assert_eq!(configuration, "Consumer");
                assert_eq!(missing, vec!["database"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_hooks_run_in_order() {
        let registry = BeanRegistry::new();
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let shared = Arc::clone(&calls);
        let descriptor = ConfigurationDescriptor::new("Recorder", move |_| {
            Ok(Recorder {
                calls: Arc::clone(&shared),
            })
        })
        .provides(["recorded"]);
        let mut wrapper = ConfigurationWrapper::new(descriptor);

        wrapper.build(&registry).unwrap();
        assert_eq!(wrapper.state(), ConfigurationState::Built);
        wrapper.initialize(&registry).unwrap();
        assert_eq!(wrapper.state(), ConfigurationState::Initialized);

        assert_eq!(*calls.lock(), vec!["post_init", "provide_beans"]);
        assert!(registry.contains("recorded"));
    }

    #[test]
    fn test_initialize_before_build_fails() {
        let registry = BeanRegistry::new();
        let mut wrapper = ConfigurationWrapper::new(ConfigurationDescriptor::new("Idle", |_| {
            Ok(Recorder {
                calls: Default::default(),
            })
        }));
        assert!(matches!(
            wrapper.initialize(&registry),
            Err(ContainerError::Lifecycle(_))
        ));
    }

    struct Declared;

    impl Configuration for Declared {
        fn provide_beans(&mut self, registry: &BeanRegistry) -> ContainerResult<()> {
            registry.register("declared", OwnedSingleton::<String>::default())
        }
    }

    impl ConfigurationDefinition for Declared {
        fn name() -> &'static str {
            "Declared"
        }

        fn resources() -> &'static [&'static str] {
            &["input"]
        }

        fn beans() -> &'static [&'static str] {
            &["declared"]
        }

        fn construct(_registry: &BeanRegistry) -> ContainerResult<Self> {
            Ok(Declared)
        }
    }

    #[test]
    fn test_descriptor_from_definition() {
        let descriptor = ConfigurationDescriptor::of::<Declared>();
        assert_eq!(descriptor.name(), "Declared");
        assert_eq!(descriptor.resources(), ["input"]);
        assert_eq!(descriptor.beans(), ["declared"]);
        assert!(descriptor.dependencies().is_empty());
    }
}
