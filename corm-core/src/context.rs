//! 装配上下文
//!
//! [`Context`] 是一次装配会话：持有 Bean 注册表、仍在等待资源的配置以及
//! 已激活的配置。[`Context::assemble`] 通过多轮遍历按依赖顺序构建配置，
//! 直到无法再构建为止，然后解释剩余的配置。

use std::fmt;
use std::sync::Arc;

use crate::{
    config::{Environment, PropertySource},
    configuration::{ConfigurationDescriptor, ConfigurationState, ConfigurationWrapper},
    constants,
    cycle::CycleChecker,
    error::{ContainerError, ContainerResult, UnresolvedConfiguration},
    registry::BeanRegistry,
};

/// 基于一个注册表的装配会话
///
/// # 示例
///
/// ```
/// use std::sync::Arc;
/// use corm_core::prelude::*;
///
/// struct Database;
/// impl Configuration for Database {
///     fn provide_beans(&mut self, registry: &BeanRegistry) -> ContainerResult<()> {
///         registry.register("url", SharedSingleton::new(|_| Ok(String::from("sqlite::memory:"))))
///     }
/// }
///
/// struct Repository;
/// impl Configuration for Repository {
///     fn provide_beans(&mut self, registry: &BeanRegistry) -> ContainerResult<()> {
///         registry.register(
///             "repository",
///             SharedSingleton::new(|registry| {
///                 let url = registry.retrieve::<Arc<String>>("url")?;
///                 Ok(format!("repository on {}", url))
///             }),
///         )
///     }
/// }
///
/// let mut context = Context::new().unwrap();
/// context.add_configurations([
///     ConfigurationDescriptor::new("Repository", |_| Ok(Repository))
///         .requires(["url"])
///         .provides(["repository"]),
///     ConfigurationDescriptor::new("Database", |_| Ok(Database)).provides(["url"]),
/// ]).unwrap();
/// context.assemble().unwrap();
///
/// let repository = context.retrieve::<Arc<String>>("repository").unwrap();
/// assert_eq!(*repository, "repository on sqlite::memory:");
/// assert_eq!(context.passes(), 2);
/// ```
pub struct Context {
    /// 会话名称（日志用）
    name: String,

    registry: Arc<BeanRegistry>,

    environment: Arc<Environment>,

    /// 已调度但尚未构建的配置（按调度顺序）
    waiting: Vec<ConfigurationWrapper>,

    /// 已构建的配置，保留至会话关闭
    active: Vec<ConfigurationWrapper>,

    /// 上次装配中有进展的轮数
    passes: usize,

    /// 注册表由本会话创建（外部传入的共享注册表不在关闭时销毁单例）
    owns_registry: bool,

    closed: bool,
}

impl Context {
    /// 使用空环境创建上下文
    pub fn new() -> ContainerResult<Self> {
        ContextBuilder::new().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<BeanRegistry> {
        &self.registry
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// 从会话的注册表获取 Bean
    pub fn retrieve<H: 'static>(&self, name: &str) -> ContainerResult<H> {
        self.registry.retrieve(name)
    }

    /// 调度一个配置及其依赖的所有配置
    ///
    /// 依赖按深度优先展开，并调度在引用它们的配置之前。名称已在等待或
    /// 已激活的配置会被跳过。若任何待调度配置声明的 Bean 已在注册表中，
    /// 或使用了上下文保留的名称，返回 [`ContainerError::DuplicateName`]，
    /// 此时不调度任何配置。
    pub fn add_configuration(&mut self, descriptor: ConfigurationDescriptor) -> ContainerResult<()> {
        let mut batch = Vec::new();
        self.expand(descriptor, &mut batch, &mut Vec::new());

        for descriptor in &batch {
            if let Some(bean) = descriptor
                .beans()
                .iter()
                .find(|b| constants::is_reserved_bean_name(b))
            {
                tracing::warn!(
                    "Configuration '{}' declares reserved bean name '{}'",
                    descriptor.name(),
                    bean
                );
                return Err(ContainerError::DuplicateName(bean.clone()));
            }
            if let Some(bean) = descriptor.beans().iter().find(|b| self.registry.contains(b)) {
                tracing::warn!(
                    "Configuration '{}' declares bean '{}' which is already registered",
                    descriptor.name(),
                    bean
                );
                return Err(ContainerError::DuplicateName(bean.clone()));
            }
        }

        for descriptor in batch {
            let mut wrapper = ConfigurationWrapper::new(descriptor);
            wrapper.refresh(&self.registry);
            tracing::debug!(
                "Scheduled configuration '{}' in '{}'",
                wrapper.name(),
                self.name
            );
            self.waiting.push(wrapper);
        }

        Ok(())
    }

    pub fn add_configurations<I>(&mut self, descriptors: I) -> ContainerResult<()>
    where
        I: IntoIterator<Item = ConfigurationDescriptor>,
    {
        for descriptor in descriptors {
            self.add_configuration(descriptor)?;
        }
        Ok(())
    }

    fn expand(
        &self,
        descriptor: ConfigurationDescriptor,
        batch: &mut Vec<ConfigurationDescriptor>,
        visiting: &mut Vec<String>,
    ) {
        let name = descriptor.name().to_string();
        if self.is_scheduled(&name)
            || visiting.contains(&name)
            || batch.iter().any(|d| d.name() == name)
        {
            return;
        }

        visiting.push(name);
        for dependency in descriptor.dependencies() {
            self.expand(dependency.clone(), batch, visiting);
        }
        visiting.pop();
        batch.push(descriptor);
    }

    fn is_scheduled(&self, name: &str) -> bool {
        self.waiting
            .iter()
            .chain(self.active.iter())
            .any(|w| w.name() == name)
    }

    /// 构建所有资源可满足的已调度配置
    ///
    /// 每一轮构建访问时已满足的所有配置，因此配置可以使用同一轮中较早
    /// 提供的 Bean。重复遍历直到某一轮没有构建任何配置。
    ///
    /// 对剩余配置进行诊断：存在循环依赖时返回
    /// [`ContainerError::CycleDetected`]，否则
    /// [`ContainerError::UnresolvedDependencies`] 列出各自仍缺少的资源。
    /// 构建或初始化配置时抛出的错误原样返回；该配置被释放，
    /// 已激活的配置及其 Bean 保持不变。
    pub fn assemble(&mut self) -> ContainerResult<()> {
        tracing::info!(
            "Assembling {} configuration(s) in '{}'",
            self.waiting.len(),
            self.name
        );
        self.passes = 0;

        loop {
            let mut progressed = false;
            let mut index = 0;

            while index < self.waiting.len() {
                if self.waiting[index].refresh(&self.registry) != ConfigurationState::Satisfied {
                    index += 1;
                    continue;
                }

                let mut wrapper = self.waiting.remove(index);
                if let Err(e) = wrapper
                    .build(&self.registry)
                    .and_then(|()| wrapper.initialize(&self.registry))
                {
                    tracing::debug!(
                        "Configuration '{}' failed, releasing it: {}",
                        wrapper.name(),
                        e
                    );
                    return Err(e);
                }

                wrapper.activate();
                self.active.push(wrapper);
                progressed = true;
            }

            if !progressed {
                break;
            }
            self.passes += 1;
            tracing::debug!("Pass {} of '{}' completed", self.passes, self.name);
        }

        if self.waiting.is_empty() {
            tracing::info!(
                "Assembled '{}': {} configuration(s) active after {} pass(es)",
                self.name,
                self.active.len(),
                self.passes
            );
            return Ok(());
        }

        if let Some(path) = CycleChecker::from_waiting(&self.waiting).find_cycle() {
            let err = ContainerError::CycleDetected { path };
            tracing::error!("{}", err);
            return Err(err);
        }

        let configurations = self
            .waiting
            .iter()
            .map(|wrapper| UnresolvedConfiguration {
                name: wrapper.name().to_string(),
                missing: wrapper.waiting_resources().to_vec(),
            })
            .collect();
        Err(ContainerError::UnresolvedDependencies { configurations })
    }

    /// 上次 [`Context::assemble`] 中有进展的轮数
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// 已激活配置的名称（按构建顺序）
    pub fn active_configurations(&self) -> Vec<String> {
        self.active.iter().map(|w| w.name().to_string()).collect()
    }

    /// 仍在等待的配置名称（按调度顺序）
    pub fn waiting_configurations(&self) -> Vec<String> {
        self.waiting.iter().map(|w| w.name().to_string()).collect()
    }

    pub fn configuration_state(&self, name: &str) -> Option<ConfigurationState> {
        self.waiting
            .iter()
            .chain(self.active.iter())
            .find(|w| w.name() == name)
            .map(|w| w.state())
    }

    /// 结束会话
    ///
    /// 释放等待中与已激活的配置；若注册表由本会话创建，再释放其持有的
    /// 所有单例。通过 [`ContextBuilder::registry`] 传入的注册表保留其单例。
    /// 至多执行一次；drop 上下文时自动关闭。
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        tracing::info!("Closing '{}'", self.name);
        self.waiting.clear();
        while let Some(wrapper) = self.active.pop() {
            tracing::debug!("Releasing configuration '{}'", wrapper.name());
        }

        if self.owns_registry {
            self.registry.destroy_singletons();
        } else {
            tracing::debug!("Registry of '{}' is shared, keeping its singletons", self.name);
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("registry", &self.registry)
            .field("waiting", &self.waiting)
            .field("active", &self.active)
            .field("passes", &self.passes)
            .field("owns_registry", &self.owns_registry)
            .finish()
    }
}

/// 上下文构建器
pub struct ContextBuilder {
    name: Option<String>,
    environment: Arc<Environment>,
    registry: Option<Arc<BeanRegistry>>,
    configurations: Vec<ConfigurationDescriptor>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            environment: Arc::new(Environment::new()),
            registry: None,
            configurations: Vec::new(),
        }
    }

    /// 会话名称，覆盖 `corm.context.name`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn environment(mut self, environment: Arc<Environment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn add_property_source(self, source: Box<dyn PropertySource>) -> Self {
        self.environment.add_property_source(source);
        self
    }

    /// 装配到已有注册表而非新建注册表
    pub fn registry(mut self, registry: Arc<BeanRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn configuration(mut self, descriptor: ConfigurationDescriptor) -> Self {
        self.configurations.push(descriptor);
        self
    }

    pub fn build(self) -> ContainerResult<Context> {
        let name = self.name.unwrap_or_else(|| {
            self.environment
                .get_string_or(constants::CONTEXT_NAME_KEY, constants::DEFAULT_CONTEXT_NAME)
        });
        let (registry, owns_registry) = match self.registry {
            Some(registry) => (registry, false),
            None => (Arc::new(BeanRegistry::new()), true),
        };

        // 先注册环境 Bean，失败时还没有会话需要关闭
        if self
            .environment
            .get_bool_or(constants::EXPOSE_ENVIRONMENT_KEY, true)
        {
            registry.register_instance(constants::ENVIRONMENT_BEAN_NAME, &self.environment)?;
        }

        let mut context = Context {
            name,
            registry,
            environment: self.environment,
            waiting: Vec::new(),
            active: Vec::new(),
            passes: 0,
            owns_registry,
            closed: false,
        };

        context.add_configurations(self.configurations)?;
        tracing::debug!("Context '{}' built", context.name);
        Ok(context)
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
