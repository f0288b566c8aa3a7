//! Bean 注册表 - 会话级的名称到 Provider 映射
//!
//! 注册表持有所有注册到它的 Provider 以及这些 Provider 构建的单例。
//! 获取时先检查请求的句柄类型再构建任何东西，并防止 Bean 的构建过程
//! 间接请求自身。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::{
    bean::{Bean, BeanType, CreationPolicy},
    creator::{BeanCreator, OwnedSingleton},
    error::{ContainerError, ContainerResult},
    provider::{BeanProvider, CreatorProvider, InstanceProvider},
};

/// 命名 Bean 注册表
///
/// # 示例
///
/// ```
/// use std::sync::Arc;
/// use corm_core::{BeanRegistry, PointerFactory, SharedSingleton};
///
/// let registry = BeanRegistry::new();
/// registry.register("greeting", SharedSingleton::new(|_| Ok(String::from("hello")))).unwrap();
/// registry
///     .register(
///         "shout",
///         PointerFactory::new(|registry| {
///             let greeting = registry.retrieve::<Arc<String>>("greeting")?;
///             Ok(greeting.to_uppercase())
///         }),
///     )
///     .unwrap();
///
/// let shout = registry.retrieve::<Box<String>>("shout").unwrap();
/// assert_eq!(*shout, "HELLO");
/// ```
pub struct BeanRegistry {
    /// Bean 名称 -> Provider
    providers: RwLock<HashMap<String, Arc<dyn BeanProvider>>>,

    /// 正在构建中的名称，最外层在前
    retrieval_stack: Mutex<Vec<String>>,
}

impl BeanRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            retrieval_stack: Mutex::new(Vec::new()),
        }
    }

    /// 以给定创建策略在 `name` 下注册 Bean
    pub fn register<C: BeanCreator>(&self, name: &str, creator: C) -> ContainerResult<()> {
        self.insert(name, Arc::new(CreatorProvider::new(creator)))
    }

    /// 以默认策略注册默认构造的 Bean
    ///
    /// 以 `Arc<T>` 获取。
    pub fn register_singleton<T: Bean + Default>(&self, name: &str) -> ContainerResult<()> {
        self.register(name, OwnedSingleton::<T>::default())
    }

    /// 注册外部持有的值
    ///
    /// 只保存别名：注册表既不延长值的生命周期，也不释放它。
    /// 以 [`Alias<T>`](crate::Alias) 获取。
    pub fn register_instance<T>(&self, name: &str, instance: &Arc<T>) -> ContainerResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(name, Arc::new(InstanceProvider::new(instance)))
    }

    fn insert(&self, name: &str, provider: Arc<dyn BeanProvider>) -> ContainerResult<()> {
        if name.is_empty() {
            return Err(ContainerError::EmptyName);
        }

        let mut providers = self.providers.write();
        if providers.contains_key(name) {
            tracing::warn!("Bean '{}' already exists, registration failed", name);
            return Err(ContainerError::DuplicateName(name.to_string()));
        }

        tracing::debug!(
            "Registered bean '{}' ({}, {})",
            name,
            provider.policy(),
            provider.bean_type()
        );
        providers.insert(name.to_string(), provider);
        Ok(())
    }

    /// 以句柄类型 `H` 获取 `name` 下注册的 Bean
    ///
    /// `H` 必须与该 Bean 策略产出的句柄类型完全一致。类型不符在 Provider
    /// 运行之前报告，注册表保持不变。
    pub fn retrieve<H: 'static>(&self, name: &str) -> ContainerResult<H> {
        tracing::trace!("Requesting bean: '{}'", name);

        let provider = self
            .providers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::UnknownName(name.to_string()))?;

        let expected = BeanType::of::<H>();
        let found = provider.bean_type();
        if expected != found {
            return Err(ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: expected.type_name,
                found: found.type_name,
            });
        }

        let _guard = RetrievalGuard::enter(&self.retrieval_stack, name)?;

        let handle = provider.produce(self)?;
        handle
            .downcast::<H>()
            .map(|handle| *handle)
            .map_err(|_| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: expected.type_name,
                found: found.type_name,
            })
    }

    /// 是否有以 `name` 注册的 Bean
    pub fn contains(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }

    /// 所有已注册 Bean 的名称（排序）
    pub fn bean_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// 调用方获取 `name` 时必须请求的句柄类型
    pub fn bean_type(&self, name: &str) -> Option<BeanType> {
        self.providers.read().get(name).map(|p| p.bean_type())
    }

    pub fn creation_policy(&self, name: &str) -> Option<CreationPolicy> {
        self.providers.read().get(name).map(|p| p.policy())
    }

    /// 当前正在构建的名称快照，最外层在前
    pub fn retrieval_stack(&self) -> Vec<String> {
        self.retrieval_stack.lock().clone()
    }

    /// 释放注册表持有的所有单例
    ///
    /// Provider 保持注册；之后获取的单例会重新构建。指向已释放引用单例的
    /// 别名变为悬空。
    pub fn destroy_singletons(&self) -> usize {
        tracing::info!("Destroying singleton beans");
        let released = self.release_all();
        tracing::info!("Singleton beans destruction completed, {} released", released);
        released
    }

    fn release_all(&self) -> usize {
        let providers: Vec<(String, Arc<dyn BeanProvider>)> = self
            .providers
            .read()
            .iter()
            .map(|(name, provider)| (name.clone(), Arc::clone(provider)))
            .collect();

        providers
            .iter()
            .map(|(name, provider)| provider.release(name))
            .sum()
    }
}

impl Default for BeanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BeanRegistry {
    fn drop(&mut self) {
        let released = self.release_all();
        if released > 0 {
            tracing::debug!("Bean registry dropped, {} singleton(s) released", released);
        }
    }
}

impl std::fmt::Debug for BeanRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanRegistry")
            .field("beans", &self.bean_names())
            .field("retrieval_stack", &self.retrieval_stack())
            .finish()
    }
}

/// 在一次获取期间把 `name` 保留在获取调用栈上
///
/// 在 drop 时出栈，成功与失败路径都会恢复调用栈。
struct RetrievalGuard<'a> {
    stack: &'a Mutex<Vec<String>>,
}

impl<'a> RetrievalGuard<'a> {
    fn enter(stack: &'a Mutex<Vec<String>>, name: &str) -> ContainerResult<Self> {
        let mut names = stack.lock();
        if names.iter().any(|n| n == name) {
            let mut chain = names.clone();
            chain.push(name.to_string());
            tracing::error!("Cyclic retrieval detected: {}", chain.join(" -> "));
            return Err(ContainerError::CyclicRetrieval { stack: chain });
        }
        names.push(name.to_string());
        Ok(Self { stack })
    }
}

impl Drop for RetrievalGuard<'_> {
    fn drop(&mut self) {
        self.stack.lock().pop();
    }
}
