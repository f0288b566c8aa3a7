use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, Weak};

/// Bean trait - 可存放在注册表中的类型
pub trait Bean: Any + Send + Sync {}

impl<T: Any + Send + Sync> Bean for T {}

/// Bean 的声明类型描述
///
/// 即获取 Bean 时调用方必须指定的类型，也就是 provider 产出的*句柄*类型
/// （`Arc<T>`、`Alias<T>`、`Box<T>` 或 `T`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeanType {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl BeanType {
    pub fn of<T: ?Sized + Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl fmt::Display for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// 创建策略 - 注册 Bean 时选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreationPolicy {
    /// 只构建一次，每次获取返回一份克隆
    ValueSingleton,
    /// 只构建一次，由注册表持有，调用方得到 [`Alias`]
    ReferenceSingleton,
    /// 只构建一次，由注册表持有，调用方得到指向它的指针
    OwnedSingleton,
    /// 每次获取产生新值
    ValueFactory,
    /// 每次获取产生新分配，由调用方持有
    PointerFactory,
    /// 只构建一次，注册表与调用方共享所有权
    SharedSingleton,
    /// 每次获取产生新的引用计数实例
    SharedFactory,
    /// 外部持有的值，以别名注册
    Instance,
}

impl CreationPolicy {
    /// 该策略产物由谁负责释放
    pub fn ownership(self) -> Ownership {
        match self {
            CreationPolicy::ValueSingleton | CreationPolicy::ValueFactory => Ownership::Copied,
            CreationPolicy::ReferenceSingleton | CreationPolicy::OwnedSingleton => {
                Ownership::Registry
            }
            CreationPolicy::PointerFactory => Ownership::Caller,
            CreationPolicy::SharedSingleton | CreationPolicy::SharedFactory => Ownership::Shared,
            CreationPolicy::Instance => Ownership::External,
        }
    }

    /// 每个注册表生命周期内是否至多构建一次
    pub fn is_singleton(self) -> bool {
        matches!(
            self,
            CreationPolicy::ValueSingleton
                | CreationPolicy::ReferenceSingleton
                | CreationPolicy::OwnedSingleton
                | CreationPolicy::SharedSingleton
        )
    }
}

impl Default for CreationPolicy {
    fn default() -> Self {
        CreationPolicy::OwnedSingleton
    }
}

impl fmt::Display for CreationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CreationPolicy::ValueSingleton => "value-singleton",
            CreationPolicy::ReferenceSingleton => "reference-singleton",
            CreationPolicy::OwnedSingleton => "owned-singleton",
            CreationPolicy::ValueFactory => "value-factory",
            CreationPolicy::PointerFactory => "pointer-factory",
            CreationPolicy::SharedSingleton => "shared-singleton",
            CreationPolicy::SharedFactory => "shared-factory",
            CreationPolicy::Instance => "instance",
        };
        f.write_str(name)
    }
}

/// 所有权约定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// 每个调用方拿到自己的副本
    Copied,
    /// 注册表持有实例，销毁时释放
    Registry,
    /// 调用方持有结果并负责释放
    Caller,
    /// 注册表与调用方之间引用计数
    Shared,
    /// 由注册表之外持有，注册表从不释放
    External,
}

/// 别名 - 不拥有存储的 Bean 句柄
///
/// 引用单例与实例注册都返回别名。只要持有者（引用单例为注册表，
/// 实例为注册它的配置）还保留着值，别名就有效；之后
/// [`Alias::upgrade`] 返回 `None`。
pub struct Alias<T: ?Sized> {
    target: Weak<T>,
}

impl<T: ?Sized> Alias<T> {
    pub fn new(target: &Arc<T>) -> Self {
        Self {
            target: Arc::downgrade(target),
        }
    }

    pub(crate) fn from_weak(target: Weak<T>) -> Self {
        Self { target }
    }

    /// 访问别名指向的值（持有者仍存活时）
    pub fn upgrade(&self) -> Option<Arc<T>> {
        self.target.upgrade()
    }

    /// 持有者已释放该值
    pub fn is_dangling(&self) -> bool {
        self.target.strong_count() == 0
    }

    /// 两个别名指向同一存储
    pub fn ptr_eq(&self, other: &Alias<T>) -> bool {
        Weak::ptr_eq(&self.target, &other.target)
    }

    /// 别名指向 `owner` 背后的存储
    pub fn aliases(&self, owner: &Arc<T>) -> bool {
        Weak::ptr_eq(&self.target, &Arc::downgrade(owner))
    }
}

impl<T: ?Sized> Clone for Alias<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Alias<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alias")
            .field("type_name", &std::any::type_name::<T>())
            .field("dangling", &self.is_dangling())
            .finish()
    }
}
