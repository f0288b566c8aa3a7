//! 创建策略
//!
//! 创建策略决定 Bean 构建的频率以及产物的所有者。所有权由策略固定，
//! 与其产出的句柄类型无关：
//!
//! | 策略                   | 句柄       | 构建         | 所有者            |
//! |------------------------|------------|--------------|-------------------|
//! | [`ValueSingleton`]     | `T`        | 一次，克隆   | 每个调用方        |
//! | [`ReferenceSingleton`] | `Alias<T>` | 一次         | 注册表            |
//! | [`OwnedSingleton`]     | `Arc<T>`   | 一次         | 注册表            |
//! | [`ValueFactory`]       | `T`        | 每次调用     | 调用方            |
//! | [`PointerFactory`]     | `Box<T>`   | 每次调用     | 调用方            |
//! | [`SharedSingleton`]    | `Arc<T>`   | 一次         | 共享              |
//! | [`SharedFactory`]      | `Arc<T>`   | 每次调用     | 共享              |
//!
//! 单例在首次获取时惰性构建。每种策略都由接收注册表的闭包构建，
//! 因此 Bean 在构建过程中可以获取它所依赖的 Bean。

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bean::{Alias, Bean, CreationPolicy};
use crate::error::ContainerResult;
use crate::registry::BeanRegistry;

/// 所有策略共用的装箱构造器
pub type Constructor<T> = Box<dyn Fn(&BeanRegistry) -> ContainerResult<T> + Send + Sync>;

/// 创建策略 - 产出 [`BeanCreator::Output`] 类型的句柄
pub trait BeanCreator: Send + Sync + 'static {
    /// 调用方获取的句柄类型
    type Output: Any + Send + Sync;

    /// 产出一个句柄，策略需要时构建底层实例
    fn create(&self, registry: &BeanRegistry) -> ContainerResult<Self::Output>;

    /// 本创建器实现的策略
    fn policy(&self) -> CreationPolicy;

    /// 释放注册表通过本创建器持有的一切
    ///
    /// 返回释放的实例数。
    fn release(&self, _name: &str) -> usize {
        0
    }
}

/// 单例存储槽（惰性填充）
///
/// 构造器运行期间从不持有锁，因此构造器可以从同一注册表获取其他 Bean。
struct SingletonSlot<S> {
    slot: Mutex<Option<S>>,
}

impl<S> SingletonSlot<S> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    fn take(&self) -> Option<S> {
        self.slot.lock().take()
    }
}

impl<S: Clone> SingletonSlot<S> {
    fn get_or_try_init<F>(&self, init: F) -> ContainerResult<S>
    where
        F: FnOnce() -> ContainerResult<S>,
    {
        if let Some(existing) = self.slot.lock().as_ref() {
            return Ok(existing.clone());
        }

        tracing::debug!("Creating singleton instance of {}", std::any::type_name::<S>());
        let built = init()?;
        let mut slot = self.slot.lock();
        Ok(slot.get_or_insert(built).clone())
    }
}

macro_rules! constructors {
    ($policy:ident) => {
        impl<T: Bean> $policy<T> {
            /// 从可获取其他 Bean 的构造器创建策略
            pub fn new<F>(constructor: F) -> Self
            where
                F: Fn(&BeanRegistry) -> ContainerResult<T> + Send + Sync + 'static,
            {
                Self::from_constructor(Box::new(constructor))
            }

            /// 从不会失败的构造器创建策略
            pub fn from_fn<F>(constructor: F) -> Self
            where
                F: Fn() -> T + Send + Sync + 'static,
            {
                Self::new(move |_| Ok(constructor()))
            }
        }

        impl<T: Bean + Default> Default for $policy<T> {
            fn default() -> Self {
                Self::new(|_| Ok(T::default()))
            }
        }
    };
}

/// 按值返回的单例
///
/// 每次获取得到缓存实例的一份克隆，一个调用方的修改对其他调用方不可见。
pub struct ValueSingleton<T> {
    constructor: Constructor<T>,
    instance: SingletonSlot<T>,
}

impl<T: Bean> ValueSingleton<T> {
    fn from_constructor(constructor: Constructor<T>) -> Self {
        Self {
            constructor,
            instance: SingletonSlot::new(),
        }
    }
}

constructors!(ValueSingleton);

impl<T: Bean + Clone> BeanCreator for ValueSingleton<T> {
    type Output = T;

    fn create(&self, registry: &BeanRegistry) -> ContainerResult<T> {
        self.instance
            .get_or_try_init(|| (self.constructor)(registry))
    }

    fn policy(&self) -> CreationPolicy {
        CreationPolicy::ValueSingleton
    }

    fn release(&self, _name: &str) -> usize {
        self.instance.take().map_or(0, |_| 1)
    }
}

/// 由注册表持有、以 [`Alias`] 返回的单例
pub struct ReferenceSingleton<T> {
    constructor: Constructor<T>,
    instance: SingletonSlot<Arc<T>>,
}

impl<T: Bean> ReferenceSingleton<T> {
    fn from_constructor(constructor: Constructor<T>) -> Self {
        Self {
            constructor,
            instance: SingletonSlot::new(),
        }
    }
}

constructors!(ReferenceSingleton);

impl<T: Bean> BeanCreator for ReferenceSingleton<T> {
    type Output = Alias<T>;

    fn create(&self, registry: &BeanRegistry) -> ContainerResult<Alias<T>> {
        let instance = self
            .instance
            .get_or_try_init(|| (self.constructor)(registry).map(Arc::new))?;
        Ok(Alias::new(&instance))
    }

    fn policy(&self) -> CreationPolicy {
        CreationPolicy::ReferenceSingleton
    }

    fn release(&self, name: &str) -> usize {
        match self.instance.take() {
            Some(instance) => {
                tracing::debug!(
                    "Releasing reference singleton '{}', {} alias(es) will dangle",
                    name,
                    Arc::weak_count(&instance)
                );
                1
            }
            None => 0,
        }
    }
}

/// 由注册表持有、以指针返回的单例
///
/// 注册表持有所有权句柄并在销毁时释放；此时仍持有指针的调用方会被记录警告。
pub struct OwnedSingleton<T> {
    constructor: Constructor<T>,
    instance: SingletonSlot<Arc<T>>,
}

impl<T: Bean> OwnedSingleton<T> {
    fn from_constructor(constructor: Constructor<T>) -> Self {
        Self {
            constructor,
            instance: SingletonSlot::new(),
        }
    }
}

constructors!(OwnedSingleton);

impl<T: Bean> BeanCreator for OwnedSingleton<T> {
    type Output = Arc<T>;

    fn create(&self, registry: &BeanRegistry) -> ContainerResult<Arc<T>> {
        self.instance
            .get_or_try_init(|| (self.constructor)(registry).map(Arc::new))
    }

    fn policy(&self) -> CreationPolicy {
        CreationPolicy::OwnedSingleton
    }

    fn release(&self, name: &str) -> usize {
        match self.instance.take() {
            Some(instance) => {
                let outstanding = Arc::strong_count(&instance) - 1;
                if outstanding > 0 {
                    tracing::warn!(
                        "Owned singleton '{}' released while {} caller handle(s) still exist",
                        name,
                        outstanding
                    );
                }
                1
            }
            None => 0,
        }
    }
}

/// 每次获取产生新值
pub struct ValueFactory<T> {
    constructor: Constructor<T>,
}

impl<T: Bean> ValueFactory<T> {
    fn from_constructor(constructor: Constructor<T>) -> Self {
        Self { constructor }
    }
}

constructors!(ValueFactory);

impl<T: Bean> BeanCreator for ValueFactory<T> {
    type Output = T;

    fn create(&self, registry: &BeanRegistry) -> ContainerResult<T> {
        (self.constructor)(registry)
    }

    fn policy(&self) -> CreationPolicy {
        CreationPolicy::ValueFactory
    }
}

/// 每次获取产生新的堆分配
///
/// 注册表不记录它交出的东西：每个 `Box` 归调用方所有，丢弃即释放。
pub struct PointerFactory<T> {
    constructor: Constructor<T>,
}

impl<T: Bean> PointerFactory<T> {
    fn from_constructor(constructor: Constructor<T>) -> Self {
        Self { constructor }
    }
}

constructors!(PointerFactory);

impl<T: Bean> BeanCreator for PointerFactory<T> {
    type Output = Box<T>;

    fn create(&self, registry: &BeanRegistry) -> ContainerResult<Box<T>> {
        (self.constructor)(registry).map(Box::new)
    }

    fn policy(&self) -> CreationPolicy {
        CreationPolicy::PointerFactory
    }
}

/// 注册表与调用方共享的引用计数单例
pub struct SharedSingleton<T> {
    constructor: Constructor<T>,
    instance: SingletonSlot<Arc<T>>,
}

impl<T: Bean> SharedSingleton<T> {
    fn from_constructor(constructor: Constructor<T>) -> Self {
        Self {
            constructor,
            instance: SingletonSlot::new(),
        }
    }
}

constructors!(SharedSingleton);

impl<T: Bean> BeanCreator for SharedSingleton<T> {
    type Output = Arc<T>;

    fn create(&self, registry: &BeanRegistry) -> ContainerResult<Arc<T>> {
        self.instance
            .get_or_try_init(|| (self.constructor)(registry).map(Arc::new))
    }

    fn policy(&self) -> CreationPolicy {
        CreationPolicy::SharedSingleton
    }

    fn release(&self, _name: &str) -> usize {
        self.instance.take().map_or(0, |_| 1)
    }
}

/// 每次获取产生新的引用计数实例
pub struct SharedFactory<T> {
    constructor: Constructor<T>,
}

impl<T: Bean> SharedFactory<T> {
    fn from_constructor(constructor: Constructor<T>) -> Self {
        Self { constructor }
    }
}

constructors!(SharedFactory);

impl<T: Bean> BeanCreator for SharedFactory<T> {
    type Output = Arc<T>;

    fn create(&self, registry: &BeanRegistry) -> ContainerResult<Arc<T>> {
        (self.constructor)(registry).map(Arc::new)
    }

    fn policy(&self) -> CreationPolicy {
        CreationPolicy::SharedFactory
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    /// 可通过共享句柄修改值的测试夹具
    #[derive(Debug, Default)]
    pub(crate) struct Dummy {
        value: AtomicI32,
    }

    impl Dummy {
        pub(crate) fn with_value(value: i32) -> Self {
            Self {
                value: AtomicI32::new(value),
            }
        }

        pub(crate) fn value(&self) -> i32 {
            self.value.load(Ordering::SeqCst)
        }

        pub(crate) fn set_value(&self, value: i32) {
            self.value.store(value, Ordering::SeqCst);
        }
    }

    impl Clone for Dummy {
        fn clone(&self) -> Self {
            Self::with_value(self.value())
        }
    }

    #[test]
    fn test_reference_singleton_aliases_one_instance() {
        let registry = BeanRegistry::new();
        let creator = ReferenceSingleton::<Dummy>::default();

        let first = creator.create(&registry).unwrap();
        let second = creator.create(&registry).unwrap();
        assert!(first.ptr_eq(&second));

        first.upgrade().unwrap().set_value(5);
        assert_eq!(second.upgrade().unwrap().value(), 5);
    }

    #[test]
    fn test_reference_singleton_release_dangles_aliases() {
        let registry = BeanRegistry::new();
        let creator = ReferenceSingleton::<Dummy>::default();
        let alias = creator.create(&registry).unwrap();

        assert_eq!(creator.release("dummy"), 1);
        assert!(alias.is_dangling());
        assert_eq!(creator.release("dummy"), 0);
    }

    #[test]
    fn test_owned_singleton_keeps_identity() {
        let registry = BeanRegistry::new();
        let creator = OwnedSingleton::<Dummy>::default();

        let first = creator.create(&registry).unwrap();
        let second = creator.create(&registry).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.value(), 0);

        first.set_value(5);
        assert_eq!(second.value(), 5);
    }

    #[test]
    fn test_value_singleton_hands_out_copies() {
        let registry = BeanRegistry::new();
        let creator = ValueSingleton::new(|_| Ok(Dummy::with_value(7)));

        let first = creator.create(&registry).unwrap();
        let second = creator.create(&registry).unwrap();
        first.set_value(1);
        assert_eq!(second.value(), 7);
    }

    #[test]
    fn test_value_factory_builds_fresh_values() {
        let registry = BeanRegistry::new();
        let creator = ValueFactory::<Dummy>::default();

        let first = creator.create(&registry).unwrap();
        let second = creator.create(&registry).unwrap();
        first.set_value(5);
        assert_eq!(first.value(), 5);
        assert_eq!(second.value(), 0);
    }

    #[test]
    fn test_pointer_factory_allocates_every_call() {
        let registry = BeanRegistry::new();
        let creator = PointerFactory::<Dummy>::default();

        let first = creator.create(&registry).unwrap();
        let second = creator.create(&registry).unwrap();
        assert!(!std::ptr::eq(&*first, &*second));
        assert_eq!(first.value(), second.value());

        first.set_value(5);
        assert_eq!(second.value(), 0);
    }

    #[test]
    fn test_shared_policies() {
        let registry = BeanRegistry::new();

        let singleton = SharedSingleton::<Dummy>::default();
        let a = singleton.create(&registry).unwrap();
        let b = singleton.create(&registry).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let factory = SharedFactory::<Dummy>::default();
        let c = factory.create(&registry).unwrap();
        let d = factory.create(&registry).unwrap();
        assert!(!Arc::ptr_eq(&c, &d));
    }

    #[test]
    fn test_failed_construction_is_retried() {
        use std::sync::atomic::AtomicUsize;

        let registry = BeanRegistry::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let creator = OwnedSingleton::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow::anyhow!("first attempt fails").into())
            } else {
                Ok(Dummy::with_value(3))
            }
        });

        assert!(creator.create(&registry).is_err());
        assert_eq!(creator.create(&registry).unwrap().value(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
