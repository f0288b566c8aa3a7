//! Bean Provider - 类型擦除的 Bean 提供者
//!
//! [`BeanCreator`] 对句柄类型是泛型的，无法存放在异构映射中。
//! [`BeanProvider`] 把它包装成对象安全的接口，产出装箱句柄以及句柄的
//! [`BeanType`]，注册表在构建任何东西之前先检查类型。

use std::any::Any;
use std::sync::{Arc, Weak};

use crate::bean::{Alias, BeanType, CreationPolicy};
use crate::creator::BeanCreator;
use crate::error::ContainerResult;
use crate::registry::BeanRegistry;

/// Provider 产出的装箱句柄
pub type BoxedHandle = Box<dyn Any + Send + Sync>;

/// 存放在注册表中的对象安全生产者
pub trait BeanProvider: Send + Sync {
    /// 产出一个句柄
    fn produce(&self, registry: &BeanRegistry) -> ContainerResult<BoxedHandle>;

    /// [`BeanProvider::produce`] 返回的句柄类型
    fn bean_type(&self) -> BeanType;

    /// 背后的创建策略
    fn policy(&self) -> CreationPolicy;

    /// 释放注册表持有的存储，返回释放的实例数
    fn release(&self, _name: &str) -> usize {
        0
    }
}

/// 基于创建策略的 Provider
pub struct CreatorProvider<C> {
    creator: C,
}

impl<C: BeanCreator> CreatorProvider<C> {
    pub fn new(creator: C) -> Self {
        Self { creator }
    }
}

impl<C: BeanCreator> BeanProvider for CreatorProvider<C> {
    fn produce(&self, registry: &BeanRegistry) -> ContainerResult<BoxedHandle> {
        let handle = self.creator.create(registry)?;
        Ok(Box::new(handle))
    }

    fn bean_type(&self) -> BeanType {
        BeanType::of::<C::Output>()
    }

    fn policy(&self) -> CreationPolicy {
        self.creator.policy()
    }

    fn release(&self, name: &str) -> usize {
        self.creator.release(name)
    }
}

/// 外部持有值的 Provider
///
/// 只保留弱引用，注册表既不延长值的生命周期，也不释放它。
pub struct InstanceProvider<T: ?Sized> {
    target: Weak<T>,
}

impl<T: ?Sized + Send + Sync + 'static> InstanceProvider<T> {
    pub fn new(target: &Arc<T>) -> Self {
        Self {
            target: Arc::downgrade(target),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> BeanProvider for InstanceProvider<T> {
    fn produce(&self, _registry: &BeanRegistry) -> ContainerResult<BoxedHandle> {
        Ok(Box::new(Alias::from_weak(self.target.clone())))
    }

    fn bean_type(&self) -> BeanType {
        BeanType::of::<Alias<T>>()
    }

    fn policy(&self) -> CreationPolicy {
        CreationPolicy::Instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creator::{PointerFactory, SharedSingleton};

    #[test]
    fn test_creator_provider_reports_handle_type() {
        let provider = CreatorProvider::new(PointerFactory::<String>::default());
        assert_eq!(provider.bean_type(), BeanType::of::<Box<String>>());
        assert_eq!(provider.policy(), CreationPolicy::PointerFactory);

        let provider = CreatorProvider::new(SharedSingleton::<String>::default());
        assert_eq!(provider.bean_type(), BeanType::of::<Arc<String>>());
    }

    #[test]
    fn test_instance_provider_does_not_own() {
        let registry = BeanRegistry::new();
        let owner = Arc::new(String::from("external"));
        let provider = InstanceProvider::new(&owner);

        let handle = provider.produce(&registry).unwrap();
        let alias = handle.downcast::<Alias<String>>().unwrap();
        assert!(alias.aliases(&owner));
        assert_eq!(Arc::strong_count(&owner), 1);

        drop(owner);
        assert!(alias.is_dangling());
    }
}
