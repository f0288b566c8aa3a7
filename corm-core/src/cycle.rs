//! 循环依赖诊断 - 针对装配后仍未解决的配置
//!
//! 节点是 `configuration::resource` 对。从一个节点出发，沿资源找到产出它的
//! 配置，再继续访问该配置仍在等待的每个资源。在当前路径上再次访问到
//! 某个节点即为循环。

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::configuration::ConfigurationWrapper;

/// 遍历等待中配置的“需要/由谁产出”图
#[derive(Debug, Default)]
pub struct CycleChecker {
    /// 配置名 -> 仍在等待的资源
    resources: BTreeMap<String, BTreeSet<String>>,

    /// Bean 名 -> 声明它的配置
    sources: BTreeMap<String, String>,
}

impl CycleChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 基于等待中的配置构建检查器
    pub fn from_waiting<'a, I>(waiting: I) -> Self
    where
        I: IntoIterator<Item = &'a ConfigurationWrapper>,
    {
        let mut checker = Self::new();
        for wrapper in waiting {
            checker.add(
                wrapper.name(),
                wrapper.waiting_resources().iter().cloned(),
                wrapper.descriptor().beans().iter().cloned(),
            );
        }
        checker
    }

    /// 记录一个配置及其缺失资源和产出的 Bean
    pub fn add<R, B>(&mut self, configuration: &str, resources: R, beans: B)
    where
        R: IntoIterator<Item = String>,
        B: IntoIterator<Item = String>,
    {
        self.resources
            .entry(configuration.to_string())
            .or_default()
            .extend(resources);
        for bean in beans {
            self.sources.insert(bean, configuration.to_string());
        }
    }

    /// 查找循环，裁剪为从第一个重复节点开始
    ///
    /// 返回的路径末尾不重复第一个元素。
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut finished = HashSet::new();
        let mut path = Vec::new();

        for (configuration, resources) in &self.resources {
            for resource in resources {
                let node = compound(configuration, resource);
                if finished.contains(&node) {
                    continue;
                }
                if let Some(cycle) = self.walk(configuration, resource, &mut finished, &mut path) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    fn walk(
        &self,
        configuration: &str,
        resource: &str,
        finished: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        let node = compound(configuration, resource);

        if let Some(start) = path.iter().position(|n| *n == node) {
            return Some(path[start..].to_vec());
        }
        if finished.contains(&node) {
            return None;
        }

        path.push(node.clone());

        let next = self
            .sources
            .get(resource)
            .and_then(|producer| self.resources.get_key_value(producer));
        if let Some((producer, requirements)) = next {
            for requirement in requirements {
                if let Some(cycle) = self.walk(producer, requirement, finished, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        finished.insert(node);
        None
    }
}

fn compound(configuration: &str, resource: &str) -> String {
    format!("{}::{}", configuration, resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_two_configuration_cycle() {
        let mut checker = CycleChecker::new();
        checker.add("A", names(&["y"]), names(&["x"]));
        checker.add("B", names(&["x"]), names(&["y"]));

        assert_eq!(checker.find_cycle(), Some(names(&["A::y", "B::x"])));
    }

    #[test]
    fn test_acyclic_prefix_is_trimmed() {
        let mut checker = CycleChecker::new();
        checker.add("A", names(&["b"]), names(&[]));
        checker.add("B", names(&["c"]), names(&["b"]));
        checker.add("C", names(&["d"]), names(&["c"]));
        checker.add("D", names(&["c"]), names(&["d"]));

        assert_eq!(checker.find_cycle(), Some(names(&["C::d", "D::c"])));
    }

    #[test]
    fn test_missing_producer_is_not_a_cycle() {
        let mut checker = CycleChecker::new();
        checker.add("A", names(&["x"]), names(&["a"]));
        checker.add("B", names(&["a"]), names(&["b"]));

        assert_eq!(checker.find_cycle(), None);
    }

    #[test]
    fn test_self_cycle() {
        let mut checker = CycleChecker::new();
        checker.add("Loop", names(&["me"]), names(&["me"]));

        assert_eq!(checker.find_cycle(), Some(names(&["Loop::me"])));
    }

    #[test]
    fn test_shared_subgraph_is_walked_once() {
        let mut checker = CycleChecker::new();
        checker.add("A", names(&["s"]), names(&[]));
        checker.add("B", names(&["s"]), names(&[]));
        checker.add("S", names(&["absent"]), names(&["s"]));

        assert_eq!(checker.find_cycle(), None);
    }
}
