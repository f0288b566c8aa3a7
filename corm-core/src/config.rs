//! 配置环境
//!
//! `Environment` 聚合按优先级排序的配置源，第一个包含该键的配置源胜出。
//! 键为点分路径（`logging.level`）。

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;

use crate::error::{ContainerError, ContainerResult};

/// 配置值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 整数值，数字字符串会被解析
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 布尔值，接受 `true/yes/on/1` 与 `false/no/off/0` 字符串
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => f.write_str(s),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Array(values) => {
                let items: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            ConfigValue::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let items: Vec<String> = keys
                    .into_iter()
                    .map(|k| format!("{} = {}", k, map[k]))
                    .collect();
                write!(f, "{{{}}}", items.join(", "))
            }
        }
    }
}

impl From<&toml::Value> for ConfigValue {
    fn from(value: &toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ConfigValue::String(s.clone()),
            toml::Value::Integer(i) => ConfigValue::Int(*i),
            toml::Value::Float(f) => ConfigValue::Float(*f),
            toml::Value::Boolean(b) => ConfigValue::Bool(*b),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
            toml::Value::Array(arr) => ConfigValue::Array(arr.iter().map(Into::into).collect()),
            toml::Value::Table(table) => ConfigValue::Object(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<ConfigValue>;

    fn keys(&self) -> Vec<String>;

    /// 优先级（数字越大优先级越高）
    fn priority(&self) -> i32 {
        0
    }
}

/// Environment - 配置管理器
pub struct Environment {
    /// 配置源列表（按优先级降序）
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("sources", &self.source_names())
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
        }
    }

    /// 添加配置源，同优先级的配置源保持插入顺序
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        tracing::debug!(
            "Adding property source '{}' with priority {}",
            source.name(),
            source.priority()
        );
        sources.push(source);
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// 已注册配置源的名称，优先级高者在前
    pub fn source_names(&self) -> Vec<String> {
        self.sources
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        for source in sources.iter() {
            if let Some(value) = source.get(key) {
                tracing::trace!("Config '{}' found in source '{}'", key, source.name());
                return Some(value);
            }
        }
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 所有配置源中的键（排序、去重）
    pub fn keys(&self) -> Vec<String> {
        let keys: BTreeSet<String> = self
            .sources
            .read()
            .iter()
            .flat_map(|s| s.keys())
            .collect();
        keys.into_iter().collect()
    }

    /// 任意标量值的字符串形式
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            ConfigValue::Array(_) | ConfigValue::Object(_) => None,
            value => Some(value.to_string()),
        }
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_i64(key).unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// 字符串数组：支持 TOML 数组或逗号分隔字符串
    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            ConfigValue::Array(arr) => Some(arr.iter().map(ToString::to_string).collect()),
            ConfigValue::String(s) => Some(
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Property Sources ==========

/// 环境变量配置源
///
/// 前缀为 `APP_` 时，`APP_DATABASE_URL` 对应 `database.url`。
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn env_to_key(&self, env_key: &str) -> Option<String> {
        env_key
            .strip_prefix(&self.prefix)
            .map(|stripped| stripped.to_lowercase().replace('_', "."))
    }

    fn key_to_env(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            key.replace(['.', '-'], "_").to_uppercase()
        )
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key))
            .ok()
            .map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter_map(|(k, _)| self.env_to_key(&k))
            .collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 文件配置源
///
/// 嵌套表被展平为点分键。
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&content, path.to_string_lossy().to_string())
    }

    pub fn parse(content: &str, name: impl Into<String>) -> ContainerResult<Self> {
        let name = name.into();
        let value: toml::Value = toml::from_str(content)
            .map_err(|e| ContainerError::Config(format!("Failed to parse TOML {}: {}", name, e)))?;

        let mut properties = HashMap::new();
        flatten(&value, String::new(), &mut properties);

        Ok(Self {
            name,
            properties,
            priority: 0,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

fn flatten(value: &toml::Value, prefix: String, result: &mut HashMap<String, ConfigValue>) {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(val, path, result);
            }
        }
        other => {
            result.insert(prefix, ConfigValue::from(other));
        }
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（用于测试或运行时覆盖）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPLICATION: &str = r#"
        [corm.context]
        name = "demo"
        expose-environment = false

        [logging]
        level = "debug"
        modules = ["registry", "context"]
    "#;

    #[test]
    fn test_toml_is_flattened() {
        let source = TomlPropertySource::parse(APPLICATION, "application.toml").unwrap();
        assert_eq!(
            source.get("corm.context.name"),
            Some(ConfigValue::String("demo".to_string()))
        );
        assert_eq!(
            source.get("corm.context.expose-environment"),
            Some(ConfigValue::Bool(false))
        );
        assert!(source.get("corm.context").is_none());
    }

    #[test]
    fn test_invalid_toml_maps_to_config_error() {
        let err = TomlPropertySource::parse("name = ", "broken.toml")
            .err()
            .unwrap();
        assert!(matches!(err, ContainerError::Config(ref msg) if msg.contains("broken.toml")));

        let err = TomlPropertySource::from_file("/nonexistent/application.toml")
            .err()
            .unwrap();
        assert!(matches!(err, ContainerError::Config(_)));
    }

    #[test]
    fn test_priority_decides_precedence() {
        let environment = Environment::new();
        environment.add_property_source(Box::new(
            TomlPropertySource::parse(APPLICATION, "application.toml").unwrap(),
        ));
        environment.add_property_source(Box::new(
            MapPropertySource::new("overrides").with_property("logging.level", "warn"),
        ));

        assert_eq!(environment.source_names(), vec!["overrides", "application.toml"]);
        assert_eq!(
            environment.keys(),
            vec![
                "corm.context.expose-environment",
                "corm.context.name",
                "logging.level",
                "logging.modules",
            ]
        );
        assert_eq!(environment.get_string("logging.level").as_deref(), Some("warn"));
        assert_eq!(environment.get_string("corm.context.name").as_deref(), Some("demo"));
        assert!(!environment.get_bool_or("corm.context.expose-environment", true));
        assert_eq!(
            environment.get_string_array("logging.modules"),
            Some(vec!["registry".to_string(), "context".to_string()])
        );
    }

    #[test]
    fn test_lossy_accessors() {
        let environment = Environment::new();
        environment.add_property_source(Box::new(
            MapPropertySource::new("map")
                .with_property("port", "8080")
                .with_property("enabled", "yes")
                .with_property("list", "a, b,,c")
                .with_property("count", 3_i64),
        ));

        assert_eq!(environment.get_i64("port"), Some(8080));
        assert_eq!(environment.get_bool("enabled"), Some(true));
        assert_eq!(environment.get_string("count").as_deref(), Some("3"));
        assert_eq!(environment.get_f64("count"), Some(3.0));
        assert_eq!(
            environment.get_string_array("list"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(environment.get_i64_or("missing", 7), 7);
    }

    #[test]
    fn test_environment_variable_key_mapping() {
        let source = EnvironmentPropertySource::new("CORM_TEST_");
        assert_eq!(source.key_to_env("corm.context.name"), "CORM_TEST_CORM_CONTEXT_NAME");
        assert_eq!(source.key_to_env("logging.show-target"), "CORM_TEST_LOGGING_SHOW_TARGET");
        assert_eq!(
            source.env_to_key("CORM_TEST_DATABASE_URL").as_deref(),
            Some("database.url")
        );
        assert_eq!(source.env_to_key("PATH"), None);
    }
}
