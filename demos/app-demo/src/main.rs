use corm_core::prelude::*;
use corm_core::{EnvironmentPropertySource, LoggingConfig, TomlPropertySource};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ==================== 配置值 ====================

#[derive(Debug, Clone)]
struct DatabaseSettings {
    host: String,
    port: i64,
    max_connections: i64,
}

#[derive(Debug)]
struct DatabaseService {
    settings: DatabaseSettings,
}

impl DatabaseService {
    fn query(&self, sql: &str) -> String {
        format!(
            "[{}:{}] result for: {}",
            self.settings.host, self.settings.port, sql
        )
    }
}

#[derive(Debug, Default)]
struct RequestCounter {
    served: AtomicU64,
}

#[derive(Debug)]
struct ServerService {
    bind_address: String,
    workers: i64,
    database: Arc<DatabaseService>,
}

/// 每个请求一个处理器，由调用方持有
struct RequestHandler {
    id: u64,
    database: Arc<DatabaseService>,
}

impl RequestHandler {
    fn handle(&self, path: &str) -> String {
        format!("#{} {} -> {}", self.id, path, self.database.query("SELECT * FROM users"))
    }
}

// ==================== 配置单元 ====================

/// 数据库配置：从 Environment 读取连接参数
struct DatabaseConfiguration {
    settings: DatabaseSettings,
}

impl Configuration for DatabaseConfiguration {
    fn provide_beans(&mut self, registry: &BeanRegistry) -> ContainerResult<()> {
        let settings = self.settings.clone();
        registry.register("databaseSettings", ValueSingleton::new(move |_| Ok(settings.clone())))?;
        registry.register(
            "databaseService",
            OwnedSingleton::new(|registry| {
                let settings = registry.retrieve::<DatabaseSettings>("databaseSettings")?;
                tracing::info!("Connecting to database {}:{}", settings.host, settings.port);
                Ok(DatabaseService { settings })
            }),
        )
    }
}

impl ConfigurationDefinition for DatabaseConfiguration {
    fn name() -> &'static str {
        "DatabaseConfiguration"
    }

    fn resources() -> &'static [&'static str] {
        &["environment"]
    }

    fn beans() -> &'static [&'static str] {
        &["databaseSettings", "databaseService"]
    }

    fn construct(registry: &BeanRegistry) -> ContainerResult<Self> {
        let environment = environment(registry)?;
        Ok(Self {
            settings: DatabaseSettings {
                host: environment.get_string_or("database.host", "localhost"),
                port: environment.get_i64_or("database.port", 5432),
                max_connections: environment.get_i64_or("database.max-connections", 8),
            },
        })
    }
}

/// 服务器配置：依赖数据库配置与请求计数器
struct ServerConfiguration {
    environment: Arc<Environment>,
    bind_address: String,
}

impl Configuration for ServerConfiguration {
    fn post_init(&mut self) -> ContainerResult<()> {
        self.bind_address = format!(
            "{}:{}",
            self.environment.get_string_or("server.host", "127.0.0.1"),
            self.environment.get_i64_or("server.port", 8080)
        );
        Ok(())
    }

    fn provide_beans(&mut self, registry: &BeanRegistry) -> ContainerResult<()> {
        let bind_address = self.bind_address.clone();
        let workers = self.environment.get_i64_or("server.workers", 1);
        registry.register(
            "serverService",
            SharedSingleton::new(move |registry| {
                Ok(ServerService {
                    bind_address: bind_address.clone(),
                    workers,
                    database: registry.retrieve::<Arc<DatabaseService>>("databaseService")?,
                })
            }),
        )?;

        registry.register(
            "requestHandler",
            PointerFactory::new(|registry| {
                let counter = registry
                    .retrieve::<Alias<RequestCounter>>("requestCounter")?
                    .upgrade()
                    .ok_or_else(|| anyhow::anyhow!("request counter released"))?;
                let server = registry.retrieve::<Arc<ServerService>>("serverService")?;
                Ok(RequestHandler {
                    id: counter.served.fetch_add(1, Ordering::SeqCst) + 1,
                    database: Arc::clone(&server.database),
                })
            }),
        )
    }
}

impl ConfigurationDefinition for ServerConfiguration {
    fn name() -> &'static str {
        "ServerConfiguration"
    }

    fn resources() -> &'static [&'static str] {
        &["environment", "databaseService", "requestCounter"]
    }

    fn beans() -> &'static [&'static str] {
        &["serverService", "requestHandler"]
    }

    fn dependencies() -> Vec<ConfigurationDescriptor> {
        vec![ConfigurationDescriptor::of::<DatabaseConfiguration>()]
    }

    fn construct(registry: &BeanRegistry) -> ContainerResult<Self> {
        Ok(Self {
            environment: environment(registry)?,
            bind_address: String::new(),
        })
    }
}

/// 指标配置：计数器的存储由配置实例持有，注册为别名
struct MetricsConfiguration {
    counter: Arc<RequestCounter>,
}

impl Configuration for MetricsConfiguration {
    fn provide_beans(&mut self, registry: &BeanRegistry) -> ContainerResult<()> {
        registry.register_instance("requestCounter", &self.counter)
    }
}

fn metrics_configuration() -> ConfigurationDescriptor {
    ConfigurationDescriptor::new("MetricsConfiguration", |_| {
        Ok(MetricsConfiguration {
            counter: Arc::new(RequestCounter::default()),
        })
    })
    .provides(["requestCounter"])
}

struct Placeholder;

impl Configuration for Placeholder {}

fn environment(registry: &BeanRegistry) -> ContainerResult<Arc<Environment>> {
    registry
        .retrieve::<Alias<Environment>>(corm_core::constants::ENVIRONMENT_BEAN_NAME)?
        .upgrade()
        .ok_or_else(|| anyhow::anyhow!("environment released").into())
}

// ==================== 主程序 ====================

fn load_environment() -> ContainerResult<Arc<Environment>> {
    let environment = Arc::new(Environment::new());

    let config_paths = ["demos/app-demo/application.toml", "application.toml"];
    match config_paths.iter().find(|p| std::path::Path::new(p).exists()) {
        Some(path) => {
            environment.add_property_source(Box::new(TomlPropertySource::from_file(path)?));
        }
        None => eprintln!("⚠️  application.toml not found, using defaults"),
    }
    environment.add_property_source(Box::new(EnvironmentPropertySource::new("APP_")));

    Ok(environment)
}

fn main() -> anyhow::Result<()> {
    let environment = load_environment()?;
    LoggingConfig::from_environment(&environment)?.init()?;

    println!("\n╔════════════════════════════════════════════════════╗");
    println!(
        "║  {} v{}",
        environment.get_string_or("app.name", "CormDemo"),
        environment.get_string_or("app.version", "0.0.0")
    );
    println!("╚════════════════════════════════════════════════════╝\n");

    let mut context = Context::builder().environment(environment).build()?;

    // ServerConfiguration 会把 DatabaseConfiguration 一并调度
    context.add_configuration(ConfigurationDescriptor::of::<ServerConfiguration>())?;
    context.add_configuration(metrics_configuration())?;
    context.assemble()?;

    println!(
        "✅ Assembled {:?} in {} pass(es)",
        context.active_configurations(),
        context.passes()
    );

    {
        let server = context.retrieve::<Arc<ServerService>>("serverService")?;
        let settings = context.retrieve::<DatabaseSettings>("databaseSettings")?;
        println!("🚀 Server bound to {} with {} worker(s)", server.bind_address, server.workers);
        println!(
            "📊 Database {}:{} (max {} connections)",
            settings.host, settings.port, settings.max_connections
        );

        for path in ["/api/users", "/api/orders"] {
            let handler = context.retrieve::<Box<RequestHandler>>("requestHandler")?;
            println!("🔧 {}", handler.handle(path));
        }

        // 值单例必须按值获取
        if let Err(e) = context.retrieve::<Arc<DatabaseSettings>>("databaseSettings") {
            println!("🛑 {}", e);
        }
    }

    // 循环依赖诊断
    let mut broken = Context::builder().name("broken").build()?;
    broken.add_configurations([
        ConfigurationDescriptor::new("Orders", |_| Ok(Placeholder))
            .requires(["inventory"])
            .provides(["orders"]),
        ConfigurationDescriptor::new("Inventory", |_| Ok(Placeholder))
            .requires(["orders"])
            .provides(["inventory"]),
    ])?;
    if let Err(e) = broken.assemble() {
        println!("🔁 {}", e);
    }

    context.close();
    println!("\n✅ Context closed");
    Ok(())
}
