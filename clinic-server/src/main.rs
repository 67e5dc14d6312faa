//! 诊所登记门户服务器主程序

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use clinic_core::utils::offset_from_minutes;
use clinic_database::{DatabasePool, DatabaseQueries, MemoryStore, RegistrationStore};
use clinic_storage::{CloudinaryImageStore, ImageStore, StorageManager};
use clinic_web::{AppState, PortalSettings, WebServer};
use clinic_workflow::AdminCredentials;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigManager, PortalConfig, StorageBackend};

/// 门户服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "clinic-server")]
#[command(about = "诊所患者登记门户服务器")]
struct Args {
    /// 服务器端口，覆盖配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    /// 使用内存存储（数据不持久化）
    #[arg(long)]
    in_memory: bool,

    /// 打印生效配置后退出
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut manager = ConfigManager::load(args.config.as_deref())?;
    {
        let config = manager.config_mut();
        if let Some(port) = args.port {
            config.server.port = port;
        }
        if let Some(level) = &args.log_level {
            config.logging.level = level.clone();
        }
        if args.in_memory {
            config.database.in_memory = true;
        }
    }

    if args.print_config {
        println!("{}", manager.to_toml()?);
        return Ok(());
    }

    init_logging(manager.config());
    info!("启动诊所登记门户...");

    manager.validate()?;
    let config = manager.config();

    let store = build_store(config).await?;
    let (images, uploads_dir) = build_image_store(config).await?;

    let settings = PortalSettings {
        host_url: config.portal.host_url.clone(),
        admin: AdminCredentials {
            username: config.portal.admin_username.clone(),
            password: config.portal.admin_password.clone(),
        },
        session_ttl: Duration::from_secs(config.portal.session_ttl_secs),
        utc_offset: offset_from_minutes(config.reporting.utc_offset_minutes)?,
        analytics_window_days: config.reporting.analytics_window_days,
        max_upload_bytes: config.storage.max_upload_bytes,
    };

    info!("门户配置:");
    info!("  对外地址: {}", settings.host_url);
    info!("  时区偏移: {}", settings.utc_offset);
    info!("  统计窗口: {} 天", settings.analytics_window_days);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;

    let state = AppState::new(store, images, settings);
    let server = WebServer::new(addr, state, uploads_dir);

    if let Err(e) = server.run().await {
        error!("服务器运行失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}

fn init_logging(config: &PortalConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn build_store(config: &PortalConfig) -> Result<Arc<dyn RegistrationStore>> {
    if config.database.in_memory {
        warn!("Using in-memory store, data will be lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = DatabasePool::new(&config.database.url, config.database.max_connections).await?;
    let queries = DatabaseQueries::new(pool);
    queries.create_tables().await?;
    info!("Database schema ready");

    Ok(Arc::new(queries))
}

async fn build_image_store(config: &PortalConfig) -> Result<(Arc<dyn ImageStore>, Option<PathBuf>)> {
    let storage = &config.storage;
    match storage.backend {
        StorageBackend::Local => {
            let dir = PathBuf::from(&storage.local_dir);
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;
            info!("Storing photos under {}", dir.display());

            let images = StorageManager::new(dir.clone(), &storage.public_base_url);
            Ok((Arc::new(images), Some(dir)))
        }
        StorageBackend::Cloudinary => {
            let images = CloudinaryImageStore::new(storage.cloudinary.clone())?;
            info!("Storing photos in Cloudinary cloud {}", storage.cloudinary.cloud_name);
            Ok((Arc::new(images), None))
        }
    }
}
