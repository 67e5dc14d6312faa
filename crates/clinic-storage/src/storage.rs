//! 照片存储管理

use async_trait::async_trait;
use clinic_core::{ClinicError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// 允许保存的图片扩展名
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic", "bmp"];

/// 一次照片上传
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    /// 文件名为空或内容为空视为未上传
    pub fn is_empty(&self) -> bool {
        self.file_name.trim().is_empty() || self.bytes.is_empty()
    }

    /// 规范化后的扩展名，未知类型返回 `bin`
    pub fn extension(&self) -> &'static str {
        let ext = Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        ALLOWED_EXTENSIONS
            .iter()
            .find(|allowed| **allowed == ext)
            .copied()
            .unwrap_or("bin")
    }
}

/// 图片存储接口
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// 保存照片并返回公开URL
    async fn upload(&self, photo: &PhotoUpload) -> Result<String>;
}

/// 本地目录存储
pub struct StorageManager {
    base_path: PathBuf,
    public_base_url: String,
}

impl StorageManager {
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 存储文件，返回完整路径
    pub async fn store_file(&self, data: &[u8], name: &str) -> Result<PathBuf> {
        let full_path = self.base_path.join(name);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&full_path, data).await?;
        Ok(full_path)
    }

    /// 获取文件
    pub async fn get_file(&self, name: &str) -> Result<Vec<u8>> {
        let full_path = self.base_path.join(name);
        tokio::fs::read(&full_path)
            .await
            .map_err(|e| ClinicError::Storage(format!("{}: {}", full_path.display(), e)))
    }
}

#[async_trait]
impl ImageStore for StorageManager {
    async fn upload(&self, photo: &PhotoUpload) -> Result<String> {
        // 文件名由服务端生成，不使用客户端提供的名字
        let name = format!("{}.{}", Uuid::new_v4(), photo.extension());
        let path = self.store_file(&photo.bytes, &name).await?;
        debug!("Stored photo {} ({} bytes)", path.display(), photo.bytes.len());

        Ok(format!("{}/{}", self.public_base_url, name))
    }
}
