//! Cloudinary 图片上传

use async_trait::async_trait;
use clinic_core::{ClinicError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, error};

use crate::storage::{ImageStore, PhotoUpload};

/// Cloudinary 账户配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// 通过 Cloudinary 上传接口保存照片
pub struct CloudinaryImageStore {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryImageStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self> {
        if config.cloud_name.is_empty() || config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(ClinicError::Config(
                "Cloudinary cloud_name, api_key and api_secret are required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClinicError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        )
    }
}

/// 签名：对已排序参数串拼接密钥后做 SHA-256，输出十六进制
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[async_trait]
impl ImageStore for CloudinaryImageStore {
    async fn upload(&self, photo: &PhotoUpload) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(&[("timestamp", timestamp.clone())], &self.config.api_secret);

        let mut part = reqwest::multipart::Part::bytes(photo.bytes.clone())
            .file_name(format!("upload.{}", photo.extension()));
        if let Some(content_type) = &photo.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| ClinicError::Validation(format!("Invalid content type: {}", e)))?;
        }

        let form = reqwest::multipart::Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256")
            .part("file", part);

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClinicError::Storage(format!("Cloudinary request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Cloudinary upload rejected: {} {}", status, body);
            return Err(ClinicError::Storage(format!(
                "Cloudinary upload failed with status {}",
                status
            )));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| ClinicError::Storage(format!("Unexpected Cloudinary response: {}", e)))?;

        debug!("Uploaded photo to {}", body.secure_url);
        Ok(body.secure_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_order_independent() {
        let a = sign_params(
            &[("timestamp", "1700000000".to_string()), ("folder", "p".to_string())],
            "secret",
        );
        let b = sign_params(
            &[("folder", "p".to_string()), ("timestamp", "1700000000".to_string())],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let params = [("timestamp", "1700000000".to_string())];
        assert_ne!(sign_params(&params, "one"), sign_params(&params, "two"));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let result = CloudinaryImageStore::new(CloudinaryConfig::default());
        assert!(matches!(result, Err(ClinicError::Config(_))));
    }
}
