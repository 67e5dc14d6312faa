//! 错误定义模块

use thiserror::Error;

/// 挂号门户统一错误类型
#[derive(Error, Debug)]
pub enum ClinicError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("网络错误: {0}")]
    Network(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("权限错误: {0}")]
    Permission(String),

    #[error("系统内部错误: {0}")]
    Internal(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效状态转换: 从 {from} 到 {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl ClinicError {
    /// 面向用户的消息，不带分类前缀
    pub fn user_message(&self) -> String {
        match self {
            ClinicError::Config(msg)
            | ClinicError::Database(msg)
            | ClinicError::Storage(msg)
            | ClinicError::Validation(msg)
            | ClinicError::Permission(msg)
            | ClinicError::Internal(msg)
            | ClinicError::NotFound(msg) => msg.clone(),
            ClinicError::Network(e) => e.to_string(),
            ClinicError::Serialization(e) => e.to_string(),
            ClinicError::InvalidStateTransition { from, to } => {
                format!("Cannot move a registration from {} to {}", from, to)
            }
        }
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for ClinicError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ClinicError::NotFound("Record not found".to_string()),
            other => ClinicError::Database(other.to_string()),
        }
    }
}

/// 挂号门户统一结果类型
pub type Result<T> = std::result::Result<T, ClinicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_strips_category() {
        let err = ClinicError::Validation("Phone number must be 10-12 digits".to_string());
        assert_eq!(err.user_message(), "Phone number must be 10-12 digits");
        assert_eq!(err.to_string(), "验证错误: Phone number must be 10-12 digits");
    }
}
