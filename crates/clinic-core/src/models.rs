//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ClinicError;

/// 诊断中心（租户根实体）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Center {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub username: String, // 中心登录名，全局唯一
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC 字符串
    pub created_at: DateTime<Utc>,
}

/// 转诊医务人员，每人对应一个挂号二维码
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalStaff {
    pub id: Uuid,
    pub name: String,
    pub center_id: Uuid,
    pub qr_code: String, // base64 编码的 SVG，创建时生成一次
    pub created_at: DateTime<Utc>,
}

/// 患者挂号记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub ultrasound_name: String,
    pub medical_id: Uuid,
    pub center_id: Uuid, // 写入时从医务人员复制
    pub timestamp: DateTime<Utc>,
    pub status: RegistrationStatus,
    pub photo_url_1: Option<String>,
    pub photo_url_2: Option<String>,
}

/// 挂号分诊状态
///
/// 变体顺序即流转顺序，`Ord` 依赖于此。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegistrationStatus {
    Pending,  // 待处理
    Running,  // 进行中
    Complete, // 已完成
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "Pending",
            RegistrationStatus::Running => "Running",
            RegistrationStatus::Complete => "Complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RegistrationStatus::Complete)
    }

    pub fn all() -> [RegistrationStatus; 3] {
        [
            RegistrationStatus::Pending,
            RegistrationStatus::Running,
            RegistrationStatus::Complete,
        ]
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RegistrationStatus::Pending),
            "Running" => Ok(RegistrationStatus::Running),
            "Complete" => Ok(RegistrationStatus::Complete),
            other => Err(ClinicError::Validation(format!(
                "Unknown registration status: {}",
                other
            ))),
        }
    }
}

/// 新建中心所需字段
#[derive(Debug, Clone)]
pub struct NewCenter {
    pub name: String,
    pub address: String,
    pub username: String,
    pub password_hash: String,
}

impl NewCenter {
    pub fn into_center(self) -> Center {
        Center {
            id: Uuid::new_v4(),
            name: self.name,
            address: self.address,
            username: self.username,
            password_hash: self.password_hash,
            created_at: Utc::now(),
        }
    }
}

/// 新建挂号记录所需字段
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub name: String,
    pub phone: String,
    pub ultrasound_name: String,
    pub medical_id: Uuid,
    pub center_id: Uuid,
    pub photo_url_1: Option<String>,
    pub photo_url_2: Option<String>,
}

impl NewPatient {
    /// 生成持久化记录：状态固定为 Pending，时间戳由服务端指定
    pub fn into_patient(self) -> Patient {
        Patient {
            id: Uuid::new_v4(),
            name: self.name,
            phone: self.phone,
            ultrasound_name: self.ultrasound_name,
            medical_id: self.medical_id,
            center_id: self.center_id,
            timestamp: Utc::now(),
            status: RegistrationStatus::Pending,
            photo_url_1: self.photo_url_1,
            photo_url_2: self.photo_url_2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_known_values() {
        for status in RegistrationStatus::all() {
            assert_eq!(status.as_str().parse::<RegistrationStatus>().unwrap(), status);
        }
        assert!("Done".parse::<RegistrationStatus>().is_err());
        assert!("pending".parse::<RegistrationStatus>().is_err());
    }

    #[test]
    fn status_order_follows_workflow() {
        assert!(RegistrationStatus::Pending < RegistrationStatus::Running);
        assert!(RegistrationStatus::Running < RegistrationStatus::Complete);
        assert!(RegistrationStatus::Complete.is_terminal());
    }

    #[test]
    fn new_patient_starts_pending() {
        let patient = NewPatient {
            name: "Asha".to_string(),
            phone: "1234567890".to_string(),
            ultrasound_name: "Abdomen".to_string(),
            medical_id: Uuid::new_v4(),
            center_id: Uuid::new_v4(),
            photo_url_1: None,
            photo_url_2: None,
        }
        .into_patient();

        assert_eq!(patient.status, RegistrationStatus::Pending);
    }

    #[test]
    fn center_password_hash_is_not_serialized() {
        let center = NewCenter {
            name: "North".to_string(),
            address: "1 Road".to_string(),
            username: "north".to_string(),
            password_hash: "$argon2id$secret".to_string(),
        }
        .into_center();

        let json = serde_json::to_string(&center).unwrap();
        assert!(!json.contains("argon2id"));
    }
}
