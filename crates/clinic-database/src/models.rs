//! 数据库模型

use chrono::{DateTime, Utc};
use clinic_core::models::*;
use clinic_core::{ClinicError, Result};
use sqlx::FromRow;
use tracing::error;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库中心表
#[derive(Debug, FromRow)]
pub struct DbCenter {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<DbCenter> for Center {
    fn from(db_center: DbCenter) -> Self {
        Center {
            id: db_center.id,
            name: db_center.name,
            address: db_center.address,
            username: db_center.username,
            password_hash: db_center.password_hash,
            created_at: db_center.created_at,
        }
    }
}

/// 数据库医务人员表
#[derive(Debug, FromRow)]
pub struct DbMedicalStaff {
    pub id: Uuid,
    pub name: String,
    pub center_id: Uuid,
    pub qr_code: String,
    pub created_at: DateTime<Utc>,
}

impl From<DbMedicalStaff> for MedicalStaff {
    fn from(db_staff: DbMedicalStaff) -> Self {
        MedicalStaff {
            id: db_staff.id,
            name: db_staff.name,
            center_id: db_staff.center_id,
            qr_code: db_staff.qr_code,
            created_at: db_staff.created_at,
        }
    }
}

/// 数据库挂号表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub ultrasound_name: String,
    pub medical_id: Uuid,
    pub center_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: String, // 存储为字符串，转换为RegistrationStatus枚举
    pub photo_url_1: Option<String>,
    pub photo_url_2: Option<String>,
}

impl TryFrom<DbPatient> for Patient {
    type Error = ClinicError;

    /// 无法识别的状态值视为数据损坏，不回退为 Pending
    fn try_from(db_patient: DbPatient) -> Result<Self> {
        let status: RegistrationStatus = db_patient.status.parse().map_err(|_| {
            error!(
                "Patient {} has corrupt status value {:?}",
                db_patient.id, db_patient.status
            );
            ClinicError::Database(format!(
                "Corrupt status '{}' for patient {}",
                db_patient.status, db_patient.id
            ))
        })?;

        Ok(Patient {
            id: db_patient.id,
            name: db_patient.name,
            phone: db_patient.phone,
            ultrasound_name: db_patient.ultrasound_name,
            medical_id: db_patient.medical_id,
            center_id: db_patient.center_id,
            timestamp: db_patient.timestamp,
            status,
            photo_url_1: db_patient.photo_url_1,
            photo_url_2: db_patient.photo_url_2,
        })
    }
}

/// 批量转换查询结果
pub(crate) fn into_patients(rows: Vec<DbPatient>) -> Result<Vec<Patient>> {
    rows.into_iter().map(Patient::try_from).collect()
}
