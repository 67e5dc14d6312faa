//! 存储接口定义

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinic_core::{Center, MedicalStaff, Patient, RegistrationStatus, Result};
use uuid::Uuid;

/// 分组计数结果（按中心或按医务人员）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCount {
    pub key: Uuid,
    pub count: u64,
}

/// 挂号门户存储接口
///
/// 只提供单集合的查询与更新，跨集合的拼装由报表层在进程内完成。
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    // ========== 中心 ==========

    /// 新建中心；用户名重复时返回验证错误
    async fn create_center(&self, center: &Center) -> Result<()>;

    async fn get_center(&self, id: Uuid) -> Result<Option<Center>>;

    async fn find_center_by_username(&self, username: &str) -> Result<Option<Center>>;

    /// 全部中心，按名称升序（同名按创建时间）
    async fn list_centers(&self) -> Result<Vec<Center>>;

    /// 返回是否命中记录
    async fn update_center_password(&self, id: Uuid, password_hash: &str) -> Result<bool>;

    // ========== 医务人员 ==========

    async fn create_medical_staff(&self, staff: &MedicalStaff) -> Result<()>;

    async fn set_medical_qr_code(&self, id: Uuid, qr_code: &str) -> Result<()>;

    async fn get_medical_staff(&self, id: Uuid) -> Result<Option<MedicalStaff>>;

    /// 全部医务人员，按创建顺序
    async fn list_medical_staff(&self) -> Result<Vec<MedicalStaff>>;

    // ========== 挂号记录 ==========

    async fn create_patient(&self, patient: &Patient) -> Result<()>;

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>>;

    /// 返回是否命中记录
    async fn update_patient_status(&self, id: Uuid, status: RegistrationStatus) -> Result<bool>;

    /// `[start, end)` 内的全部挂号，按时间倒序
    async fn list_patients_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Patient>>;

    /// `start` 之后（含）的全部挂号，按时间升序
    async fn list_patients_since(&self, start: DateTime<Utc>) -> Result<Vec<Patient>>;

    /// 某中心 `[start, end)` 内的挂号，可按姓名或手机号做不区分大小写的子串匹配
    async fn list_center_patients(
        &self,
        center_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        search: Option<&str>,
    ) -> Result<Vec<Patient>>;

    /// 全部挂号按 `center_id` 分组计数（不限时间）
    async fn count_patients_by_center(&self) -> Result<Vec<GroupCount>>;

    /// 全部挂号按 `medical_id` 分组计数（不限时间）
    async fn count_patients_by_medical(&self) -> Result<Vec<GroupCount>>;
}
