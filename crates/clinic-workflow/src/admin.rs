//! 后台管理：中心、医务人员与登录凭据

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use clinic_core::utils::registration_url;
use clinic_core::{qr, Center, ClinicError, MedicalStaff, NewCenter, Result};
use clinic_database::RegistrationStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// 新建中心表单
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CenterForm {
    pub name: String,
    pub address: String,
    pub username: String,
    pub password: String,
}

/// 新建中心结果
#[derive(Debug, Clone)]
pub enum AddCenterOutcome {
    Created(Center),
    /// 用户名已被占用，未做任何写入
    DuplicateUsername(String),
}

/// 医务人员列表项
#[derive(Debug, Clone, Serialize)]
pub struct StaffListing {
    pub staff: MedicalStaff,
    pub center_name: String,
}

/// 超级管理员凭据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn verify(&self, username: &str, password: &str) -> bool {
        !self.username.is_empty() && self.username == username && self.password == password
    }
}

/// 使用 Argon2 生成密码哈希
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ClinicError::Internal(format!("Failed to hash password: {}", e)))
}

/// 校验密码；哈希本身损坏时返回错误
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| ClinicError::Internal(format!("Corrupt password hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ClinicError::Internal(format!("Password verification failed: {}", e))),
    }
}

/// 后台管理服务
pub struct AdminService {
    store: Arc<dyn RegistrationStore>,
    host_url: String,
    credentials: AdminCredentials,
}

impl AdminService {
    pub fn new(store: Arc<dyn RegistrationStore>, host_url: &str, credentials: AdminCredentials) -> Self {
        Self {
            store,
            host_url: host_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn host_url(&self) -> &str {
        &self.host_url
    }

    /// 医务人员二维码指向的登记链接
    pub fn registration_link(&self, medical_id: &Uuid) -> String {
        registration_url(&self.host_url, medical_id)
    }

    /// 新建中心
    pub async fn add_center(&self, form: &CenterForm) -> Result<AddCenterOutcome> {
        let name = form.name.trim();
        let address = form.address.trim();
        let username = form.username.trim();

        if name.is_empty() || address.is_empty() || username.is_empty() || form.password.is_empty() {
            return Err(ClinicError::Validation("All fields are required!".to_string()));
        }

        if self.store.find_center_by_username(username).await?.is_some() {
            warn!("Center username '{}' already exists", username);
            return Ok(AddCenterOutcome::DuplicateUsername(username.to_string()));
        }

        let center = NewCenter {
            name: name.to_string(),
            address: address.to_string(),
            username: username.to_string(),
            password_hash: hash_password(&form.password)?,
        }
        .into_center();

        match self.store.create_center(&center).await {
            Ok(()) => {}
            // 并发插入时由唯一约束兜底
            Err(ClinicError::Validation(_)) => {
                return Ok(AddCenterOutcome::DuplicateUsername(username.to_string()));
            }
            Err(e) => return Err(e),
        }

        info!("Created center {} ({})", center.name, center.id);
        Ok(AddCenterOutcome::Created(center))
    }

    /// 重置中心密码
    pub async fn reset_center_password(&self, center_id: Uuid, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(ClinicError::Validation("New password cannot be empty.".to_string()));
        }

        let hash = hash_password(new_password)?;
        if !self.store.update_center_password(center_id, &hash).await? {
            return Err(ClinicError::NotFound(format!("Center {} not found", center_id)));
        }

        info!("Password reset for center {}", center_id);
        Ok(())
    }

    /// 新增医务人员并生成挂号二维码
    pub async fn add_medical_staff(&self, name: &str, center_id: Uuid) -> Result<MedicalStaff> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClinicError::Validation("Medical staff name is required.".to_string()));
        }

        if self.store.get_center(center_id).await?.is_none() {
            return Err(ClinicError::NotFound(format!("Center {} not found", center_id)));
        }

        let mut staff = MedicalStaff {
            id: Uuid::new_v4(),
            name: name.to_string(),
            center_id,
            qr_code: String::new(),
            created_at: Utc::now(),
        };
        self.store.create_medical_staff(&staff).await?;

        let url = self.registration_link(&staff.id);
        staff.qr_code = qr::encode_base64(&url)?;
        self.store.set_medical_qr_code(staff.id, &staff.qr_code).await?;

        info!("Added medical staff {} ({}) to center {}", staff.name, staff.id, center_id);
        Ok(staff)
    }

    /// 中心登录校验
    pub async fn authenticate_center(&self, username: &str, password: &str) -> Result<Option<Center>> {
        let center = match self.store.find_center_by_username(username.trim()).await? {
            Some(center) => center,
            None => return Ok(None),
        };

        if verify_password(password, &center.password_hash)? {
            Ok(Some(center))
        } else {
            Ok(None)
        }
    }

    /// 超级管理员登录校验
    pub fn authenticate_admin(&self, username: &str, password: &str) -> bool {
        self.credentials.verify(username.trim(), password)
    }

    /// 全部医务人员及其所属中心名称
    pub async fn list_medical_staff_with_centers(&self) -> Result<Vec<StaffListing>> {
        let centers: HashMap<Uuid, String> = self
            .store
            .list_centers()
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let listings = self
            .store
            .list_medical_staff()
            .await?
            .into_iter()
            .map(|staff| {
                let center_name = centers
                    .get(&staff.center_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string());
                StaffListing { staff, center_name }
            })
            .collect();

        Ok(listings)
    }

    /// 缓存的二维码图片（SVG 字节）
    pub async fn qr_image(&self, medical_id: Uuid) -> Result<Vec<u8>> {
        let staff = self
            .store
            .get_medical_staff(medical_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound(format!("Medical staff {} not found", medical_id)))?;

        qr::decode_base64(&staff.qr_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_database::MemoryStore;

    const HOST: &str = "https://clinic.example/";

    fn service(store: &MemoryStore) -> AdminService {
        AdminService::new(
            Arc::new(store.clone()),
            HOST,
            AdminCredentials {
                username: "admin".to_string(),
                password: "admin123".to_string(),
            },
        )
    }

    fn center_form(username: &str) -> CenterForm {
        CenterForm {
            name: "North Scan".to_string(),
            address: "12 Lake Road".to_string(),
            username: username.to_string(),
            password: "s3cret".to_string(),
        }
    }

    async fn created(service: &AdminService, username: &str) -> Center {
        match service.add_center(&center_form(username)).await.unwrap() {
            AddCenterOutcome::Created(center) => center,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let store = MemoryStore::new();
        let admin = service(&store);
        created(&admin, "north").await;

        let outcome = admin.add_center(&center_form("north")).await.unwrap();
        assert!(matches!(outcome, AddCenterOutcome::DuplicateUsername(ref u) if u == "north"));
        assert_eq!(store.list_centers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_center_fields() {
        let store = MemoryStore::new();
        let mut form = center_form("north");
        form.address = " ".to_string();

        let result = service(&store).add_center(&form).await;
        assert!(matches!(result, Err(ClinicError::Validation(_))));
    }

    #[tokio::test]
    async fn test_center_login_and_password_reset() {
        let store = MemoryStore::new();
        let admin = service(&store);
        let center = created(&admin, "north").await;

        assert!(admin.authenticate_center("north", "s3cret").await.unwrap().is_some());
        assert!(admin.authenticate_center("north", "wrong").await.unwrap().is_none());
        assert!(admin.authenticate_center("nobody", "s3cret").await.unwrap().is_none());

        admin.reset_center_password(center.id, "fresh").await.unwrap();
        assert!(admin.authenticate_center("north", "s3cret").await.unwrap().is_none());
        assert!(admin.authenticate_center("north", "fresh").await.unwrap().is_some());

        assert!(matches!(
            admin.reset_center_password(center.id, "").await,
            Err(ClinicError::Validation(_))
        ));
        assert!(matches!(
            admin.reset_center_password(Uuid::new_v4(), "x").await,
            Err(ClinicError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_medical_staff_qr_matches_registration_url() {
        let store = MemoryStore::new();
        let admin = service(&store);
        let center = created(&admin, "north").await;

        let staff = admin.add_medical_staff("Dr. Iyer", center.id).await.unwrap();
        let stored = store.get_medical_staff(staff.id).await.unwrap().unwrap();

        let link = admin.registration_link(&staff.id);
        assert_eq!(link, format!("https://clinic.example/register/{}", staff.id));
        assert_eq!(stored.qr_code, qr::encode_base64(&link).unwrap());

        // 其他链接（包括未去掉末尾斜杠的主机地址）生成不同的二维码
        let other = format!("https://clinic.example/register/{}", Uuid::new_v4());
        assert_ne!(stored.qr_code, qr::encode_base64(&other).unwrap());
        let untrimmed = format!("{}/register/{}", HOST, staff.id);
        assert_ne!(stored.qr_code, qr::encode_base64(&untrimmed).unwrap());

        let svg = admin.qr_image(staff.id).await.unwrap();
        assert_eq!(svg, qr::render_svg(&link).unwrap().into_bytes());
    }

    #[tokio::test]
    async fn test_medical_staff_requires_center() {
        let store = MemoryStore::new();
        let result = service(&store).add_medical_staff("Dr. Iyer", Uuid::new_v4()).await;
        assert!(matches!(result, Err(ClinicError::NotFound(_))));
        assert!(store.list_medical_staff().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_staff_listing_marks_dangling_center() {
        let store = MemoryStore::new();
        let admin = service(&store);
        let center = created(&admin, "north").await;
        admin.add_medical_staff("Dr. Iyer", center.id).await.unwrap();

        let orphan = MedicalStaff {
            id: Uuid::new_v4(),
            name: "Dr. Ghost".to_string(),
            center_id: Uuid::new_v4(),
            qr_code: String::new(),
            created_at: Utc::now(),
        };
        store.create_medical_staff(&orphan).await.unwrap();

        let listing = admin.list_medical_staff_with_centers().await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].center_name, "North Scan");
        assert_eq!(listing[1].center_name, "Unknown");
    }

    #[test]
    fn test_admin_credentials() {
        let creds = AdminCredentials {
            username: "admin".to_string(),
            password: "pw".to_string(),
        };
        assert!(creds.verify("admin", "pw"));
        assert!(!creds.verify("admin", "PW"));
        assert!(!creds.verify("root", "pw"));
    }
}
