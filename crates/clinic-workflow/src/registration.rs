//! 公开挂号表单提交

use clinic_core::utils::is_valid_phone;
use clinic_core::{Center, ClinicError, MedicalStaff, NewPatient, Patient, Result};
use clinic_database::RegistrationStore;
use clinic_storage::{ImageStore, PhotoUpload};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// 挂号表单文本字段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    pub name: String,
    pub phone: String,
    pub ultrasound_name: String,
}

impl RegistrationForm {
    /// 校验并返回去除首尾空白后的表单
    pub fn validate(&self) -> Result<RegistrationForm> {
        let name = self.name.trim();
        let phone = self.phone.trim();
        let ultrasound_name = self.ultrasound_name.trim();

        if name.is_empty() || phone.is_empty() || ultrasound_name.is_empty() {
            return Err(ClinicError::Validation("All fields are required!".to_string()));
        }

        if !is_valid_phone(phone) {
            return Err(ClinicError::Validation(
                "Invalid phone number. It should be 10-12 digits.".to_string(),
            ));
        }

        Ok(RegistrationForm {
            name: name.to_string(),
            phone: phone.to_string(),
            ultrasound_name: ultrasound_name.to_string(),
        })
    }
}

/// 挂号提交服务
pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    images: Arc<dyn ImageStore>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn RegistrationStore>, images: Arc<dyn ImageStore>) -> Self {
        Self { store, images }
    }

    /// 表单页面所需的医务人员及其中心；中心引用失效时为 `None`
    pub async fn load_form_context(&self, medical_id: Uuid) -> Result<(MedicalStaff, Option<Center>)> {
        let staff = self
            .store
            .get_medical_staff(medical_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound(format!("Medical staff {} not found", medical_id)))?;

        let center = self.store.get_center(staff.center_id).await?;
        Ok((staff, center))
    }

    /// 提交挂号
    ///
    /// 照片上传失败只记录警告，对应字段留空，不阻止提交。
    pub async fn submit(
        &self,
        medical_id: Uuid,
        form: &RegistrationForm,
        photo1: Option<PhotoUpload>,
        photo2: Option<PhotoUpload>,
    ) -> Result<Patient> {
        let staff = self
            .store
            .get_medical_staff(medical_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound(format!("Medical staff {} not found", medical_id)))?;

        let form = form.validate()?;

        let (photo_url_1, photo_url_2) = tokio::join!(
            self.upload_best_effort(photo1, "photo1"),
            self.upload_best_effort(photo2, "photo2"),
        );

        let patient = NewPatient {
            name: form.name,
            phone: form.phone,
            ultrasound_name: form.ultrasound_name,
            medical_id: staff.id,
            center_id: staff.center_id,
            photo_url_1,
            photo_url_2,
        }
        .into_patient();

        self.store.create_patient(&patient).await?;
        info!(
            "Registered patient {} via medical staff {} for center {}",
            patient.id, staff.id, staff.center_id
        );

        Ok(patient)
    }

    async fn upload_best_effort(&self, photo: Option<PhotoUpload>, field: &str) -> Option<String> {
        let photo = photo.filter(|p| !p.is_empty())?;

        match self.images.upload(&photo).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Upload of {} ({}) failed: {}", field, photo.file_name, e);
                None
            }
        }
    }
}
