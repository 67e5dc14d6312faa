//! 内存存储后端
//!
//! 用于测试和 `--in-memory` 开发模式。记录按插入顺序保存。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinic_core::{Center, ClinicError, MedicalStaff, Patient, RegistrationStatus, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{GroupCount, RegistrationStore};

#[derive(Debug, Default)]
struct Collections {
    centers: Vec<Center>,
    medical_staff: Vec<MedicalStaff>,
    patients: Vec<Patient>,
}

/// 内存存储实现
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_search(patient: &Patient, term: &str) -> bool {
    let term = term.to_lowercase();
    patient.name.to_lowercase().contains(&term) || patient.phone.to_lowercase().contains(&term)
}

/// 按首次出现的顺序分组计数
fn count_by<F>(patients: &[Patient], key: F) -> Vec<GroupCount>
where
    F: Fn(&Patient) -> Uuid,
{
    let mut order = Vec::new();
    let mut counts: HashMap<Uuid, u64> = HashMap::new();

    for patient in patients {
        let k = key(patient);
        let entry = counts.entry(k).or_insert_with(|| {
            order.push(k);
            0
        });
        *entry += 1;
    }

    order
        .into_iter()
        .map(|k| GroupCount {
            key: k,
            count: counts[&k],
        })
        .collect()
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn create_center(&self, center: &Center) -> Result<()> {
        let mut data = self.inner.write().await;
        if data.centers.iter().any(|c| c.username == center.username) {
            return Err(ClinicError::Validation(format!(
                "Username '{}' already exists.",
                center.username
            )));
        }
        data.centers.push(center.clone());
        Ok(())
    }

    async fn get_center(&self, id: Uuid) -> Result<Option<Center>> {
        let data = self.inner.read().await;
        Ok(data.centers.iter().find(|c| c.id == id).cloned())
    }

    async fn find_center_by_username(&self, username: &str) -> Result<Option<Center>> {
        let data = self.inner.read().await;
        Ok(data.centers.iter().find(|c| c.username == username).cloned())
    }

    async fn list_centers(&self) -> Result<Vec<Center>> {
        let data = self.inner.read().await;
        let mut centers = data.centers.clone();
        // 稳定排序，同名按插入顺序
        centers.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_at.cmp(&b.created_at)));
        Ok(centers)
    }

    async fn update_center_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let mut data = self.inner.write().await;
        match data.centers.iter_mut().find(|c| c.id == id) {
            Some(center) => {
                center.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_medical_staff(&self, staff: &MedicalStaff) -> Result<()> {
        let mut data = self.inner.write().await;
        data.medical_staff.push(staff.clone());
        Ok(())
    }

    async fn set_medical_qr_code(&self, id: Uuid, qr_code: &str) -> Result<()> {
        let mut data = self.inner.write().await;
        if let Some(staff) = data.medical_staff.iter_mut().find(|m| m.id == id) {
            staff.qr_code = qr_code.to_string();
        }
        Ok(())
    }

    async fn get_medical_staff(&self, id: Uuid) -> Result<Option<MedicalStaff>> {
        let data = self.inner.read().await;
        Ok(data.medical_staff.iter().find(|m| m.id == id).cloned())
    }

    async fn list_medical_staff(&self) -> Result<Vec<MedicalStaff>> {
        let data = self.inner.read().await;
        Ok(data.medical_staff.clone())
    }

    async fn create_patient(&self, patient: &Patient) -> Result<()> {
        let mut data = self.inner.write().await;
        data.patients.push(patient.clone());
        Ok(())
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>> {
        let data = self.inner.read().await;
        Ok(data.patients.iter().find(|p| p.id == id).cloned())
    }

    async fn update_patient_status(&self, id: Uuid, status: RegistrationStatus) -> Result<bool> {
        let mut data = self.inner.write().await;
        match data.patients.iter_mut().find(|p| p.id == id) {
            Some(patient) => {
                patient.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_patients_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Patient>> {
        let data = self.inner.read().await;
        let mut patients: Vec<Patient> = data
            .patients
            .iter()
            .filter(|p| p.timestamp >= start && p.timestamp < end)
            .cloned()
            .collect();
        patients.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(patients)
    }

    async fn list_patients_since(&self, start: DateTime<Utc>) -> Result<Vec<Patient>> {
        let data = self.inner.read().await;
        let mut patients: Vec<Patient> = data
            .patients
            .iter()
            .filter(|p| p.timestamp >= start)
            .cloned()
            .collect();
        patients.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(patients)
    }

    async fn list_center_patients(
        &self,
        center_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        search: Option<&str>,
    ) -> Result<Vec<Patient>> {
        let term = search.map(str::trim).filter(|s| !s.is_empty());
        let data = self.inner.read().await;
        let mut patients: Vec<Patient> = data
            .patients
            .iter()
            .filter(|p| p.center_id == center_id)
            .filter(|p| p.timestamp >= start && p.timestamp < end)
            .filter(|p| term.map_or(true, |t| matches_search(p, t)))
            .cloned()
            .collect();
        patients.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(patients)
    }

    async fn count_patients_by_center(&self) -> Result<Vec<GroupCount>> {
        let data = self.inner.read().await;
        Ok(count_by(&data.patients, |p| p.center_id))
    }

    async fn count_patients_by_medical(&self) -> Result<Vec<GroupCount>> {
        let data = self.inner.read().await;
        Ok(count_by(&data.patients, |p| p.medical_id))
    }
}
