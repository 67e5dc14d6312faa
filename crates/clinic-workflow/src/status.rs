//! 挂号状态更新
//!
//! 中心工作人员只能修改本中心的挂号记录；越权或找不到记录时不做任何修改。

use clinic_core::{RegistrationStatus, Result};
use clinic_database::RegistrationStore;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state_machine::RegistrationStateMachine;

/// 状态更新结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// 已写入新状态
    Applied {
        from: RegistrationStatus,
        to: RegistrationStatus,
    },
    /// 目标状态与当前状态相同
    Unchanged(RegistrationStatus),
    /// 记录不存在
    NotFound,
    /// 记录属于其他中心
    Forbidden,
    /// 逆向或不允许的转换
    Rejected {
        from: RegistrationStatus,
        to: RegistrationStatus,
    },
}

impl StatusUpdate {
    pub fn is_applied(&self) -> bool {
        matches!(self, StatusUpdate::Applied { .. })
    }
}

/// 状态工作流
pub struct StatusWorkflow {
    store: Arc<dyn RegistrationStore>,
    state_machine: RegistrationStateMachine,
}

impl StatusWorkflow {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self {
            store,
            state_machine: RegistrationStateMachine::new(),
        }
    }

    pub fn state_machine(&self) -> &RegistrationStateMachine {
        &self.state_machine
    }

    /// 修改挂号状态
    pub async fn set_status(
        &self,
        patient_id: Uuid,
        new_status: RegistrationStatus,
        acting_center_id: Uuid,
    ) -> Result<StatusUpdate> {
        let patient = match self.store.get_patient(patient_id).await? {
            Some(patient) => patient,
            None => {
                warn!("Status update for unknown patient {}", patient_id);
                return Ok(StatusUpdate::NotFound);
            }
        };

        if patient.center_id != acting_center_id {
            warn!(
                "Center {} attempted to update patient {} owned by center {}",
                acting_center_id, patient_id, patient.center_id
            );
            return Ok(StatusUpdate::Forbidden);
        }

        let current = patient.status;
        if current == new_status {
            return Ok(StatusUpdate::Unchanged(current));
        }

        let next = match self.state_machine.transition_to(current, new_status) {
            Ok(next) => next,
            Err(e) => {
                warn!("Rejected status change for patient {}: {}", patient_id, e);
                return Ok(StatusUpdate::Rejected {
                    from: current,
                    to: new_status,
                });
            }
        };

        if !self.store.update_patient_status(patient_id, next).await? {
            // 读取与写入之间记录消失
            return Ok(StatusUpdate::NotFound);
        }

        info!("Patient {} status updated from {} to {}", patient_id, current, next);
        Ok(StatusUpdate::Applied { from: current, to: next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clinic_core::Patient;
    use clinic_database::MemoryStore;

    async fn seed(store: &MemoryStore, center_id: Uuid, status: RegistrationStatus) -> Uuid {
        let patient = Patient {
            id: Uuid::new_v4(),
            name: "Lata".to_string(),
            phone: "9876543210".to_string(),
            ultrasound_name: "Thyroid".to_string(),
            medical_id: Uuid::new_v4(),
            center_id,
            timestamp: Utc::now(),
            status,
            photo_url_1: None,
            photo_url_2: None,
        };
        store.create_patient(&patient).await.unwrap();
        patient.id
    }

    async fn status_of(store: &MemoryStore, id: Uuid) -> RegistrationStatus {
        store.get_patient(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_forward_transitions_applied() {
        let store = MemoryStore::new();
        let center_id = Uuid::new_v4();
        let id = seed(&store, center_id, RegistrationStatus::Pending).await;
        let workflow = StatusWorkflow::new(Arc::new(store.clone()));

        let result = workflow.set_status(id, RegistrationStatus::Running, center_id).await.unwrap();
        assert_eq!(
            result,
            StatusUpdate::Applied {
                from: RegistrationStatus::Pending,
                to: RegistrationStatus::Running
            }
        );

        let result = workflow.set_status(id, RegistrationStatus::Complete, center_id).await.unwrap();
        assert!(result.is_applied());
        assert_eq!(status_of(&store, id).await, RegistrationStatus::Complete);
    }

    #[tokio::test]
    async fn test_other_center_is_noop() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let id = seed(&store, owner, RegistrationStatus::Pending).await;
        let workflow = StatusWorkflow::new(Arc::new(store.clone()));

        let result = workflow
            .set_status(id, RegistrationStatus::Running, Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(result, StatusUpdate::Forbidden);
        assert!(!result.is_applied());
        assert_eq!(status_of(&store, id).await, RegistrationStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_patient_is_noop() {
        let workflow = StatusWorkflow::new(Arc::new(MemoryStore::new()));
        let result = workflow
            .set_status(Uuid::new_v4(), RegistrationStatus::Running, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(result, StatusUpdate::NotFound);
    }

    #[tokio::test]
    async fn test_backward_transition_rejected() {
        let store = MemoryStore::new();
        let center_id = Uuid::new_v4();
        let id = seed(&store, center_id, RegistrationStatus::Complete).await;
        let workflow = StatusWorkflow::new(Arc::new(store.clone()));

        let result = workflow.set_status(id, RegistrationStatus::Pending, center_id).await.unwrap();
        assert_eq!(
            result,
            StatusUpdate::Rejected {
                from: RegistrationStatus::Complete,
                to: RegistrationStatus::Pending
            }
        );
        assert_eq!(status_of(&store, id).await, RegistrationStatus::Complete);
    }

    #[tokio::test]
    async fn test_same_status_unchanged() {
        let store = MemoryStore::new();
        let center_id = Uuid::new_v4();
        let id = seed(&store, center_id, RegistrationStatus::Running).await;
        let workflow = StatusWorkflow::new(Arc::new(store));

        let result = workflow.set_status(id, RegistrationStatus::Running, center_id).await.unwrap();
        assert_eq!(result, StatusUpdate::Unchanged(RegistrationStatus::Running));
    }
}
