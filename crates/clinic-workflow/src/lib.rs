//! # 挂号工作流模块
//!
//! 提供挂号业务流程的核心操作，包括：
//! - 分诊状态机：管理挂号记录 Pending → Running → Complete 的生命周期
//! - 状态更新：按中心做权限隔离的状态变更
//! - 挂号提交：公开表单的校验、照片上传与持久化
//! - 后台管理：中心、医务人员与二维码的维护

pub mod admin;
pub mod registration;
pub mod state_machine;
pub mod status;

// 重新导出主要类型
pub use admin::{AddCenterOutcome, AdminCredentials, AdminService, CenterForm, StaffListing};
pub use registration::{RegistrationForm, RegistrationService};
pub use state_machine::{RegistrationEvent, RegistrationStateMachine};
pub use status::{StatusUpdate, StatusWorkflow};
