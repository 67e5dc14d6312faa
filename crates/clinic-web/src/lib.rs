//! # 挂号门户 Web 服务
//!
//! 基于 axum 的 HTML 门户：超级管理员后台、中心工作台与公开挂号表单。

pub mod auth;
pub mod handlers;
pub mod server;
pub mod views;

pub use auth::{Flash, FlashLevel, Principal, SessionContext, SessionStore};
pub use handlers::{AppError, WebResult};
pub use server::{create_app, AppState, PortalSettings, WebServer};
