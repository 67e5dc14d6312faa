//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use chrono::FixedOffset;
use clinic_core::Result;
use clinic_database::RegistrationStore;
use clinic_reporting::ReportService;
use clinic_storage::ImageStore;
use clinic_workflow::{AdminCredentials, AdminService, RegistrationService, StatusWorkflow};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::auth::SessionStore;
use crate::handlers;

/// 门户运行参数
#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub host_url: String,
    pub admin: AdminCredentials,
    pub session_ttl: Duration,
    pub utc_offset: FixedOffset,
    pub analytics_window_days: u32,
    pub max_upload_bytes: usize,
}

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub admin: Arc<AdminService>,
    pub registration: Arc<RegistrationService>,
    pub status: Arc<StatusWorkflow>,
    pub reports: Arc<ReportService>,
    pub sessions: SessionStore,
    pub settings: Arc<PortalSettings>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        images: Arc<dyn ImageStore>,
        settings: PortalSettings,
    ) -> Self {
        Self {
            admin: Arc::new(AdminService::new(
                store.clone(),
                &settings.host_url,
                settings.admin.clone(),
            )),
            registration: Arc::new(RegistrationService::new(store.clone(), images)),
            status: Arc::new(StatusWorkflow::new(store.clone())),
            reports: Arc::new(ReportService::new(store, settings.utc_offset)),
            sessions: SessionStore::new(settings.session_ttl),
            settings: Arc::new(settings),
        }
    }
}

/// 构建路由
pub fn create_app(state: AppState, uploads_dir: Option<PathBuf>) -> Router {
    let body_limit = state.settings.max_upload_bytes;

    let mut app = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        // 超级管理员
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route("/admin", get(handlers::admin_dashboard))
        .route("/add-center", post(handlers::add_center))
        .route("/reset-center-password/:center_id", post(handlers::reset_center_password))
        .route("/add-medical", post(handlers::add_medical))
        .route("/medicals", get(handlers::medicals))
        .route("/qr/:medical_id", get(handlers::qr_image))
        .route("/analytics", get(handlers::analytics))
        // 中心工作人员
        .route("/center-login", get(handlers::center_login_form).post(handlers::center_login))
        .route("/center-logout", get(handlers::center_logout))
        .route("/center-dashboard", get(handlers::center_dashboard))
        .route("/center-export", get(handlers::center_export))
        .route("/update-patient-status/:patient_id", post(handlers::update_patient_status))
        // 公开挂号
        .route("/register/:medical_id", get(handlers::register_form).post(handlers::register_submit))
        .route("/success", get(handlers::success));

    // 本地存储的照片由本服务直接提供
    if let Some(dir) = uploads_dir {
        app = app.nest_service("/uploads", ServeDir::new(dir));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(body_limit)),
    )
    .with_state(state)
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState, uploads_dir: Option<PathBuf>) -> Self {
        let app = create_app(state, uploads_dir);
        Self { addr, app }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Web server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
