//! HTTP处理器

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    Form,
};
use clinic_core::utils::{parse_filter_date, parse_id, DATE_FORMAT};
use clinic_core::{qr, ClinicError, RegistrationStatus};
use clinic_storage::PhotoUpload;
use clinic_workflow::{AddCenterOutcome, CenterForm, RegistrationForm, StatusUpdate};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::auth::{clear_session_cookie, session_cookie, Flash, FlashLevel, Principal, SessionContext};
use crate::server::AppState;
use crate::views::{self, LoginKind};

/// 处理器错误，包装核心错误以转换为 HTTP 响应
#[derive(Debug)]
pub struct AppError(pub ClinicError);

impl From<ClinicError> for AppError {
    fn from(e: ClinicError) -> Self {
        AppError(e)
    }
}

pub type WebResult<T> = std::result::Result<T, AppError>;

/// 错误处理
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ClinicError::NotFound(_) => StatusCode::NOT_FOUND,
            ClinicError::Validation(_) | ClinicError::InvalidStateTransition { .. } => StatusCode::BAD_REQUEST,
            ClinicError::Permission(_) => StatusCode::FORBIDDEN,
            ClinicError::Config(_)
            | ClinicError::Database(_)
            | ClinicError::Storage(_)
            | ClinicError::Network(_)
            | ClinicError::Serialization(_)
            | ClinicError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status.is_server_error() {
            error!("Request failed: {}", self.0);
            "An internal error occurred.".to_string()
        } else {
            self.0.user_message()
        };

        (status, views::error_page(status.as_u16(), &message)).into_response()
    }
}

const ADMIN_LOGIN: &str = "/login";
const CENTER_LOGIN: &str = "/center-login";

/// 为当前会话设置提示消息；验证错误转为提示，其余错误继续上抛
async fn flash_outcome(state: &AppState, ctx: &SessionContext, outcome: clinic_core::Result<Flash>) -> WebResult<()> {
    let flash = match outcome {
        Ok(flash) => flash,
        Err(ClinicError::Validation(msg)) => Flash::danger(msg),
        Err(e) => return Err(e.into()),
    };

    if let Some(token) = &ctx.token {
        state.sessions.flash(token, flash).await;
    }
    Ok(())
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn index(ctx: SessionContext) -> Redirect {
    match ctx.principal {
        Some(Principal::SuperAdmin) => Redirect::to("/admin"),
        Some(Principal::CenterStaff { .. }) => Redirect::to("/center-dashboard"),
        None => Redirect::to(ADMIN_LOGIN),
    }
}

// ========== 登录 ==========

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login_form(ctx: SessionContext) -> Response {
    if ctx.is_admin() {
        return Redirect::to("/admin").into_response();
    }
    views::login_page(LoginKind::Admin, None).into_response()
}

pub async fn login(State(state): State<AppState>, Form(request): Form<LoginRequest>) -> Response {
    info!("Admin login attempt for user: {}", request.username);

    if !state.admin.authenticate_admin(&request.username, &request.password) {
        warn!("Admin login failed for user: {}", request.username);
        return (
            StatusCode::UNAUTHORIZED,
            views::login_page(LoginKind::Admin, Some("Invalid credentials")),
        )
            .into_response();
    }

    let token = state.sessions.login(Principal::SuperAdmin).await;
    (
        [(header::SET_COOKIE, session_cookie(&token, state.sessions.ttl()))],
        Redirect::to("/admin"),
    )
        .into_response()
}

/// 只结束属于该登录入口的会话，其他身份的会话保持不变
async fn end_session(state: &AppState, ctx: &SessionContext, owns: bool, target: &'static str) -> Response {
    match &ctx.token {
        Some(token) if owns => {
            state.sessions.logout(token).await;
            ([(header::SET_COOKIE, clear_session_cookie())], Redirect::to(target)).into_response()
        }
        _ => Redirect::to(target).into_response(),
    }
}

pub async fn logout(State(state): State<AppState>, ctx: SessionContext) -> Response {
    end_session(&state, &ctx, ctx.is_admin(), ADMIN_LOGIN).await
}

pub async fn center_login_form(ctx: SessionContext) -> Response {
    if ctx.center().is_some() {
        return Redirect::to("/center-dashboard").into_response();
    }
    views::login_page(LoginKind::Center, None).into_response()
}

pub async fn center_login(
    State(state): State<AppState>,
    Form(request): Form<LoginRequest>,
) -> WebResult<Response> {
    info!("Center login attempt for user: {}", request.username);

    let center = match state
        .admin
        .authenticate_center(&request.username, &request.password)
        .await?
    {
        Some(center) => center,
        None => {
            warn!("Center login failed for user: {}", request.username);
            return Ok((
                StatusCode::UNAUTHORIZED,
                views::login_page(LoginKind::Center, Some("Invalid credentials")),
            )
                .into_response());
        }
    };

    let token = state
        .sessions
        .login(Principal::CenterStaff {
            center_id: center.id,
            center_name: center.name.clone(),
        })
        .await;
    info!("Center {} logged in", center.id);

    Ok((
        [(header::SET_COOKIE, session_cookie(&token, state.sessions.ttl()))],
        Redirect::to("/center-dashboard"),
    )
        .into_response())
}

pub async fn center_logout(State(state): State<AppState>, ctx: SessionContext) -> Response {
    end_session(&state, &ctx, ctx.center().is_some(), CENTER_LOGIN).await
}

// ========== 超级管理员 ==========

#[derive(Debug, Default, Deserialize)]
pub struct DateFilter {
    pub filter_date: Option<String>,
}

pub async fn admin_dashboard(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(filter): Query<DateFilter>,
) -> WebResult<Response> {
    if !ctx.is_admin() {
        return Ok(Redirect::to(ADMIN_LOGIN).into_response());
    }

    let offset = state.reports.offset();
    let date = parse_filter_date(filter.filter_date.as_deref(), offset);
    let reports = state.reports.build_daily_report(date).await?;

    Ok(views::admin_dashboard(&reports, date, offset, ctx.flash.as_ref()).into_response())
}

pub async fn add_center(
    State(state): State<AppState>,
    ctx: SessionContext,
    Form(form): Form<CenterForm>,
) -> WebResult<Response> {
    if !ctx.is_admin() {
        return Ok(Redirect::to(ADMIN_LOGIN).into_response());
    }

    let outcome = state.admin.add_center(&form).await.map(|outcome| match outcome {
        AddCenterOutcome::Created(center) => Flash::success(format!("Center '{}' added.", center.name)),
        AddCenterOutcome::DuplicateUsername(username) => {
            Flash::warning(format!("Username '{}' already exists.", username))
        }
    });
    flash_outcome(&state, &ctx, outcome).await?;

    Ok(Redirect::to("/admin").into_response())
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub new_password: String,
}

pub async fn reset_center_password(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(center_id): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> WebResult<Response> {
    if !ctx.is_admin() {
        return Ok(Redirect::to(ADMIN_LOGIN).into_response());
    }

    let center_id = parse_id(&center_id, "center")?;
    let outcome = state
        .admin
        .reset_center_password(center_id, &form.new_password)
        .await
        .map(|()| Flash::success("Password reset successfully."));
    flash_outcome(&state, &ctx, outcome).await?;

    Ok(Redirect::to("/admin").into_response())
}

#[derive(Debug, Deserialize)]
pub struct MedicalForm {
    pub name: String,
    pub center_id: String,
}

pub async fn add_medical(
    State(state): State<AppState>,
    ctx: SessionContext,
    Form(form): Form<MedicalForm>,
) -> WebResult<Response> {
    if !ctx.is_admin() {
        return Ok(Redirect::to(ADMIN_LOGIN).into_response());
    }

    let center_id = parse_id(&form.center_id, "center")?;
    let outcome = state
        .admin
        .add_medical_staff(&form.name, center_id)
        .await
        .map(|staff| Flash::success(format!("Medical staff '{}' added.", staff.name)));
    flash_outcome(&state, &ctx, outcome).await?;

    Ok(Redirect::to("/admin").into_response())
}

pub async fn medicals(State(state): State<AppState>, ctx: SessionContext) -> WebResult<Response> {
    if !ctx.is_admin() {
        return Ok(Redirect::to(ADMIN_LOGIN).into_response());
    }

    let listings = state.admin.list_medical_staff_with_centers().await?;
    Ok(views::medicals_page(&listings, state.admin.host_url(), ctx.flash.as_ref()).into_response())
}

pub async fn qr_image(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(medical_id): Path<String>,
) -> WebResult<Response> {
    if !ctx.is_admin() {
        return Ok(Redirect::to(ADMIN_LOGIN).into_response());
    }

    let medical_id = parse_id(&medical_id, "medical staff")?;
    let svg = state.admin.qr_image(medical_id).await?;

    Ok(([(header::CONTENT_TYPE, qr::QR_MIME_TYPE)], svg).into_response())
}

pub async fn analytics(State(state): State<AppState>, ctx: SessionContext) -> WebResult<Response> {
    if !ctx.is_admin() {
        return Ok(Redirect::to(ADMIN_LOGIN).into_response());
    }

    let window_days = state.settings.analytics_window_days;
    let analytics = state.reports.build_analytics(window_days).await?;
    Ok(views::analytics_page(&analytics, window_days, ctx.flash.as_ref()).into_response())
}

// ========== 中心工作人员 ==========

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub filter_date: Option<String>,
    pub search_query: Option<String>,
}

pub async fn center_dashboard(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(query): Query<DashboardQuery>,
) -> WebResult<Response> {
    let (center_id, center_name) = match ctx.center() {
        Some(center) => center,
        None => return Ok(Redirect::to(CENTER_LOGIN).into_response()),
    };

    let offset = state.reports.offset();
    let date = parse_filter_date(query.filter_date.as_deref(), offset);
    let search = query.search_query.as_deref().unwrap_or("").trim();
    let patients = state
        .reports
        .center_registrations(center_id, date, Some(search))
        .await?;

    Ok(views::center_dashboard(
        ctx.principal.as_ref(),
        center_name,
        &patients,
        date,
        search,
        offset,
        state.status.state_machine(),
        ctx.flash.as_ref(),
    )
    .into_response())
}

pub async fn center_export(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(filter): Query<DateFilter>,
) -> WebResult<Response> {
    let (center_id, _) = match ctx.center() {
        Some(center) => center,
        None => return Ok(Redirect::to(CENTER_LOGIN).into_response()),
    };

    let date = parse_filter_date(filter.filter_date.as_deref(), state.reports.offset());
    let csv = state.reports.export_center_csv(center_id, date).await?;
    let disposition = format!(
        "attachment; filename=\"registrations-{}.csv\"",
        date.format(DATE_FORMAT)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub new_status: String,
}

/// 返回来源页面（仅限本站工作台），否则回到工作台首页
fn dashboard_return_path(headers: &HeaderMap, host_url: &str) -> String {
    headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .map(|referer| referer.strip_prefix(host_url.trim_end_matches('/')).unwrap_or(referer))
        .filter(|path| path.starts_with("/center-dashboard"))
        .unwrap_or("/center-dashboard")
        .to_string()
}

pub async fn update_patient_status(
    State(state): State<AppState>,
    ctx: SessionContext,
    headers: HeaderMap,
    Path(patient_id): Path<String>,
    Form(form): Form<StatusForm>,
) -> WebResult<Response> {
    let (center_id, _) = match ctx.center() {
        Some(center) => center,
        None => return Ok(Redirect::to(CENTER_LOGIN).into_response()),
    };

    let patient_id = parse_id(&patient_id, "patient")?;
    let new_status: RegistrationStatus = form.new_status.trim().parse()?;

    let flash = match state.status.set_status(patient_id, new_status, center_id).await? {
        StatusUpdate::Applied { to, .. } => Flash::success(format!("Status updated to {}.", to)),
        StatusUpdate::Unchanged(status) => Flash::new(FlashLevel::Info, format!("Status is already {}.", status)),
        StatusUpdate::NotFound | StatusUpdate::Forbidden => Flash::warning("Registration not found."),
        StatusUpdate::Rejected { from, to } => {
            Flash::warning(format!("Cannot move a registration from {} back to {}.", from, to))
        }
    };
    flash_outcome(&state, &ctx, Ok(flash)).await?;

    let target = dashboard_return_path(&headers, &state.settings.host_url);
    Ok(Redirect::to(&target).into_response())
}

// ========== 公开挂号 ==========

pub async fn register_form(
    State(state): State<AppState>,
    Path(medical_id): Path<String>,
) -> WebResult<Html<String>> {
    let medical_id = parse_id(&medical_id, "medical staff")?;
    let (staff, center) = state.registration.load_form_context(medical_id).await?;
    Ok(views::register_page(&staff, center.as_ref(), None))
}

/// 读取挂号表单的全部字段
async fn read_registration(
    mut multipart: Multipart,
) -> WebResult<(RegistrationForm, Option<PhotoUpload>, Option<PhotoUpload>)> {
    let mut form = RegistrationForm::default();
    let mut photo1 = None;
    let mut photo2 = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed registration form: {}", e);
        ClinicError::Validation("Malformed registration form.".to_string())
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "name" | "phone" | "ultrasound_name" => {
                let value = field.text().await.map_err(|e| {
                    warn!("Failed to read form field {}: {}", name, e);
                    ClinicError::Validation("Malformed registration form.".to_string())
                })?;
                match name.as_str() {
                    "name" => form.name = value,
                    "phone" => form.phone = value,
                    _ => form.ultrasound_name = value,
                }
            }
            "photo1" | "photo2" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    warn!("Failed to read upload bytes: {}", e);
                    ClinicError::Validation("Failed to read uploaded photo.".to_string())
                })?;

                let upload = PhotoUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                };
                if name == "photo1" {
                    photo1 = Some(upload);
                } else {
                    photo2 = Some(upload);
                }
            }
            _ => {}
        }
    }

    Ok((form, photo1, photo2))
}

pub async fn register_submit(
    State(state): State<AppState>,
    Path(medical_id): Path<String>,
    multipart: Multipart,
) -> WebResult<Response> {
    let medical_id = parse_id(&medical_id, "medical staff")?;
    let (staff, center) = state.registration.load_form_context(medical_id).await?;
    let (form, photo1, photo2) = read_registration(multipart).await?;

    match state.registration.submit(medical_id, &form, photo1, photo2).await {
        Ok(_) => Ok(Redirect::to("/success").into_response()),
        Err(ClinicError::Validation(msg)) => {
            Ok(views::register_page(&staff, center.as_ref(), Some(&msg)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn success() -> Html<String> {
    views::success_page()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let status = |e: ClinicError| AppError(e).into_response().status();
        assert_eq!(status(ClinicError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(ClinicError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(ClinicError::Permission("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status(ClinicError::Database("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(ClinicError::Storage("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_return_path_stays_on_dashboard() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::REFERER,
            "https://clinic.example/center-dashboard?filter_date=2024-05-03".parse().unwrap(),
        );
        assert_eq!(
            dashboard_return_path(&headers, "https://clinic.example/"),
            "/center-dashboard?filter_date=2024-05-03"
        );

        headers.insert(header::REFERER, "https://evil.example/".parse().unwrap());
        assert_eq!(dashboard_return_path(&headers, "https://clinic.example"), "/center-dashboard");
        assert_eq!(dashboard_return_path(&HeaderMap::new(), ""), "/center-dashboard");
    }
}
