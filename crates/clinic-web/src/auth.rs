//! 会话与登录状态
//!
//! 会话保存在服务端，浏览器只持有随机令牌；服务端以令牌的 SHA-256 作为键。

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue},
};
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::server::AppState;

/// 会话 Cookie 名称
pub const SESSION_COOKIE: &str = "clinic_session";

/// 登录身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Principal {
    /// 超级管理员
    SuperAdmin,
    /// 中心工作人员
    CenterStaff { center_id: Uuid, center_name: String },
}

/// 提示消息级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

impl FlashLevel {
    pub fn css_class(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
            FlashLevel::Warning => "warning",
            FlashLevel::Danger => "danger",
        }
    }
}

/// 一次性提示消息，读取后即清除
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn new(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Warning, message)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Danger, message)
    }
}

#[derive(Debug, Clone)]
struct Session {
    principal: Principal,
    flash: Option<Flash>,
    expires_at: Instant,
}

/// 生成随机会话令牌（URL 安全 base64，32 字节熵）
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// 令牌哈希，服务端只保存哈希值
pub fn hash_token(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// 服务端会话存储
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<[u8; 32], Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 登录：总是签发新令牌
    pub async fn login(&self, principal: Principal) -> String {
        let token = generate_token();
        let now = Instant::now();
        let session = Session {
            principal,
            flash: None,
            expires_at: now + self.ttl,
        };

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(hash_token(&token), session);
        debug!("Session created, {} active", sessions.len());

        token
    }

    pub async fn logout(&self, token: &str) {
        if self.sessions.write().await.remove(&hash_token(token)).is_some() {
            info!("Session ended");
        }
    }

    /// 查找会话并取出待显示的提示消息
    async fn open(&self, token: &str) -> Option<(Principal, Option<Flash>)> {
        let key = hash_token(token);
        let mut sessions = self.sessions.write().await;

        let expired = match sessions.get(&key) {
            Some(session) => session.expires_at <= Instant::now(),
            None => return None,
        };
        if expired {
            sessions.remove(&key);
            return None;
        }

        sessions
            .get_mut(&key)
            .map(|session| (session.principal.clone(), session.flash.take()))
    }

    /// 为下一次页面渲染设置提示消息
    pub async fn flash(&self, token: &str, flash: Flash) {
        if let Some(session) = self.sessions.write().await.get_mut(&hash_token(token)) {
            session.flash = Some(flash);
        }
    }

    pub async fn principal(&self, token: &str) -> Option<Principal> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&hash_token(token))
            .filter(|s| s.expires_at > Instant::now())
            .map(|s| s.principal.clone())
    }
}

/// 从 Cookie 头中取出会话令牌
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// 登录成功后写入的 Cookie
pub fn session_cookie(token: &str, ttl: Duration) -> HeaderValue {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl.as_secs()
    );
    // 令牌为 URL 安全 base64，总是合法的头部值
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// 注销时清除 Cookie
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("clinic_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// 请求的会话上下文
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub token: Option<String>,
    pub principal: Option<Principal>,
    pub flash: Option<Flash>,
}

impl SessionContext {
    pub fn is_admin(&self) -> bool {
        matches!(self.principal, Some(Principal::SuperAdmin))
    }

    /// 当前中心工作人员的中心ID与名称
    pub fn center(&self) -> Option<(Uuid, &str)> {
        match &self.principal {
            Some(Principal::CenterStaff { center_id, center_name }) => Some((*center_id, center_name.as_str())),
            _ => None,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for SessionContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = match session_token(&parts.headers) {
            Some(token) => token,
            None => return Ok(SessionContext::default()),
        };

        match state.sessions.open(&token).await {
            Some((principal, flash)) => Ok(SessionContext {
                token: Some(token),
                principal: Some(principal),
                flash,
            }),
            None => Ok(SessionContext::default()),
        }
    }
}
