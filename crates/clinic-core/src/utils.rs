//! 通用工具函数

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::{ClinicError, Result};

/// 报表与筛选使用的日期格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^[0-9]{10,12}$").expect("phone pattern is valid"))
}

/// 验证手机号：10到12位纯数字
pub fn is_valid_phone(phone: &str) -> bool {
    phone_regex().is_match(phone)
}

/// 解析路径中的记录ID，格式错误时返回验证错误（HTTP 400）
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ClinicError::Validation(format!("Malformed {} id: {}", what, raw)))
}

/// 将分钟偏移量转换为固定时区
pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset> {
    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| ClinicError::Config(format!("UTC offset out of range: {} minutes", minutes)))
}

/// 某个自然日在部署时区下的时间窗口 `[start, end)`，以UTC表示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn for_date(date: NaiveDate, offset: FixedOffset) -> Self {
        let local_midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        // 固定偏移量下本地时间总是唯一映射
        let start = offset
            .from_local_datetime(&local_midnight)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local_midnight));

        Self {
            date,
            start,
            end: start + Duration::days(1),
        }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts < self.end
    }
}

/// 部署时区下的"今天"
pub fn today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

/// 解析 `filter_date` 查询参数；缺失或格式错误时回退到今天
pub fn parse_filter_date(raw: Option<&str>, offset: FixedOffset) -> NaiveDate {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
        .unwrap_or_else(|| today(offset))
}

/// 按部署时区生成 `YYYY-MM-DD` 日期键
pub fn day_key(ts: &DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format(DATE_FORMAT).to_string()
}

/// 二维码目标地址：`{host_url}/register/{medical_id}`
pub fn registration_url(host_url: &str, medical_id: &Uuid) -> String {
    format!("{}/register/{}", host_url.trim_end_matches('/'), medical_id)
}
