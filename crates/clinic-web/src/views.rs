//! HTML 页面渲染

use axum::response::Html;
use chrono::{FixedOffset, NaiveDate};
use clinic_core::utils::DATE_FORMAT;
use clinic_core::{qr, Center, MedicalStaff, Patient, RegistrationStatus};
use clinic_reporting::{Analytics, CenterReport, ChartSeries};
use clinic_workflow::{RegistrationStateMachine, StaffListing};
use std::fmt::Write;

use crate::auth::{Flash, Principal};

const STYLES: &str = r#"<link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.2/dist/css/bootstrap.min.css" rel="stylesheet">
<style>.photo-thumbnail{width:48px;height:48px;object-fit:cover;border-radius:4px;margin-right:4px}.qr{width:96px;height:96px}</style>"#;

/// HTML 转义
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

fn document(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"UTF-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\
         <title>{}</title>{}</head><body>{}</body></html>",
        escape(title),
        STYLES,
        body
    ))
}

fn navigation(principal: Option<&Principal>) -> String {
    let links = match principal {
        Some(Principal::SuperAdmin) => concat!(
            r#"<li class="nav-item"><a class="nav-link" href="/admin">Dashboard</a></li>"#,
            r#"<li class="nav-item"><a class="nav-link" href="/medicals">Medical Staff</a></li>"#,
            r#"<li class="nav-item"><a class="nav-link" href="/analytics">Analytics</a></li>"#,
            r#"<li class="nav-item"><a class="nav-link" href="/logout">Logout</a></li>"#
        )
        .to_string(),
        Some(Principal::CenterStaff { .. }) => concat!(
            r#"<li class="nav-item"><a class="nav-link" href="/center-dashboard">Center Dashboard</a></li>"#,
            r#"<li class="nav-item"><a class="nav-link" href="/center-logout">Logout</a></li>"#
        )
        .to_string(),
        None => String::new(),
    };

    format!(
        r#"<nav class="navbar navbar-expand navbar-dark bg-primary mb-4"><div class="container">
<a class="navbar-brand" href="/">Clinic Portal</a><ul class="navbar-nav ms-auto">{}</ul></div></nav>"#,
        links
    )
}

fn flash_banner(flash: Option<&Flash>) -> String {
    match flash {
        Some(flash) => format!(
            r#"<div class="alert alert-{}">{}</div>"#,
            flash.level.css_class(),
            escape(&flash.message)
        ),
        None => String::new(),
    }
}

/// 带导航栏的后台页面
pub fn page(title: &str, principal: Option<&Principal>, flash: Option<&Flash>, content: &str) -> Html<String> {
    let body = format!(
        r#"{}<main class="container">{}{}</main>"#,
        navigation(principal),
        flash_banner(flash),
        content
    );
    document(title, &body)
}

/// 登录页类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginKind {
    Admin,
    Center,
}

impl LoginKind {
    fn action(&self) -> &'static str {
        match self {
            LoginKind::Admin => "/login",
            LoginKind::Center => "/center-login",
        }
    }

    fn heading(&self) -> &'static str {
        match self {
            LoginKind::Admin => "Admin Login",
            LoginKind::Center => "Center Login",
        }
    }
}

pub fn login_page(kind: LoginKind, error: Option<&str>) -> Html<String> {
    let banner = error
        .map(|msg| format!(r#"<div class="alert alert-danger">{}</div>"#, escape(msg)))
        .unwrap_or_default();
    let content = format!(
        r#"<div class="row justify-content-center"><div class="col-md-4"><div class="card"><div class="card-body">
<h4 class="mb-3">{heading}</h4>{banner}
<form method="POST" action="{action}">
<div class="mb-3"><label class="form-label">Username</label><input class="form-control" name="username" required></div>
<div class="mb-3"><label class="form-label">Password</label><input class="form-control" type="password" name="password" required></div>
<button class="btn btn-primary w-100" type="submit">Login</button></form></div></div></div></div>"#,
        heading = kind.heading(),
        banner = banner,
        action = kind.action()
    );
    page(kind.heading(), None, None, &content)
}

fn center_options(centers: &[&Center]) -> String {
    centers
        .iter()
        .map(|c| format!(r#"<option value="{}">{}</option>"#, c.id, escape(&c.name)))
        .collect()
}

fn patient_row(patient: &Patient, offset: FixedOffset) -> String {
    format!(
        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
        escape(&patient.name),
        escape(&patient.phone),
        escape(&patient.ultrasound_name),
        patient.timestamp.with_timezone(&offset).format("%H:%M"),
        status_badge(patient.status)
    )
}

fn status_badge(status: RegistrationStatus) -> String {
    let color = match status {
        RegistrationStatus::Pending => "warning",
        RegistrationStatus::Running => "info",
        RegistrationStatus::Complete => "success",
    };
    format!(r#"<span class="badge bg-{} text-dark">{}</span>"#, color, status)
}

/// 超级管理员每日报表
pub fn admin_dashboard(
    reports: &[CenterReport],
    date: NaiveDate,
    offset: FixedOffset,
    flash: Option<&Flash>,
) -> Html<String> {
    let date_str = date.format(DATE_FORMAT).to_string();
    let centers: Vec<&Center> = reports.iter().map(|r| &r.center).collect();
    let mut content = String::new();

    let _ = write!(
        content,
        r#"<form method="GET" action="/admin" class="row g-2 mb-4">
<div class="col-auto"><input type="date" name="filter_date" class="form-control" value="{}"></div>
<div class="col-auto"><button class="btn btn-primary" type="submit">Show</button></div></form>"#,
        date_str
    );

    let _ = write!(
        content,
        r#"<div class="row mb-4"><div class="col-md-6"><div class="card"><div class="card-body"><h5>Add Center</h5>
<form method="POST" action="/add-center">
<input class="form-control mb-2" name="name" placeholder="Center name" required>
<input class="form-control mb-2" name="address" placeholder="Address" required>
<input class="form-control mb-2" name="username" placeholder="Login username" required>
<input class="form-control mb-2" type="password" name="password" placeholder="Password" required>
<button class="btn btn-success" type="submit">Add Center</button></form></div></div></div>
<div class="col-md-6"><div class="card"><div class="card-body"><h5>Add Medical Staff</h5>
<form method="POST" action="/add-medical">
<input class="form-control mb-2" name="name" placeholder="Staff name" required>
<select class="form-select mb-2" name="center_id" required>{}</select>
<button class="btn btn-success" type="submit">Add Medical Staff</button></form></div></div></div></div>"#,
        center_options(&centers)
    );

    if reports.is_empty() {
        content.push_str(r#"<div class="alert alert-info">No centers yet. Add one above.</div>"#);
    }

    for report in reports {
        let _ = write!(
            content,
            r#"<div class="card mb-3"><div class="card-header d-flex justify-content-between">
<span><strong>{}</strong> <small class="text-muted">{}</small></span>
<span class="badge bg-primary">{} registrations on {}</span></div><div class="card-body">
<form method="POST" action="/reset-center-password/{}" class="row g-2 mb-3">
<div class="col-auto"><input class="form-control form-control-sm" type="password" name="new_password" placeholder="New password" required></div>
<div class="col-auto"><button class="btn btn-sm btn-outline-secondary" type="submit">Reset Password</button></div></form>"#,
            escape(&report.center.name),
            escape(&report.center.address),
            report.patient_count(),
            date_str,
            report.center.id
        );

        if report.staff.is_empty() {
            content.push_str(r#"<p class="text-muted">No medical staff assigned.</p>"#);
        }

        for entry in &report.staff {
            let _ = write!(
                content,
                r#"<h6 class="mt-3">{} <small class="text-muted">({})</small></h6>"#,
                escape(&entry.staff.name),
                entry.patients.len()
            );
            if entry.patients.is_empty() {
                content.push_str(r#"<p class="text-muted small">No registrations.</p>"#);
                continue;
            }
            content.push_str(
                r#"<table class="table table-sm"><thead><tr><th>Name</th><th>Phone</th><th>Ultrasound</th><th>Time</th><th>Status</th></tr></thead><tbody>"#,
            );
            for patient in &entry.patients {
                content.push_str(&patient_row(patient, offset));
            }
            content.push_str("</tbody></table>");
        }
        content.push_str("</div></div>");
    }

    page("Admin Dashboard", Some(&Principal::SuperAdmin), flash, &content)
}

/// 医务人员列表与二维码
pub fn medicals_page(listings: &[StaffListing], host_url: &str, flash: Option<&Flash>) -> Html<String> {
    let mut content = String::from(
        r#"<h4 class="mb-3">Medical Staff</h4><table class="table align-middle"><thead><tr><th>Name</th><th>Center</th><th>Registration Link</th><th>QR Code</th></tr></thead><tbody>"#,
    );

    if listings.is_empty() {
        content.push_str(r#"<tr><td colspan="4" class="text-center text-muted">No medical staff yet.</td></tr>"#);
    }

    for listing in listings {
        let link = clinic_core::utils::registration_url(host_url, &listing.staff.id);
        let _ = write!(
            content,
            r#"<tr><td>{}</td><td>{}</td><td><a href="{link}">{link}</a></td><td><a href="/qr/{id}"><img class="qr" src="{src}" alt="QR"></a></td></tr>"#,
            escape(&listing.staff.name),
            escape(&listing.center_name),
            link = escape(&link),
            id = listing.staff.id,
            src = qr::data_uri(&listing.staff.qr_code)
        );
    }
    content.push_str("</tbody></table>");

    page("Medical Staff", Some(&Principal::SuperAdmin), flash, &content)
}

/// 中心工作台
#[allow(clippy::too_many_arguments)]
pub fn center_dashboard(
    principal: Option<&Principal>,
    center_name: &str,
    patients: &[Patient],
    date: NaiveDate,
    search: &str,
    offset: FixedOffset,
    state_machine: &RegistrationStateMachine,
    flash: Option<&Flash>,
) -> Html<String> {
    let date_str = date.format(DATE_FORMAT).to_string();
    let mut content = String::new();

    let _ = write!(
        content,
        r#"<h4 class="mb-3">Dashboard for {name}</h4>
<form method="GET" action="/center-dashboard" class="row g-2 mb-3">
<div class="col-sm-5"><input type="text" name="search_query" class="form-control" placeholder="Search name or phone" value="{search}"></div>
<div class="col-sm-4"><input type="date" name="filter_date" class="form-control" value="{date}"></div>
<div class="col-sm-2"><button type="submit" class="btn btn-primary w-100">Filter</button></div>
<div class="col-sm-1"><a class="btn btn-outline-secondary w-100" href="/center-export?filter_date={date}">CSV</a></div></form>
<div class="card"><div class="card-header">Total Registrations on {date}: <span class="badge bg-primary">{count}</span></div>
<table class="table table-hover mb-0 align-middle"><thead><tr><th>Patient</th><th>Photos</th><th>Status</th><th>Action</th></tr></thead><tbody>"#,
        name = escape(center_name),
        search = escape(search),
        date = date_str,
        count = patients.len()
    );

    if patients.is_empty() {
        content.push_str(r#"<tr><td colspan="4" class="text-center text-muted p-4">No registrations found.</td></tr>"#);
    }

    for patient in patients {
        let photos: String = [&patient.photo_url_1, &patient.photo_url_2]
            .iter()
            .filter_map(|url| url.as_deref())
            .map(|url| {
                format!(
                    r#"<a href="{0}" target="_blank"><img src="{0}" class="photo-thumbnail"></a>"#,
                    escape(url)
                )
            })
            .collect();

        let targets = state_machine.available_targets(patient.status);
        let actions = if targets.is_empty() {
            r#"<span class="text-success">Done</span>"#.to_string()
        } else {
            targets
                .iter()
                .map(|target| {
                    format!(
                        r#"<form method="POST" action="/update-patient-status/{}" class="d-inline"><input type="hidden" name="new_status" value="{}"><button class="btn btn-sm btn-outline-primary" type="submit">Mark {}</button></form> "#,
                        patient.id, target, target
                    )
                })
                .collect()
        };

        let _ = write!(
            content,
            r#"<tr><td><strong>{}</strong><br><small class="text-muted">{} | {} | {}</small></td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
            escape(&patient.name),
            escape(&patient.phone),
            escape(&patient.ultrasound_name),
            patient.timestamp.with_timezone(&offset).format("%H:%M"),
            photos,
            status_badge(patient.status),
            actions
        );
    }
    content.push_str("</tbody></table></div>");

    page(&format!("{} Dashboard", center_name), principal, flash, &content)
}

fn chart_json(series: &ChartSeries) -> String {
    // 内联到 <script> 中，避免提前闭合标签
    serde_json::to_string(series)
        .unwrap_or_else(|_| "{\"labels\":[],\"data\":[]}".to_string())
        .replace("</", "<\\/")
}

fn series_table(title: &str, series: &ChartSeries) -> String {
    let rows: String = if series.is_empty() {
        r#"<tr><td colspan="2" class="text-muted">No data.</td></tr>"#.to_string()
    } else {
        series
            .labels
            .iter()
            .zip(&series.data)
            .map(|(label, count)| format!("<tr><td>{}</td><td>{}</td></tr>", escape(label), count))
            .collect()
    };
    format!(
        r#"<div class="col-md-4"><div class="card mb-3"><div class="card-header">{}</div><table class="table table-sm mb-0"><tbody>{}</tbody></table></div></div>"#,
        escape(title),
        rows
    )
}

/// 统计分析页
pub fn analytics_page(analytics: &Analytics, window_days: u32, flash: Option<&Flash>) -> Html<String> {
    let content = format!(
        r#"<h4 class="mb-3">Analytics</h4>
<div class="card mb-4"><div class="card-body"><canvas id="daily"></canvas></div></div>
<div class="row">{}{}{}</div>
<script src="https://cdn.jsdelivr.net/npm/chart.js"></script>
<script>
const daily = {};
new Chart(document.getElementById('daily'), {{type: 'line', data: {{labels: daily.labels, datasets: [{{label: 'Registrations', data: daily.data}}]}}}});
</script>"#,
        series_table(&format!("Daily registrations (last {} days)", window_days), &analytics.daily),
        series_table("Top centers", &analytics.top_centers),
        series_table("Top medical staff", &analytics.top_medical_staff),
        chart_json(&analytics.daily)
    );

    page("Analytics", Some(&Principal::SuperAdmin), flash, &content)
}

/// 公开挂号表单
pub fn register_page(staff: &MedicalStaff, center: Option<&Center>, error: Option<&str>) -> Html<String> {
    let center_name = center.map(|c| c.name.as_str()).unwrap_or("Unknown");
    let banner = error
        .map(|msg| format!(r#"<div class="alert alert-danger">{}</div>"#, escape(msg)))
        .unwrap_or_default();

    let body = format!(
        r#"<main class="container py-4"><div class="row justify-content-center"><div class="col-md-6"><div class="card">
<div class="card-header text-center"><h3>Patient Registration</h3></div><div class="card-body p-4">
<p class="text-center">Registering with <strong>{staff}</strong> at <strong>{center}</strong>.</p>{banner}
<form method="POST" enctype="multipart/form-data">
<div class="mb-3"><label class="form-label">Full Name</label><input type="text" class="form-control" name="name" required></div>
<div class="mb-3"><label class="form-label">Phone Number</label><input type="tel" class="form-control" name="phone" required minlength="10" maxlength="12" pattern="[0-9]{{10,12}}"></div>
<div class="mb-3"><label class="form-label">Ultrasound Name</label><input type="text" class="form-control" name="ultrasound_name" required></div>
<div class="mb-3"><label class="form-label">Upload Photo 1 (Optional)</label><input type="file" class="form-control" name="photo1" accept="image/*"></div>
<div class="mb-3"><label class="form-label">Upload Photo 2 (Optional)</label><input type="file" class="form-control" name="photo2" accept="image/*"></div>
<button type="submit" class="btn btn-primary w-100">Submit Registration</button></form></div></div></div></div></main>"#,
        staff = escape(&staff.name),
        center = escape(center_name),
        banner = banner
    );
    document("Patient Registration", &body)
}

pub fn success_page() -> Html<String> {
    document(
        "Success",
        r#"<main class="container text-center py-5"><h1 class="display-5">Registration Successful!</h1>
<p class="lead">Thank you. Your information has been submitted.</p></main>"#,
    )
}

pub fn error_page(status: u16, message: &str) -> Html<String> {
    document(
        "Error",
        &format!(
            r#"<main class="container py-5"><h2>Error {}</h2><p>{}</p></main>"#,
            status,
            escape(message)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"A&B\"</b>"), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
        assert_eq!(escape("O'Neil"), "O&#x27;Neil");
    }

    #[test]
    fn test_empty_admin_dashboard_offers_add_center() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let Html(html) = admin_dashboard(&[], date, utc, None);
        assert!(html.contains("No centers yet"));
        assert!(html.contains("value=\"2024-05-03\""));
    }

    #[test]
    fn test_register_page_escapes_names() {
        let staff = MedicalStaff {
            id: Uuid::new_v4(),
            name: "<script>".to_string(),
            center_id: Uuid::new_v4(),
            qr_code: String::new(),
            created_at: Utc::now(),
        };
        let Html(html) = register_page(&staff, None, Some("Invalid phone"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Unknown"));
        assert!(html.contains("Invalid phone"));
    }

    #[test]
    fn test_chart_json_is_script_safe() {
        let series = ChartSeries {
            labels: vec!["</script>".to_string()],
            data: vec![1],
        };
        assert!(!chart_json(&series).contains("</script>"));
    }
}
