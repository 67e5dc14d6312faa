//! 挂号数据聚合

use chrono::{Duration, FixedOffset, NaiveDate, Utc};
use clinic_core::utils::{day_key, DayWindow};
use clinic_core::{Center, MedicalStaff, Patient, Result};
use clinic_database::{GroupCount, RegistrationStore};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::export::patients_to_csv;

/// 排行榜条目数
pub const TOP_N: usize = 5;

/// 医务人员及其当日挂号
#[derive(Debug, Clone, Serialize)]
pub struct StaffReport {
    pub staff: MedicalStaff,
    pub patients: Vec<Patient>,
}

/// 中心及其医务人员
#[derive(Debug, Clone, Serialize)]
pub struct CenterReport {
    pub center: Center,
    pub staff: Vec<StaffReport>,
}

impl CenterReport {
    pub fn patient_count(&self) -> usize {
        self.staff.iter().map(|s| s.patients.len()).sum()
    }
}

/// 图表数据序列
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub data: Vec<u64>,
}

impl ChartSeries {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// 统计分析结果
#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    pub daily: ChartSeries,
    pub top_centers: ChartSeries,
    pub top_medical_staff: ChartSeries,
}

/// 报表服务
pub struct ReportService {
    store: Arc<dyn RegistrationStore>,
    offset: FixedOffset,
}

impl ReportService {
    pub fn new(store: Arc<dyn RegistrationStore>, offset: FixedOffset) -> Self {
        Self { store, offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// 构建每日报表
    ///
    /// 没有医务人员的中心和当日没有挂号的医务人员同样保留。
    pub async fn build_daily_report(&self, date: NaiveDate) -> Result<Vec<CenterReport>> {
        let window = DayWindow::for_date(date, self.offset);

        let centers = self.store.list_centers().await?;
        let staff = self.store.list_medical_staff().await?;
        let patients = self.store.list_patients_between(window.start, window.end).await?;

        // 保持存储返回的时间倒序
        let mut patients_by_staff: HashMap<Uuid, Vec<Patient>> = HashMap::new();
        for patient in patients {
            patients_by_staff.entry(patient.medical_id).or_default().push(patient);
        }

        let mut staff_by_center: HashMap<Uuid, Vec<StaffReport>> = HashMap::new();
        for member in staff {
            let patients = patients_by_staff.remove(&member.id).unwrap_or_default();
            staff_by_center
                .entry(member.center_id)
                .or_default()
                .push(StaffReport { staff: member, patients });
        }

        let report: Vec<CenterReport> = centers
            .into_iter()
            .map(|center| {
                let staff = staff_by_center.remove(&center.id).unwrap_or_default();
                CenterReport { center, staff }
            })
            .collect();

        debug!("Built daily report for {} with {} centers", date, report.len());
        Ok(report)
    }

    /// 构建统计分析
    pub async fn build_analytics(&self, window_days: u32) -> Result<Analytics> {
        let since = Utc::now() - Duration::days(i64::from(window_days));
        let recent = self.store.list_patients_since(since).await?;

        let mut per_day: BTreeMap<String, u64> = BTreeMap::new();
        for patient in &recent {
            *per_day.entry(day_key(&patient.timestamp, self.offset)).or_insert(0) += 1;
        }
        let daily = ChartSeries {
            labels: per_day.keys().cloned().collect(),
            data: per_day.values().copied().collect(),
        };

        let center_names: HashMap<Uuid, String> = self
            .store
            .list_centers()
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();
        let staff_names: HashMap<Uuid, String> = self
            .store
            .list_medical_staff()
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();

        let top_centers = top_n(self.store.count_patients_by_center().await?, &center_names);
        let top_medical_staff = top_n(self.store.count_patients_by_medical().await?, &staff_names);

        Ok(Analytics {
            daily,
            top_centers,
            top_medical_staff,
        })
    }

    /// 单个中心当日挂号，可按姓名或手机号搜索
    pub async fn center_registrations(
        &self,
        center_id: Uuid,
        date: NaiveDate,
        search: Option<&str>,
    ) -> Result<Vec<Patient>> {
        let window = DayWindow::for_date(date, self.offset);
        self.store
            .list_center_patients(center_id, window.start, window.end, search)
            .await
    }

    /// 导出单个中心当日挂号为 CSV
    pub async fn export_center_csv(&self, center_id: Uuid, date: NaiveDate) -> Result<String> {
        let patients = self.center_registrations(center_id, date, None).await?;
        let staff_names: HashMap<Uuid, String> = self
            .store
            .list_medical_staff()
            .await?
            .into_iter()
            .filter(|m| m.center_id == center_id)
            .map(|m| (m.id, m.name))
            .collect();

        Ok(patients_to_csv(&patients, &staff_names, self.offset))
    }
}

/// 先解析引用再截断，失效引用不计入排行
fn top_n(counts: Vec<GroupCount>, names: &HashMap<Uuid, String>) -> ChartSeries {
    let mut resolved: Vec<(String, u64)> = counts
        .into_iter()
        .filter_map(|g| names.get(&g.key).map(|name| (name.clone(), g.count)))
        .collect();

    resolved.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    resolved.truncate(TOP_N);

    let (labels, data) = resolved.into_iter().unzip();
    ChartSeries { labels, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use clinic_core::utils::offset_from_minutes;
    use clinic_core::{NewCenter, RegistrationStatus};
    use clinic_database::MemoryStore;

    struct Fixture {
        store: MemoryStore,
        service: ReportService,
    }

    impl Fixture {
        fn new() -> Self {
            let store = MemoryStore::new();
            let service = ReportService::new(Arc::new(store.clone()), offset_from_minutes(0).unwrap());
            Self { store, service }
        }

        async fn center(&self, name: &str) -> Center {
            let center = NewCenter {
                name: name.to_string(),
                address: "Road".to_string(),
                username: name.to_lowercase(),
                password_hash: "hash".to_string(),
            }
            .into_center();
            self.store.create_center(&center).await.unwrap();
            center
        }

        async fn staff(&self, name: &str, center_id: Uuid) -> MedicalStaff {
            let staff = MedicalStaff {
                id: Uuid::new_v4(),
                name: name.to_string(),
                center_id,
                qr_code: String::new(),
                created_at: Utc::now(),
            };
            self.store.create_medical_staff(&staff).await.unwrap();
            staff
        }

        async fn patient(&self, staff: &MedicalStaff, name: &str, ts: DateTime<Utc>) -> Patient {
            let patient = Patient {
                id: Uuid::new_v4(),
                name: name.to_string(),
                phone: "9876543210".to_string(),
                ultrasound_name: "Abdomen".to_string(),
                medical_id: staff.id,
                center_id: staff.center_id,
                timestamp: ts,
                status: RegistrationStatus::Pending,
                photo_url_1: None,
                photo_url_2: None,
            };
            self.store.create_patient(&patient).await.unwrap();
            patient
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[tokio::test]
    async fn test_empty_day_keeps_all_centers_and_staff() {
        let fx = Fixture::new();
        let north = fx.center("North").await;
        fx.center("Empty").await;
        let staff = fx.staff("Dr. A", north.id).await;
        fx.patient(&staff, "Other day", at(2, 9)).await;

        let report = fx.service.build_daily_report(date(3)).await.unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(report[0].center.name, "Empty");
        assert!(report[0].staff.is_empty());
        assert_eq!(report[1].staff.len(), 1);
        assert!(report[1].staff[0].patients.is_empty());
        assert_eq!(report[1].patient_count(), 0);
    }

    #[tokio::test]
    async fn test_daily_report_nests_patients_newest_first() {
        let fx = Fixture::new();
        let center = fx.center("North").await;
        let a = fx.staff("Dr. A", center.id).await;
        let b = fx.staff("Dr. B", center.id).await;

        fx.patient(&a, "early", at(3, 8)).await;
        fx.patient(&a, "late", at(3, 17)).await;
        fx.patient(&a, "midday", at(3, 12)).await;
        fx.patient(&b, "next day", at(4, 0)).await;

        let report = fx.service.build_daily_report(date(3)).await.unwrap();
        let staff = &report[0].staff;

        assert_eq!(staff[0].staff.name, "Dr. A");
        let names: Vec<&str> = staff[0].patients.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["late", "midday", "early"]);
        assert!(staff[0]
            .patients
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp));

        // 次日零点不属于当天
        assert_eq!(staff[1].staff.name, "Dr. B");
        assert!(staff[1].patients.is_empty());
    }

    #[tokio::test]
    async fn test_daily_report_respects_offset() {
        let store = MemoryStore::new();
        let ist = offset_from_minutes(330).unwrap();
        let service = ReportService::new(Arc::new(store.clone()), ist);
        let fx = Fixture { store, service };
        let center = fx.center("North").await;
        let staff = fx.staff("Dr. A", center.id).await;

        // UTC 5月2日 20:00 在 +05:30 下为 5月3日 01:30
        fx.patient(&staff, "night", at(2, 20)).await;

        let report = fx.service.build_daily_report(date(3)).await.unwrap();
        assert_eq!(report[0].staff[0].patients.len(), 1);
        let report = fx.service.build_daily_report(date(2)).await.unwrap();
        assert!(report[0].staff[0].patients.is_empty());
    }

    #[tokio::test]
    async fn test_top_rollups_are_capped_and_resolved() {
        let fx = Fixture::new();
        let now = Utc::now();
        let mut staff = Vec::new();

        for (i, name) in ["C1", "C2", "C3", "C4", "C5", "C6"].iter().enumerate() {
            let center = fx.center(name).await;
            let member = fx.staff(&format!("Dr. {}", name), center.id).await;
            for _ in 0..=i {
                fx.patient(&member, "p", now).await;
            }
            staff.push(member);
        }

        // 医务人员引用的中心不存在，不计入中心排行
        let ghost = fx.staff("Dr. Ghost", Uuid::new_v4()).await;
        for _ in 0..10 {
            fx.patient(&ghost, "p", now).await;
        }

        let analytics = fx.service.build_analytics(30).await.unwrap();

        assert_eq!(analytics.top_centers.labels, vec!["C6", "C5", "C4", "C3", "C2"]);
        assert_eq!(analytics.top_centers.data, vec![6, 5, 4, 3, 2]);

        assert_eq!(analytics.top_medical_staff.len(), TOP_N);
        assert_eq!(analytics.top_medical_staff.labels[0], "Dr. Ghost");
        assert!(analytics
            .top_medical_staff
            .data
            .windows(2)
            .all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_top_staff_skips_unknown_medical_ids() {
        let fx = Fixture::new();
        let center = fx.center("North").await;
        let known = fx.staff("Dr. Known", center.id).await;
        fx.patient(&known, "p", Utc::now()).await;

        // 挂号引用的医务人员已不存在
        let removed = MedicalStaff {
            id: Uuid::new_v4(),
            name: "Dr. Removed".to_string(),
            center_id: center.id,
            qr_code: String::new(),
            created_at: Utc::now(),
        };
        for _ in 0..3 {
            fx.patient(&removed, "p", Utc::now()).await;
        }

        let analytics = fx.service.build_analytics(30).await.unwrap();
        assert_eq!(analytics.top_medical_staff.labels, vec!["Dr. Known"]);
        assert_eq!(analytics.top_medical_staff.data, vec![1]);
        assert_eq!(analytics.top_centers.data, vec![4]);
    }

    #[tokio::test]
    async fn test_same_name_centers_ordered_by_creation() {
        let fx = Fixture::new();
        let make = |username: &str, created_at: DateTime<Utc>| {
            let mut center = NewCenter {
                name: "Shared".to_string(),
                address: "Road".to_string(),
                username: username.to_string(),
                password_hash: "hash".to_string(),
            }
            .into_center();
            center.created_at = created_at;
            center
        };
        let newer = make("newer", at(2, 12));
        let older = make("older", at(1, 12));
        fx.store.create_center(&newer).await.unwrap();
        fx.store.create_center(&older).await.unwrap();

        let report = fx.service.build_daily_report(date(3)).await.unwrap();
        let ids: Vec<Uuid> = report.iter().map(|r| r.center.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn test_top_ties_break_by_name() {
        let fx = Fixture::new();
        let zeta = fx.center("Zeta").await;
        let alpha = fx.center("Alpha").await;
        let z = fx.staff("Dr. Z", zeta.id).await;
        let a = fx.staff("Dr. A", alpha.id).await;
        fx.patient(&z, "p", Utc::now()).await;
        fx.patient(&a, "p", Utc::now()).await;

        let analytics = fx.service.build_analytics(30).await.unwrap();
        assert_eq!(analytics.top_centers.labels, vec!["Alpha", "Zeta"]);
    }

    #[tokio::test]
    async fn test_daily_counts_window_and_order() {
        let fx = Fixture::new();
        let center = fx.center("North").await;
        let staff = fx.staff("Dr. A", center.id).await;
        let now = Utc::now();

        fx.patient(&staff, "old", now - Duration::days(45)).await;
        fx.patient(&staff, "a", now - Duration::days(2)).await;
        fx.patient(&staff, "b", now - Duration::days(2)).await;
        fx.patient(&staff, "c", now).await;

        let analytics = fx.service.build_analytics(30).await.unwrap();
        let utc = offset_from_minutes(0).unwrap();

        assert_eq!(
            analytics.daily.labels,
            vec![
                day_key(&(now - Duration::days(2)), utc),
                day_key(&now, utc)
            ]
        );
        assert_eq!(analytics.daily.data, vec![2, 1]);
        // 总量排行不受时间窗口限制
        assert_eq!(analytics.top_centers.data, vec![4]);
    }

    #[tokio::test]
    async fn test_center_registrations_scoped_to_center() {
        let fx = Fixture::new();
        let north = fx.center("North").await;
        let south = fx.center("South").await;
        let n = fx.staff("Dr. N", north.id).await;
        let s = fx.staff("Dr. S", south.id).await;
        fx.patient(&n, "Kiran", at(3, 9)).await;
        fx.patient(&s, "Kiran South", at(3, 9)).await;

        let rows = fx
            .service
            .center_registrations(north.id, date(3), Some("kir"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Kiran");

        let csv = fx.service.export_center_csv(north.id, date(3)).await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("Kiran") && lines[1].contains("Dr. N"));
    }
}
