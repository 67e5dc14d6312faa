//! # 挂号报表模块
//!
//! 在进程内拼装中心、医务人员与挂号记录：
//! - 每日报表：中心 → 医务人员 → 当日挂号
//! - 统计分析：每日挂号量与中心、医务人员排行
//! - 中心视图：单个中心的当日挂号查询与 CSV 导出

pub mod aggregator;
pub mod export;

pub use aggregator::{Analytics, CenterReport, ChartSeries, ReportService, StaffReport, TOP_N};
pub use export::{csv_field, patients_to_csv};
