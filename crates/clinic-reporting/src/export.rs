//! CSV 导出

use chrono::FixedOffset;
use clinic_core::Patient;
use std::collections::HashMap;
use uuid::Uuid;

const CSV_HEADER: &str = "Name,Phone,Ultrasound,Medical Staff,Registered At,Status,Photo 1,Photo 2";

/// 按需加引号并转义内部引号
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// 挂号记录转为 CSV，时间按部署时区输出
pub fn patients_to_csv(
    patients: &[Patient],
    staff_names: &HashMap<Uuid, String>,
    offset: FixedOffset,
) -> String {
    let mut output = String::new();
    output.push_str(CSV_HEADER);
    output.push('\n');

    for patient in patients {
        let staff = staff_names
            .get(&patient.medical_id)
            .map(String::as_str)
            .unwrap_or("Unknown");
        let registered_at = patient
            .timestamp
            .with_timezone(&offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        let row = [
            patient.name.as_str(),
            patient.phone.as_str(),
            patient.ultrasound_name.as_str(),
            staff,
            registered_at.as_str(),
            patient.status.as_str(),
            patient.photo_url_1.as_deref().unwrap_or(""),
            patient.photo_url_2.as_deref().unwrap_or(""),
        ];

        output.push_str(
            &row.iter()
                .map(|field| csv_field(field))
                .collect::<Vec<_>>()
                .join(","),
        );
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clinic_core::RegistrationStatus;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_patients_to_csv() {
        let medical_id = Uuid::new_v4();
        let patient = Patient {
            id: Uuid::new_v4(),
            name: "Rao, Meera".to_string(),
            phone: "9876543210".to_string(),
            ultrasound_name: "Pelvis".to_string(),
            medical_id,
            center_id: Uuid::new_v4(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 3, 4, 0, 0).unwrap(),
            status: RegistrationStatus::Running,
            photo_url_1: Some("https://img.test/1.png".to_string()),
            photo_url_2: None,
        };
        let names = HashMap::from([(medical_id, "Dr. A".to_string())]);
        let offset = FixedOffset::east_opt(330 * 60).unwrap();

        let csv = patients_to_csv(&[patient], &names, offset);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "\"Rao, Meera\",9876543210,Pelvis,Dr. A,2024-05-03 09:30:00,Running,https://img.test/1.png,"
        );
    }
}
