//! 数据库查询操作（PostgreSQL 后端）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinic_core::{Center, ClinicError, MedicalStaff, Patient, RegistrationStatus, Result};
use sqlx::Row;
use uuid::Uuid;

use crate::connection::DatabasePool;
use crate::models::*;
use crate::store::{GroupCount, RegistrationStore};

/// PostgreSQL 存储实现
#[derive(Clone, Debug)]
pub struct DatabaseQueries {
    pool: DatabasePool,
}

impl DatabaseQueries {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建中心表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS centers (
                id UUID PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                address TEXT NOT NULL DEFAULT '',
                username VARCHAR(128) UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await?;

        // 创建医务人员表（center_id 不设外键，与原有数据保持一致）
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS medical_staff (
                id UUID PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                center_id UUID NOT NULL,
                qr_code TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await?;

        // 创建挂号表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patients (
                id UUID PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                phone VARCHAR(16) NOT NULL,
                ultrasound_name VARCHAR(255) NOT NULL,
                medical_id UUID NOT NULL,
                center_id UUID NOT NULL,
                timestamp TIMESTAMP WITH TIME ZONE NOT NULL,
                status VARCHAR(16) NOT NULL DEFAULT 'Pending',
                photo_url_1 TEXT,
                photo_url_2 TEXT
            )
        "#).execute(pool).await?;

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_centers_name ON centers(name)",
            "CREATE INDEX IF NOT EXISTS idx_medical_staff_center_id ON medical_staff(center_id)",
            "CREATE INDEX IF NOT EXISTS idx_patients_medical_id ON patients(medical_id)",
            "CREATE INDEX IF NOT EXISTS idx_patients_center_id_timestamp ON patients(center_id, timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_patients_timestamp ON patients(timestamp)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql).execute(pool).await?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    async fn group_counts(&self, column: &str) -> Result<Vec<GroupCount>> {
        let sql = format!(
            "SELECT {column} AS key, COUNT(*) AS count FROM patients GROUP BY {column}"
        );

        let rows = sqlx::query(&sql).fetch_all(self.pool.pool()).await?;

        rows.into_iter()
            .map(|row| -> Result<GroupCount> {
                let key: Uuid = row.try_get("key")?;
                let count: i64 = row.try_get("count")?;
                Ok(GroupCount {
                    key,
                    count: count.max(0) as u64,
                })
            })
            .collect()
    }
}

/// 转义 LIKE 模式中的通配符
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl RegistrationStore for DatabaseQueries {
    // ========== 中心相关操作 ==========

    async fn create_center(&self, center: &Center) -> Result<()> {
        let result = sqlx::query(r#"
            INSERT INTO centers (id, name, address, username, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#)
        .bind(center.id)
        .bind(&center.name)
        .bind(&center.address)
        .bind(&center.username)
        .bind(&center.password_hash)
        .bind(center.created_at)
        .execute(self.pool.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                ClinicError::Validation(format!("Username '{}' already exists.", center.username)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_center(&self, id: Uuid) -> Result<Option<Center>> {
        let result = sqlx::query_as::<_, DbCenter>("SELECT * FROM centers WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(result.map(Center::from))
    }

    async fn find_center_by_username(&self, username: &str) -> Result<Option<Center>> {
        let result = sqlx::query_as::<_, DbCenter>("SELECT * FROM centers WHERE username = $1")
            .bind(username)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(result.map(Center::from))
    }

    async fn list_centers(&self) -> Result<Vec<Center>> {
        let results =
            sqlx::query_as::<_, DbCenter>("SELECT * FROM centers ORDER BY name ASC, created_at ASC")
                .fetch_all(self.pool.pool())
                .await?;

        Ok(results.into_iter().map(Center::from).collect())
    }

    async fn update_center_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE centers SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========== 医务人员相关操作 ==========

    async fn create_medical_staff(&self, staff: &MedicalStaff) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO medical_staff (id, name, center_id, qr_code, created_at)
            VALUES ($1, $2, $3, $4, $5)
        "#)
        .bind(staff.id)
        .bind(&staff.name)
        .bind(staff.center_id)
        .bind(&staff.qr_code)
        .bind(staff.created_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    async fn set_medical_qr_code(&self, id: Uuid, qr_code: &str) -> Result<()> {
        sqlx::query("UPDATE medical_staff SET qr_code = $1 WHERE id = $2")
            .bind(qr_code)
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        Ok(())
    }

    async fn get_medical_staff(&self, id: Uuid) -> Result<Option<MedicalStaff>> {
        let result =
            sqlx::query_as::<_, DbMedicalStaff>("SELECT * FROM medical_staff WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.pool())
                .await?;

        Ok(result.map(MedicalStaff::from))
    }

    async fn list_medical_staff(&self) -> Result<Vec<MedicalStaff>> {
        let results =
            sqlx::query_as::<_, DbMedicalStaff>("SELECT * FROM medical_staff ORDER BY created_at ASC")
                .fetch_all(self.pool.pool())
                .await?;

        Ok(results.into_iter().map(MedicalStaff::from).collect())
    }

    // ========== 挂号相关操作 ==========

    async fn create_patient(&self, patient: &Patient) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO patients (id, name, phone, ultrasound_name, medical_id, center_id, timestamp, status, photo_url_1, photo_url_2)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#)
        .bind(patient.id)
        .bind(&patient.name)
        .bind(&patient.phone)
        .bind(&patient.ultrasound_name)
        .bind(patient.medical_id)
        .bind(patient.center_id)
        .bind(patient.timestamp)
        .bind(patient.status.as_str())
        .bind(&patient.photo_url_1)
        .bind(&patient.photo_url_2)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>> {
        let result = sqlx::query_as::<_, DbPatient>("SELECT * FROM patients WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        result.map(Patient::try_from).transpose()
    }

    async fn update_patient_status(&self, id: Uuid, status: RegistrationStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE patients SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_patients_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Patient>> {
        let results = sqlx::query_as::<_, DbPatient>(
            "SELECT * FROM patients WHERE timestamp >= $1 AND timestamp < $2 ORDER BY timestamp DESC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(self.pool.pool())
        .await?;

        into_patients(results)
    }

    async fn list_patients_since(&self, start: DateTime<Utc>) -> Result<Vec<Patient>> {
        let results = sqlx::query_as::<_, DbPatient>(
            "SELECT * FROM patients WHERE timestamp >= $1 ORDER BY timestamp ASC",
        )
        .bind(start)
        .fetch_all(self.pool.pool())
        .await?;

        into_patients(results)
    }

    async fn list_center_patients(
        &self,
        center_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        search: Option<&str>,
    ) -> Result<Vec<Patient>> {
        let pool = self.pool.pool();

        let results = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                sqlx::query_as::<_, DbPatient>(r#"
                    SELECT * FROM patients
                    WHERE center_id = $1 AND timestamp >= $2 AND timestamp < $3
                      AND (name ILIKE $4 OR phone ILIKE $4)
                    ORDER BY timestamp DESC
                "#)
                .bind(center_id)
                .bind(start)
                .bind(end)
                .bind(format!("%{}%", escape_like(term)))
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DbPatient>(r#"
                    SELECT * FROM patients
                    WHERE center_id = $1 AND timestamp >= $2 AND timestamp < $3
                    ORDER BY timestamp DESC
                "#)
                .bind(center_id)
                .bind(start)
                .bind(end)
                .fetch_all(pool)
                .await?
            }
        };

        into_patients(results)
    }

    async fn count_patients_by_center(&self) -> Result<Vec<GroupCount>> {
        self.group_counts("center_id").await
    }

    async fn count_patients_by_medical(&self) -> Result<Vec<GroupCount>> {
        self.group_counts("medical_id").await
    }
}
