use deadpool_postgres::Pool;
use tokio_postgres::Row;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;

use discharge_core::{NewPatient, PatientRecord};

use crate::error::AppError;

const PATIENT_COLUMNS: &str = "hadm_id, subject_id, gender, age, admission_type, diagnosis, \
     hospital_expire_flag, ed_los_hours, total_los_hours, charttime, category, description, text";

/// Repository for admission records (the raw discharge summaries).
///
/// Read-mostly collaborator of the generation pipeline; the AI side only
/// ever calls `get`.
#[derive(Clone)]
pub struct PatientRepository {
    pool: Pool,
}

/// Filters for the admission listing endpoint.
#[derive(Debug, Default)]
pub struct PatientFilter {
    /// Free-text search over diagnosis, admission type and gender.
    pub q: Option<String>,
    pub gender: Option<String>,
    pub admission_type: Option<String>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub limit: i64,
}

impl PatientRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Get an admission record by hospital admission id
    pub async fn get(&self, hadm_id: i64) -> Result<Option<PatientRecord>, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {PATIENT_COLUMNS} FROM discharge_records WHERE hadm_id = $1"),
                &[&hadm_id],
            )
            .await?;
        Ok(row.map(row_to_patient))
    }

    /// Insert a new admission record; conflicts on an existing hadm_id
    pub async fn create(&self, new: NewPatient) -> Result<PatientRecord, AppError> {
        let client = self.pool.get().await?;
        let insert = format!(
            "INSERT INTO discharge_records ({PATIENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {PATIENT_COLUMNS}"
        );
        let result = client
            .query_one(
                &insert,
                &[
                    &new.hadm_id,
                    &new.subject_id,
                    &new.gender,
                    &new.age,
                    &new.admission_type,
                    &new.diagnosis,
                    &new.hospital_expire_flag,
                    &new.ed_los_hours,
                    &new.total_los_hours,
                    &new.charttime,
                    &new.category,
                    &new.description,
                    &new.text,
                ],
            )
            .await;

        match result {
            Ok(row) => Ok(row_to_patient(row)),
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(AppError::Conflict(
                format!("Admission {} already exists", new.hadm_id),
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// List admissions with optional search and filters, returning the
    /// page of records and the total match count.
    pub async fn list(&self, filter: &PatientFilter) -> Result<(Vec<PatientRecord>, u64), AppError> {
        let client = self.pool.get().await?;

        let q_pattern = filter.q.as_ref().map(|q| format!("%{}%", q));
        let gender = filter.gender.as_ref().map(|g| g.to_uppercase());
        let admission_pattern = filter.admission_type.as_ref().map(|a| format!("%{}%", a));

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref pattern) = q_pattern {
            params.push(pattern);
            let n = params.len();
            conditions.push(format!(
                "(diagnosis ILIKE ${n} OR admission_type ILIKE ${n} OR gender ILIKE ${n})"
            ));
        }
        if let Some(ref value) = gender {
            params.push(value);
            conditions.push(format!("gender = ${}", params.len()));
        }
        if let Some(ref pattern) = admission_pattern {
            params.push(pattern);
            conditions.push(format!("admission_type ILIKE ${}", params.len()));
        }
        if let Some(ref age_min) = filter.age_min {
            params.push(age_min);
            conditions.push(format!("age >= ${}", params.len()));
        }
        if let Some(ref age_max) = filter.age_max {
            params.push(age_max);
            conditions.push(format!("age <= ${}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_row = client
            .query_one(
                &format!("SELECT COUNT(*) FROM discharge_records{where_clause}"),
                &params,
            )
            .await?;
        let total: i64 = count_row.get(0);

        params.push(&filter.limit);
        let rows = client
            .query(
                &format!(
                    "SELECT {PATIENT_COLUMNS} FROM discharge_records{where_clause} \
                     ORDER BY hadm_id LIMIT ${}",
                    params.len()
                ),
                &params,
            )
            .await?;

        Ok((rows.into_iter().map(row_to_patient).collect(), total as u64))
    }

    /// Delete an admission and every summary referencing it.
    ///
    /// Returns `None` if the admission does not exist, otherwise the number
    /// of summaries removed alongside it. Both deletes run in one
    /// transaction so no orphaned summary rows can remain.
    pub async fn delete(&self, hadm_id: i64) -> Result<Option<u64>, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let summaries = tx
            .execute("DELETE FROM ai_summaries WHERE hadm_id = $1", &[&hadm_id])
            .await?;
        let records = tx
            .execute("DELETE FROM discharge_records WHERE hadm_id = $1", &[&hadm_id])
            .await?;

        if records == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(summaries))
    }
}

fn row_to_patient(row: Row) -> PatientRecord {
    PatientRecord {
        hadm_id: row.get("hadm_id"),
        subject_id: row.get("subject_id"),
        gender: row.get("gender"),
        age: row.get("age"),
        admission_type: row.get("admission_type"),
        diagnosis: row.get("diagnosis"),
        hospital_expire_flag: row.get("hospital_expire_flag"),
        ed_los_hours: row.get("ed_los_hours"),
        total_los_hours: row.get("total_los_hours"),
        charttime: row.get("charttime"),
        category: row.get("category"),
        description: row.get("description"),
        text: row.get("text"),
    }
}
