//! `jobs` table and the `run-job` function.

use async_trait::async_trait;
use atelier_core::error::StoreError;
use atelier_core::job::{Job, JobStatus, JobType};
use atelier_core::store::JobStore;
use atelier_core::types::RecordId;
use reqwest::header::CACHE_CONTROL;
use serde::Serialize;

use crate::client::{single_row, RemoteClient};

#[derive(Debug, Serialize)]
struct NewJob {
    owner_id: RecordId,
    job_type: JobType,
    status: JobStatus,
    input: serde_json::Value,
}

/// PostgREST equality filter on a single id.
pub(crate) fn id_filter(id: RecordId) -> [(&'static str, String); 1] {
    [("id", format!("eq.{id}"))]
}

#[async_trait]
impl JobStore for RemoteClient {
    async fn create_job(
        &self,
        owner_id: RecordId,
        job_type: JobType,
        input: serde_json::Value,
    ) -> Result<Job, StoreError> {
        let body = NewJob {
            owner_id,
            job_type,
            status: JobStatus::Queued,
            input,
        };

        let response = self
            .http
            .post(self.rest_url("jobs"))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .map_err(crate::RemoteError::from)?;

        let rows: Vec<Job> = Self::parse_response(response).await?;
        let job = single_row(rows, "job")?;
        tracing::debug!(job_id = %job.id, job_type = %job_type, "Job record created");
        Ok(job)
    }

    async fn trigger_execution(&self, job_id: RecordId) -> Result<(), StoreError> {
        let response = self
            .http
            .post(self.function_url("run-job"))
            .json(&serde_json::json!({ "job_id": job_id }))
            .send()
            .await
            .map_err(crate::RemoteError::from)?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn get_job_fresh(&self, job_id: RecordId) -> Result<Job, StoreError> {
        let response = self
            .http
            .get(self.rest_url("jobs"))
            .query(&id_filter(job_id))
            .query(&[("select", "*")])
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(crate::RemoteError::from)?;

        let rows: Vec<Job> = Self::parse_response(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_body_uses_wire_names() {
        let body = NewJob {
            owner_id: RecordId::nil(),
            job_type: JobType::OutfitMannequin,
            status: JobStatus::Queued,
            input: serde_json::json!({ "item_count": 6 }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["job_type"], "outfit_mannequin");
        assert_eq!(value["status"], "queued");
        assert_eq!(value["input"]["item_count"], 6);
    }

    #[test]
    fn id_filter_is_an_equality_match() {
        let [(key, value)] = id_filter(RecordId::nil());
        assert_eq!(key, "id");
        assert_eq!(value, "eq.00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn job_rows_parse_with_optional_fields_missing() {
        let rows: Vec<Job> = serde_json::from_value(serde_json::json!([{
            "id": "00000000-0000-0000-0000-000000000001",
            "owner_id": "00000000-0000-0000-0000-000000000002",
            "job_type": "outfit_render",
            "status": "processing",
            "input": {},
            "created_at": "2024-05-01T12:00:00Z"
        }]))
        .unwrap();
        assert_eq!(rows[0].status, JobStatus::Processing);
        assert!(rows[0].result.is_none());
    }
}
