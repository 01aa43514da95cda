//! Outfit working copies and category lookups.

use std::collections::HashMap;

use async_trait::async_trait;
use atelier_core::error::StoreError;
use atelier_core::store::OutfitStore;
use atelier_core::types::RecordId;
use serde::Deserialize;

use crate::client::RemoteClient;
use crate::error::RemoteError;
use crate::jobs::id_filter;

#[derive(Debug, Deserialize)]
struct CategoryRow {
    id: String,
    name: String,
}

/// PostgREST `in` filter over the distinct ids.
fn in_filter(ids: &[String]) -> String {
    let mut unique: Vec<&str> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id.as_str()) {
            unique.push(id.as_str());
        }
    }
    format!("in.({})", unique.join(","))
}

/// Names in the order of `ids`; unknown ids are skipped.
fn names_in_order(ids: &[String], rows: Vec<CategoryRow>) -> Vec<String> {
    let by_id: HashMap<String, String> = rows.into_iter().map(|r| (r.id, r.name)).collect();
    ids.iter().filter_map(|id| by_id.get(id).cloned()).collect()
}

#[async_trait]
impl OutfitStore for RemoteClient {
    async fn duplicate_outfit(&self, outfit_id: RecordId) -> Result<RecordId, StoreError> {
        let response = self
            .http
            .post(self.rest_url("rpc/duplicate_outfit"))
            .json(&serde_json::json!({ "source_outfit_id": outfit_id }))
            .send()
            .await
            .map_err(RemoteError::from)?;

        let copy_id: RecordId = Self::parse_response(response).await?;
        tracing::debug!(outfit_id = %outfit_id, copy_id = %copy_id, "Outfit duplicated");
        Ok(copy_id)
    }

    async fn archive(&self, record_id: RecordId) -> Result<(), StoreError> {
        let response = self
            .http
            .patch(self.rest_url("outfits"))
            .query(&id_filter(record_id))
            .json(&serde_json::json!({ "deleted_at": chrono::Utc::now() }))
            .send()
            .await
            .map_err(RemoteError::from)?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn category_names(&self, category_ids: &[String]) -> Result<Vec<String>, StoreError> {
        if category_ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .http
            .get(self.rest_url("categories"))
            .query(&[("id", in_filter(category_ids)), ("select", "id,name".into())])
            .send()
            .await
            .map_err(RemoteError::from)?;

        let rows: Vec<CategoryRow> = Self::parse_response(response).await?;
        Ok(names_in_order(category_ids, rows))
    }
}
