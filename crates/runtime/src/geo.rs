//! State geometry and county lookups.
//!
//! Both documents are JSON objects keyed by upper-case state code. They are
//! materialized through the snapshot cache and parsed once per process.

use std::sync::Arc;

use ghgp_error::{GhgpError, Result};
use serde_json::{json, Value as Json};
use tokio::sync::OnceCell;

use crate::catalog::GeoDocument;
use crate::snapshot::SnapshotCache;

/// Codes that mean "whole country" and have no single boundary.
const NATIONAL_CODES: [&str; 2] = ["US", "LOCAL"];

#[derive(Debug)]
pub struct GeoLookup {
    cache: SnapshotCache,
    states: OnceCell<Arc<Json>>,
    counties: OnceCell<Arc<Json>>,
}

impl GeoLookup {
    pub fn new(cache: SnapshotCache) -> Self {
        Self {
            cache,
            states: OnceCell::new(),
            counties: OnceCell::new(),
        }
    }

    async fn document(&self, doc: GeoDocument) -> Result<Arc<Json>> {
        let cell = match doc {
            GeoDocument::StateGeometries => &self.states,
            GeoDocument::CountiesByState => &self.counties,
        };
        let parsed = cell
            .get_or_try_init(|| async {
                let path = self.cache.acquire(doc).await?;
                let bytes = tokio::fs::read(&path).await?;
                let value: Json = serde_json::from_slice(&bytes)?;
                Ok::<_, GhgpError>(Arc::new(value))
            })
            .await?;
        Ok(parsed.clone())
    }

    /// `{stateName, stateCode, bounds, geometry}`, `[]` for national codes.
    pub async fn state_bounds(&self, state: &str) -> Result<Json> {
        let code = state.to_uppercase();
        if NATIONAL_CODES.contains(&code.as_str()) {
            return Ok(json!([]));
        }

        let states = self.document(GeoDocument::StateGeometries).await?;
        let info = states.get(&code).ok_or_else(|| {
            GhgpError::not_found("state", &code, format!("State not found: {}", code))
        })?;

        Ok(json!({
            "stateName": info.get("name").cloned().unwrap_or(Json::Null),
            "stateCode": code,
            "bounds": info.get("bounds").cloned().unwrap_or(Json::Null),
            "geometry": info.get("geometry").cloned().unwrap_or(Json::Null),
        }))
    }

    /// County list for a state; unknown states yield `[]`.
    pub async fn counties(&self, state: &str) -> Result<Json> {
        let code = state.to_uppercase();
        let counties = self.document(GeoDocument::CountiesByState).await?;
        Ok(counties.get(&code).cloned().unwrap_or_else(|| json!([])))
    }

    /// Petroleum basin boundaries are not published.
    pub fn basins(&self) -> Json {
        json!([])
    }
}
