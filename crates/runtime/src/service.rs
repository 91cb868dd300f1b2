//! Operation orchestration: acquire snapshots, compile, execute, shape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use ghgp_common::config::AppConfig;
use ghgp_common::models::RequestBody;
use ghgp_error::{GhgpError, Result};
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::compiler::{Operation, QueryCompiler};
use crate::engine::{DataFusionExecutor, PlanExecutor, SourceFiles};
use crate::geo::GeoLookup;
use crate::remote::{ObjectStoreRemote, RemoteStore};
use crate::shaper;
use crate::snapshot::SnapshotCache;
use crate::value::Row;

/// Non-query settings the service needs at request time.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub csv_prefix: String,
    pub presign_ttl: Duration,
    pub release_number: String,
}

impl ServiceSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            csv_prefix: config.storage.csv_prefix.clone(),
            presign_ttl: Duration::from_secs(config.storage.presign_ttl_secs),
            release_number: config.server.release_number.clone(),
        }
    }
}

/// A CSV attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub filename: String,
    pub body: String,
}

/// Chart drill-down level for the pie endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieLevel {
    Sector,
    Subsector,
    Detail,
}

pub struct AnalyticsService {
    compiler: QueryCompiler,
    cache: SnapshotCache,
    executor: Arc<dyn PlanExecutor>,
    geo: GeoLookup,
    settings: ServiceSettings,
}

impl AnalyticsService {
    pub fn new(
        compiler: QueryCompiler,
        cache: SnapshotCache,
        executor: Arc<dyn PlanExecutor>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            geo: GeoLookup::new(cache.clone()),
            compiler,
            cache,
            executor,
            settings,
        }
    }

    /// Production wiring: S3 remote, DataFusion executor.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let remote: Arc<dyn RemoteStore> = Arc::new(ObjectStoreRemote::s3(&config.storage)?);
        let cache = SnapshotCache::new(
            Catalog::from_settings(&config.storage),
            remote,
            Duration::from_secs(config.storage.fetch_timeout_secs),
        );
        let executor = Arc::new(DataFusionExecutor::new(&config.query)?);
        let compiler = QueryCompiler::new(config.query.page_size, config.query.export_row_cap);

        Ok(Self::new(
            compiler,
            cache,
            executor,
            ServiceSettings::from_config(config),
        ))
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Compile, make every input table local, then execute.
    pub async fn run(&self, operation: &Operation) -> Result<Vec<Row>> {
        let start = Instant::now();
        let plan = self.compiler.compile(operation);

        let tables: Vec<_> = plan.tables().into_iter().collect();
        let paths = try_join_all(tables.iter().map(|table| self.cache.acquire(*table))).await?;
        let sources: SourceFiles = tables.into_iter().zip(paths).collect::<HashMap<_, _>>();

        let rows = self.executor.execute(&plan, &sources).await?;
        debug!(
            operation = operation.name(),
            rows = rows.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Operation complete"
        );
        Ok(rows)
    }

    pub fn version(&self) -> Json {
        shaper::version(
            chrono::Local::now().date_naive(),
            &self.settings.release_number,
        )
    }

    pub async fn map_markers(&self, body: &RequestBody) -> Result<Json> {
        let rows = self
            .run(&Operation::MapMarkers {
                year: body.reporting_year(),
                state: body.state_filter(),
            })
            .await?;
        Ok(shaper::map_markers(&rows))
    }

    pub async fn map_overlay(&self, body: &RequestBody) -> Result<Json> {
        let rows = self
            .run(&Operation::MapOverlay {
                year: body.reporting_year(),
                state: body.state_filter(),
                source: body.data_source(),
            })
            .await?;
        Ok(shaper::map_overlay(&rows))
    }

    pub async fn sector_totals(&self, body: &RequestBody) -> Result<Json> {
        let year = body.reporting_year();
        let rows = self
            .run(&Operation::SectorTotals {
                year: year.clone(),
                state: body.state_filter(),
            })
            .await?;
        Ok(shaper::sector_totals(&rows, &year))
    }

    pub async fn list_sectors(&self, body: &RequestBody) -> Result<Json> {
        let year = body.reporting_year();
        let rows = self
            .run(&Operation::ListSectors { year: year.clone() })
            .await?;
        Ok(shaper::list_sectors(&rows, &year))
    }

    pub async fn list_facilities(&self, body: &RequestBody) -> Result<Json> {
        let year = body.reporting_year();
        let page = parse_page(body.page_number.as_deref())?;
        let rows = self
            .run(&Operation::ListFacilities {
                year: year.clone(),
                page,
            })
            .await?;
        Ok(shaper::list_facilities(&rows, &year))
    }

    /// Resolve a sector id to its name; unknown, zero or malformed ids mean all sectors.
    pub async fn resolve_sector(&self, sector_id: &str) -> Result<Option<String>> {
        let Some(sector_id) = parse_sector_id(sector_id) else {
            return Ok(None);
        };
        let rows = self.run(&Operation::SectorLookup { sector_id }).await?;
        Ok(shaper::sector_lookup(&rows))
    }

    pub async fn sector_trend(
        &self,
        sector_id: &str,
        level: &str,
        body: &RequestBody,
    ) -> Result<Json> {
        let sector = self.resolve_sector(sector_id).await?;
        debug!(sector_id, level, sector = ?sector, "Resolved trend sector");

        let rows = self
            .run(&Operation::SectorTrend {
                state: body.state_filter(),
                sector: sector.clone(),
            })
            .await?;
        Ok(shaper::sector_trend(&rows, sector.as_deref()))
    }

    pub async fn bar_sector(&self, body: &RequestBody) -> Result<Json> {
        let year = body.reporting_year();
        let rows = self
            .run(&Operation::BarSector {
                year: year.clone(),
                state: body.state_filter(),
            })
            .await?;
        Ok(shaper::bar_sector(&rows, &year))
    }

    pub async fn pie_sectors(&self, level: PieLevel, body: &RequestBody) -> Result<Json> {
        let year = body.reporting_year();
        // Subsector data is not published; deeper levels narrow to the chosen sector
        let sector = match level {
            PieLevel::Sector => None,
            PieLevel::Subsector | PieLevel::Detail => body.sector1(),
        };
        let rows = self
            .run(&Operation::PieSectors {
                year: year.clone(),
                state: body.state_filter(),
                sector,
            })
            .await?;
        Ok(shaper::pie_sectors(&rows, &year))
    }

    pub async fn export(&self, body: &RequestBody, all_years: bool) -> Result<ExportFile> {
        let year = body.reporting_year();
        let rows = self
            .run(&Operation::Export {
                year: year.clone(),
                state: body.state_filter(),
                source: body.data_source(),
                all_years,
            })
            .await?;

        info!(rows = rows.len(), all_years, "Export generated");
        Ok(ExportFile {
            filename: shaper::export_filename(&year, all_years),
            body: shaper::export_csv(&rows, all_years)?,
        })
    }

    pub async fn state_bounds(&self, state: &str) -> Result<Json> {
        self.geo.state_bounds(state).await
    }

    pub async fn state_counties(&self, state: &str) -> Result<Json> {
        self.geo.counties(state).await
    }

    pub fn basin_geo(&self) -> Json {
        self.geo.basins()
    }

    /// Facility descriptor for `year` (else its latest year) plus the
    /// per-gas breakdown for `year`.
    pub async fn facility_hover(&self, year: &str, id: Option<&str>) -> Result<Json> {
        let id = match id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(GhgpError::missing_parameter("id", "Missing facility id")),
        };

        let info_op = Operation::FacilityInfo {
            id: id.to_string(),
            year: Some(year.to_string()),
        };
        let gases_op = Operation::FacilityGasBreakdown {
            id: id.to_string(),
            year: year.to_string(),
        };
        let (info, gases) = tokio::try_join!(self.run(&info_op), self.run(&gases_op))?;

        let info = match info.into_iter().next() {
            Some(row) => row,
            None => self
                .run(&Operation::FacilityInfo {
                    id: id.to_string(),
                    year: None,
                })
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| GhgpError::not_found("facility", id, "Facility not found"))?,
        };

        Ok(shaper::facility_hover(&info, &gases))
    }

    pub async fn data_files(&self) -> Result<Json> {
        let objects = self.cache.remote().list(&self.settings.csv_prefix).await?;
        Ok(shaper::data_files(&objects, &self.settings.csv_prefix))
    }

    /// Presigned link to one published CSV. The name is validated before
    /// any remote call.
    pub async fn data_download(&self, filename: &str) -> Result<Json> {
        validate_download_name(filename)?;

        let prefix = self.settings.csv_prefix.trim_end_matches('/');
        let key = format!("{}/{}", prefix, filename);
        let remote = self.cache.remote();

        if remote.head(&key).await?.is_none() {
            return Err(GhgpError::not_found("file", filename, "File not found"));
        }

        let url = remote.presign_get(&key, self.settings.presign_ttl).await?;
        Ok(shaper::download_link(&url, filename))
    }
}

/// Page number from the request body. Absent, empty and `0` mean page 1.
pub fn parse_page(raw: Option<&str>) -> Result<usize> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(1),
        Some(raw) => raw,
    };
    match raw.parse::<i64>() {
        Ok(0) => Ok(1),
        Ok(page) if page > 0 => Ok(page as usize),
        _ => Err(GhgpError::invalid_input(format!(
            "Invalid pageNumber: {}",
            raw
        ))),
    }
}

pub fn parse_sector_id(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id != 0)
}

pub fn validate_download_name(filename: &str) -> Result<()> {
    if !filename.ends_with(".csv") || filename.contains('/') || filename.contains("..") {
        return Err(GhgpError::invalid_input("Invalid filename"));
    }
    Ok(())
}
