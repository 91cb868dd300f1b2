//! Request dispatch.
//!
//! Paths are matched against an exact `(verb, path)` table first and then
//! against the templated prefixes whose trailing segments carry parameters.
//! This is the only place a [`GhgpError`] becomes an HTTP status.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ghgp_common::models::{Envelope, RequestBody};
use ghgp_error::{GhgpError, Result};
use ghgp_runtime::{AnalyticsService, ExportFile, PieLevel};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::metrics::Metrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Version,
    MapMarkers,
    MapOverlay,
    SectorTotals,
    ListSectors,
    ListFacilities,
    SectorTrend { sector_id: String, level: String },
    BarSector,
    PieSectors(PieLevel),
    Export,
    StateBounds(String),
    StateCounties(String),
    BasinGeo,
    FacilityHover(String),
    DataFiles,
    DataDownload(String),
}

impl Route {
    /// Match a mount-relative path.
    pub fn resolve(method: &Method, path: &str) -> Option<Route> {
        let exact = match (method.as_str(), path) {
            ("GET", "/api/version") => Some(Route::Version),
            ("POST", "/api/facilities/map-markers") => Some(Route::MapMarkers),
            ("POST", "/api/map/overlay") => Some(Route::MapOverlay),
            ("POST", "/api/sectors/total/emissions") => Some(Route::SectorTotals),
            ("POST", "/api/list/sectors") => Some(Route::ListSectors),
            ("POST", "/api/list/facilities") => Some(Route::ListFacilities),
            ("POST", "/api/bar/sector") | ("POST", "/api/bar/sector/level2") => {
                Some(Route::BarSector)
            }
            ("POST", "/api/pie/sectors/emissions") => Some(Route::PieSectors(PieLevel::Sector)),
            ("POST", "/api/pie/level2/sector/emissions") => {
                Some(Route::PieSectors(PieLevel::Subsector))
            }
            ("POST", "/api/pie/level3/subsector/emissions") => {
                Some(Route::PieSectors(PieLevel::Detail))
            }
            ("GET", "/api/basin/geo") => Some(Route::BasinGeo),
            ("GET", "/api/data/files") => Some(Route::DataFiles),
            _ => None,
        };
        exact.or_else(|| Self::templated(method, path))
    }

    fn templated(method: &Method, path: &str) -> Option<Route> {
        if *method == Method::GET {
            if let Some(rest) = path.strip_prefix("/api/state/bounds/") {
                return last_segment(rest).map(Route::StateBounds);
            }
            if let Some(rest) = path.strip_prefix("/api/state/counties/") {
                return last_segment(rest).map(Route::StateCounties);
            }
            if let Some(rest) = path.strip_prefix("/api/facility/hover/") {
                return last_segment(rest).map(Route::FacilityHover);
            }
            if let Some(rest) = path.strip_prefix("/api/data/download/") {
                return Some(Route::DataDownload(rest.to_string()));
            }
        }

        if *method == Method::POST {
            if path.starts_with("/api/export") {
                return Some(Route::Export);
            }
            if let Some(rest) = path.strip_prefix("/api/sector/trend/") {
                let segments: Vec<&str> = rest
                    .trim_end_matches('/')
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .collect();
                let (sector_id, level) = match segments.as_slice() {
                    [] => ("0", "1"),
                    [sector_id] => (*sector_id, "1"),
                    [.., sector_id, level] => (*sector_id, *level),
                };
                return Some(Route::SectorTrend {
                    sector_id: sector_id.to_string(),
                    level: level.to_string(),
                });
            }
        }

        None
    }

    pub fn name(&self) -> &'static str {
        match self {
            Route::Version => "version",
            Route::MapMarkers => "map_markers",
            Route::MapOverlay => "map_overlay",
            Route::SectorTotals => "sector_totals",
            Route::ListSectors => "list_sectors",
            Route::ListFacilities => "list_facilities",
            Route::SectorTrend { .. } => "sector_trend",
            Route::BarSector => "bar_sector",
            Route::PieSectors(_) => "pie_sectors",
            Route::Export => "export",
            Route::StateBounds(_) => "state_bounds",
            Route::StateCounties(_) => "state_counties",
            Route::BasinGeo => "basin_geo",
            Route::FacilityHover(_) => "facility_hover",
            Route::DataFiles => "data_files",
            Route::DataDownload(_) => "data_download",
        }
    }
}

fn last_segment(rest: &str) -> Option<String> {
    rest.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Decoded query string.
#[derive(Debug, Default)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    pub fn parse(query: Option<&str>) -> Self {
        let params = query
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self(params)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// `true` only for a case-insensitive `"true"`.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

/// An empty body reads as `{}`.
pub fn parse_body(body: &[u8]) -> Result<RequestBody> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RequestBody::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| GhgpError::invalid_input(format!("Invalid JSON body: {}", e)))
}

pub enum Reply {
    Json(Value),
    Csv(ExportFile),
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json(payload) => (StatusCode::OK, Json(Envelope::ok(payload))).into_response(),
            Reply::Csv(file) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file.filename),
                    ),
                ],
                file.body,
            )
                .into_response(),
        }
    }
}

pub fn error_response(err: &GhgpError) -> Response {
    let status = err.http_status();
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(Envelope::<Value>::error(status, err.message.clone()))).into_response()
}

pub struct Router {
    service: Arc<AnalyticsService>,
    metrics: Arc<Metrics>,
    mount_prefix: String,
}

impl Router {
    pub fn new(service: Arc<AnalyticsService>, metrics: Arc<Metrics>, mount_prefix: &str) -> Self {
        Self {
            service,
            metrics,
            mount_prefix: mount_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn service(&self) -> &Arc<AnalyticsService> {
        &self.service
    }

    fn strip_mount<'a>(&self, path: &'a str) -> &'a str {
        if self.mount_prefix.is_empty() {
            return path;
        }
        match path.strip_prefix(self.mount_prefix.as_str()) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }

    pub async fn dispatch(&self, method: &Method, uri: &Uri, body: &[u8]) -> Response {
        let start = Instant::now();
        let path = self.strip_mount(uri.path());

        let (operation, response) = if *method == Method::OPTIONS {
            ("preflight", StatusCode::NO_CONTENT.into_response())
        } else {
            let _active = self.metrics.track_active();
            let (operation, result) = match Route::resolve(method, path) {
                Some(route) => (route.name(), self.handle(route, uri.query(), body).await),
                None => (
                    "unmatched",
                    Err(GhgpError::route_not_found(method.as_str(), uri.path())),
                ),
            };

            let response = match result {
                Ok(reply) => reply.into_response(),
                Err(err) => {
                    error!(
                        target: "errors",
                        operation,
                        method = %method,
                        path = uri.path(),
                        code = %err.code,
                        status = err.http_status(),
                        context = ?err.context,
                        "{}",
                        err.message
                    );
                    error_response(&err)
                }
            };
            (operation, response)
        };

        let status = response.status();
        self.metrics
            .requests
            .with_label_values(&[operation, status.as_str()])
            .inc();
        info!(
            target: "requests",
            operation,
            method = %method,
            path = uri.path(),
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request handled"
        );
        response
    }

    async fn handle(&self, route: Route, query: Option<&str>, body: &[u8]) -> Result<Reply> {
        let service = &self.service;
        let params = QueryParams::parse(query);

        let payload = match route {
            Route::Version => service.version(),
            Route::MapMarkers => service.map_markers(&parse_body(body)?).await?,
            Route::MapOverlay => service.map_overlay(&parse_body(body)?).await?,
            Route::SectorTotals => service.sector_totals(&parse_body(body)?).await?,
            Route::ListSectors => service.list_sectors(&parse_body(body)?).await?,
            Route::ListFacilities => service.list_facilities(&parse_body(body)?).await?,
            Route::SectorTrend { sector_id, level } => {
                service
                    .sector_trend(&sector_id, &level, &parse_body(body)?)
                    .await?
            }
            Route::BarSector => service.bar_sector(&parse_body(body)?).await?,
            Route::PieSectors(level) => service.pie_sectors(level, &parse_body(body)?).await?,
            Route::Export => {
                let all_years = params.flag("allReportingYears");
                // The list view exports the same facility table
                debug!(all_years, list_export = params.flag("listExport"), "Export requested");
                let file = service.export(&parse_body(body)?, all_years).await?;
                return Ok(Reply::Csv(file));
            }
            Route::StateBounds(state) => service.state_bounds(&state).await?,
            Route::StateCounties(state) => service.state_counties(&state).await?,
            Route::BasinGeo => service.basin_geo(),
            Route::FacilityHover(year) => service.facility_hover(&year, params.get("id")).await?,
            Route::DataFiles => service.data_files().await?,
            Route::DataDownload(filename) => service.data_download(&filename).await?,
        };

        Ok(Reply::Json(payload))
    }
}
