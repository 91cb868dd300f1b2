//! End-to-end operation tests over Parquet fixtures served from an in-memory
//! object store.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::future::join_all;
use ghgp_common::models::RequestBody;
use ghgp_error::ErrorCode;
use ghgp_runtime::{PieLevel, QueryCompiler};
use serde_json::{json, Value};

fn body(value: Value) -> RequestBody {
    serde_json::from_value(value).unwrap()
}

fn column(rows: &Value, field: &str) -> Vec<Value> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|row| row[field].clone())
        .collect()
}

#[tokio::test]
async fn test_sector_totals_national_and_state() {
    let fx = common::fixture().await;

    let national = fx
        .service
        .sector_totals(&body(json!({ "reportingYear": "2023", "state": "US" })))
        .await
        .unwrap();
    let details = &national["sectorEmissionDetails"];
    assert_eq!(
        column(details, "sectorName"),
        vec!["Power Plants", "Refineries", "Chemicals", "Waste"]
    );
    // Biogenic CO2 and supplier rows never reach the totals
    assert_eq!(column(details, "ghgEmission"), vec![1500, 2, 1, 0]);
    assert_eq!(column(details, "sectorId"), vec![1, 2, 3, 4]);
    assert_eq!(national["totalReportedEmission"], json!(1504));
    assert_eq!(national["totalNumberOfFacilities"], json!(4));
    assert_eq!(national["reportingYear"], json!(2023));

    let texas = fx
        .service
        .sector_totals(&body(json!({ "reportingYear": 2023, "state": "TX" })))
        .await
        .unwrap();
    assert_eq!(
        column(&texas["sectorEmissionDetails"], "sectorName"),
        vec!["Power Plants", "Refineries"]
    );
    // 1502.5 rounds half to even
    assert_eq!(texas["totalReportedEmission"], json!(1502));
}

#[tokio::test]
async fn test_unknown_year_is_empty_not_error() {
    let fx = common::fixture().await;
    let shaped = fx
        .service
        .sector_totals(&body(json!({ "reportingYear": "1999" })))
        .await
        .unwrap();
    assert_eq!(shaped["sectorEmissionDetails"], json!([]));
    assert_eq!(shaped["totalReportedEmission"], json!(0));
}

#[tokio::test]
async fn test_list_sectors_formatting() {
    let fx = common::fixture().await;
    let shaped = fx.service.list_sectors(&body(json!({}))).await.unwrap();

    let rows = &shaped["data"]["rows"];
    assert_eq!(column(rows, "sector")[0], "Power Plants");
    assert_eq!(
        column(rows, "totalReportedEmissions"),
        vec!["1,500", "2", "1", "0"]
    );
    assert_eq!(column(rows, "facilities"), vec!["1", "1", "1", "1"]);
    assert_eq!(shaped["year"], json!(2023));
    assert_eq!(shaped["unit"], json!("MMT"));
}

#[tokio::test]
async fn test_list_facilities_pages() {
    let fx = common::fixture_with(QueryCompiler::new(2, 100), Duration::ZERO).await;

    let first = fx
        .service
        .list_facilities(&body(json!({ "pageNumber": 0 })))
        .await
        .unwrap();
    assert_eq!(
        column(&first["data"]["rows"], "facility"),
        vec!["Alpha Power [1001]", "Beta Refinery [1002]"]
    );
    assert_eq!(
        column(&first["data"]["rows"], "totalReportedEmissions"),
        vec!["1,500", "2"]
    );

    let second = fx
        .service
        .list_facilities(&body(json!({ "pageNumber": "2" })))
        .await
        .unwrap();
    let rows = &second["data"]["rows"];
    // No aggregate row for 1004, so it sorts last and reads as zero
    assert_eq!(
        column(rows, "facility"),
        vec!["Gamma Chemicals [1003]", "Delta Landfill [1004]"]
    );
    assert_eq!(column(rows, "totalReportedEmissions"), vec!["1", "0"]);

    let beyond = fx
        .service
        .list_facilities(&body(json!({ "pageNumber": 9 })))
        .await
        .unwrap();
    assert_eq!(beyond["data"]["rows"], json!([]));

    let err = fx
        .service
        .list_facilities(&body(json!({ "pageNumber": "-1" })))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
}

#[tokio::test]
async fn test_list_facilities_default_page_size() {
    let fx = common::fixture().await;

    let (facilities, aggregate) = common::numbered_facilities(101);
    common::replace_table(&fx.store, "RLPS_GHG_EMITTER_FACILITIES", &facilities).await;
    common::replace_table(&fx.store, "RLPS_FAC_YEAR_AGG", &aggregate).await;

    let first = fx
        .service
        .list_facilities(&body(json!({ "pageNumber": 1 })))
        .await
        .unwrap();
    let rows = column(&first["data"]["rows"], "facility");
    assert_eq!(rows.len(), 100);
    assert_eq!(rows[0], "Facility 2100 [2100]");
    assert_eq!(rows[99], "Facility 2001 [2001]");

    // Offset (2 - 1) * 100 leaves only the smallest emitter
    let second = fx
        .service
        .list_facilities(&body(json!({ "pageNumber": 2 })))
        .await
        .unwrap();
    assert_eq!(
        column(&second["data"]["rows"], "facility"),
        vec!["Facility 2000 [2000]"]
    );
}

#[tokio::test]
async fn test_map_markers_skip_missing_coordinates() {
    let fx = common::fixture().await;

    let markers = fx.service.map_markers(&body(json!({}))).await.unwrap();
    let mut ids: Vec<i64> = column(&markers, "id")
        .into_iter()
        .map(|id| id.as_i64().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1001, 1002, 1003]);

    let texas = fx
        .service
        .map_markers(&body(json!({ "state": "TX" })))
        .await
        .unwrap();
    assert_eq!(texas.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_map_overlay_whole_tons() {
    let fx = common::fixture().await;
    let overlay = fx.service.map_overlay(&body(json!({}))).await.unwrap();

    let alpha = overlay
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["id"] == json!(1001))
        .unwrap();
    assert_eq!(alpha["emissions"], json!(1_500_500_000i64));
    assert_eq!(alpha["lt"], json!(29.76));
    assert_eq!(overlay.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_trend_all_sectors_and_by_id() {
    let fx = common::fixture().await;

    let all = fx
        .service
        .sector_trend("0", "1", &body(json!({})))
        .await
        .unwrap();
    assert_eq!(all["xAxis"]["categories"], json!(["2021", "2022", "2023"]));
    assert_eq!(all["series"][0]["data"], json!([2, 2, 1504]));
    assert_eq!(all["series"][0]["name"], json!("Total GHG Emissions"));
    assert_eq!(all["credits"], json!("Data from EPA GHGRP 2021-2023"));

    let power = fx
        .service
        .sector_trend("1", "1", &body(json!({})))
        .await
        .unwrap();
    assert_eq!(power["xAxis"]["categories"], json!(["2022", "2023"]));
    assert_eq!(power["series"][0]["data"], json!([2, 1500]));
    assert_eq!(power["series"][0]["name"], json!("Power Plants Emissions"));

    for unknown in ["abc", "99"] {
        let shaped = fx
            .service
            .sector_trend(unknown, "1", &body(json!({})))
            .await
            .unwrap();
        assert_eq!(shaped["series"][0]["name"], json!("Total GHG Emissions"), "{}", unknown);
    }
}

#[tokio::test]
async fn test_bar_and_pie() {
    let fx = common::fixture().await;

    let bar = fx
        .service
        .bar_sector(&body(json!({ "state": "TX" })))
        .await
        .unwrap();
    assert_eq!(bar["xAxis"]["categories"], json!(["Power Plants", "Refineries"]));
    assert_eq!(bar["series"][0]["data"], json!([1500, 2]));
    assert_eq!(bar["colors"], json!(["#1f77b4", "#d62728"]));
    assert_eq!(bar["credits"], json!("Data from EPA GHGRP 2023"));

    let request = body(json!({ "sector1": "Refineries" }));
    let top = fx
        .service
        .pie_sectors(PieLevel::Sector, &request)
        .await
        .unwrap();
    assert_eq!(top["series"][0]["data"].as_array().unwrap().len(), 4);

    let narrowed = fx
        .service
        .pie_sectors(PieLevel::Subsector, &request)
        .await
        .unwrap();
    let data = &narrowed["series"][0]["data"];
    assert_eq!(data.as_array().unwrap().len(), 1);
    assert_eq!(data[0]["name"], json!("Refineries"));
    assert_eq!(data[0]["id"], json!(2));
}

#[tokio::test]
async fn test_export_single_year() {
    let fx = common::fixture().await;
    let file = fx.service.export(&body(json!({})), false).await.unwrap();

    assert_eq!(file.filename, "ghg_emissions_2023.csv");
    let lines: Vec<&str> = file.body.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("Facility ID,Facility Name,"));
    assert_eq!(
        lines[1],
        "1001,Alpha Power,Houston,TX,Harris,77001,1 Plant Rd,29.76,-95.36,Alpha Corp,1500500000"
    );
    assert_eq!(
        lines[2],
        "1002,Beta Refinery,Beaumont,TX,Jefferson,77701,2 Refinery Way,30.08,-94.10,\"Beta, Inc.\",2000000"
    );
    assert!(lines[4].starts_with("1004,Delta Landfill,"));
    assert!(lines[4].ends_with(",400000"));
}

#[tokio::test]
async fn test_export_all_years_sorted_and_capped() {
    let fx = common::fixture().await;
    let file = fx.service.export(&body(json!({})), true).await.unwrap();
    assert_eq!(file.filename, "ghg_emissions_all_years.csv");

    let years: Vec<&str> = file
        .body
        .lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap())
        .collect();
    assert_eq!(years, vec!["2023", "2023", "2023", "2023", "2022", "2021"]);

    let capped = common::fixture_with(QueryCompiler::new(100, 3), Duration::ZERO).await;
    let file = capped.service.export(&body(json!({})), true).await.unwrap();
    let ids: Vec<&str> = file
        .body
        .lines()
        .skip(1)
        .map(|line| line.split(',').nth(1).unwrap())
        .collect();
    assert_eq!(ids, vec!["1001", "1002", "1003"]);
}

#[tokio::test]
async fn test_export_state_filter() {
    let fx = common::fixture().await;
    let file = fx
        .service
        .export(&body(json!({ "state": "CA" })), true)
        .await
        .unwrap();
    assert_eq!(file.body.lines().count(), 3);
    assert!(file.body.lines().skip(1).all(|line| line.contains(",CA,")));
}

#[tokio::test]
async fn test_facility_hover() {
    let fx = common::fixture().await;

    let hover = fx.service.facility_hover("2023", Some("1001")).await.unwrap();
    assert_eq!(hover["facilityTipDto"]["facilityName"], json!("Alpha Power"));
    assert_eq!(hover["facilityTipDto"]["latitude"], json!(29.76));
    assert_eq!(
        hover["emissions"],
        json!([
            { "type": "Carbon Dioxide", "quantity": 1_500_000_000i64 },
            { "type": "Methane", "quantity": 500_000 },
        ])
    );

    // Not reported in 2023: descriptor falls back to the latest year
    let fallback = fx.service.facility_hover("2023", Some("1005")).await.unwrap();
    assert_eq!(fallback["facilityTipDto"]["facilityName"], json!("Epsilon Lime"));
    assert_eq!(fallback["emissions"], json!([]));

    let missing = fx
        .service
        .facility_hover("2023", Some("9999"))
        .await
        .unwrap_err();
    assert_eq!(missing.code, ErrorCode::EntityNotFound);
    assert_eq!(missing.message, "Facility not found");

    let no_id = fx.service.facility_hover("2023", None).await.unwrap_err();
    assert_eq!(no_id.message, "Missing facility id");
}

#[tokio::test]
async fn test_concurrent_requests_share_one_fetch_per_table() {
    let fx = common::fixture_with(QueryCompiler::default(), Duration::from_millis(50)).await;
    let request = body(json!({}));

    let results = join_all((0..8).map(|_| fx.service.list_sectors(&request))).await;
    assert!(results.iter().all(|r| r.is_ok()));
    // Sector facts plus the sector dimension
    assert_eq!(fx.remote.fetches.load(Ordering::SeqCst), 2);

    fx.service.list_sectors(&request).await.unwrap();
    assert_eq!(fx.remote.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(fx.service.cache().counts().fetches, 2);
}

#[tokio::test]
async fn test_data_files_listing() {
    let fx = common::fixture().await;
    let listing = fx.service.data_files().await.unwrap();

    assert_eq!(listing["count"], json!(2));
    assert_eq!(
        column(&listing["files"], "filename"),
        vec!["pub_dim_sector.csv", "rlps_ghg_emitter_facilities.csv"]
    );
    assert_eq!(listing["files"][0]["size"], json!("2.0 KB"));
    assert_eq!(listing["files"][1]["size"], json!("17 B"));
}

#[tokio::test]
async fn test_download_validates_before_remote_calls() {
    let fx = common::fixture().await;

    let err = fx.service.data_download("../secret.csv").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
    assert_eq!(err.message, "Invalid filename");
    assert_eq!(fx.remote.calls(), 0);

    let missing = fx.service.data_download("missing.csv").await.unwrap_err();
    assert_eq!(missing.code, ErrorCode::EntityNotFound);
    assert_eq!(missing.message, "File not found");
    assert_eq!(fx.remote.presigns.load(Ordering::SeqCst), 0);

    let link = fx
        .service
        .data_download("rlps_ghg_emitter_facilities.csv")
        .await
        .unwrap();
    assert_eq!(link["filename"], json!("rlps_ghg_emitter_facilities.csv"));
    let url = link["url"].as_str().unwrap();
    assert!(url.contains("epa_ghg_tables_csvs/rlps_ghg_emitter_facilities.csv"), "{}", url);
    assert!(url.contains("expires=3600"), "{}", url);
}

#[tokio::test]
async fn test_version_uses_configured_release() {
    let fx = common::fixture().await;
    let version = fx.service.version();
    assert_eq!(version["releaseNumber"], json!("TEST-1.0"));
    assert_eq!(version["reportedDate"].as_str().unwrap().len(), 10);
}
