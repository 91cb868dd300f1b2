//! Row to response conversion.
//!
//! Every function here is pure. Column positions follow the output order of
//! the matching plan in [`crate::compiler`]; null aggregates read as zero and
//! unit conversion happens only at this stage.

use std::sync::Arc;

use chrono::NaiveDate;
use datafusion::arrow::array::{ArrayRef, RecordBatch, StringArray};
use datafusion::arrow::csv::WriterBuilder;
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use ghgp_error::{GhgpError, Result};
use serde_json::{json, Value as Json};

use crate::remote::ObjectInfo;
use crate::value::{Row, Value};

pub const MMT_DIVISOR: f64 = 1_000_000.0;
pub const TREND_COLOR: &str = "#1f77b4";
pub const DEFAULT_SECTOR_COLOR: &str = "#999999";

static NULL: Value = Value::Null;

fn cell(row: &Row, index: usize) -> &Value {
    row.get(index).unwrap_or(&NULL)
}

/// Million metric tons, rounded half to even after conversion.
pub fn to_mmt(tons: f64) -> i64 {
    (tons / MMT_DIVISOR).round_ties_even() as i64
}

pub fn whole_tons(tons: f64) -> i64 {
    tons.round_ties_even() as i64
}

fn mmt_cell(row: &Row, index: usize) -> i64 {
    cell(row, index).as_f64().map(to_mmt).unwrap_or(0)
}

fn tons_cell(row: &Row, index: usize) -> i64 {
    cell(row, index).as_f64().map(whole_tons).unwrap_or(0)
}

fn count_cell(row: &Row, index: usize) -> i64 {
    cell(row, index).as_i64().unwrap_or(0)
}

/// `1234567` -> `"1,234,567"`.
pub fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Echo the reporting year the way it was most likely sent.
pub fn reporting_year(year: &str) -> Json {
    year.parse::<i64>()
        .map(Json::from)
        .unwrap_or_else(|_| Json::String(year.to_string()))
}

pub fn sector_color(sector: &str) -> &'static str {
    match sector {
        "Power Plants" => "#1f77b4",
        "Petroleum and Natural Gas Systems" => "#ff7f0e",
        "Chemicals" => "#2ca02c",
        "Refineries" => "#d62728",
        "Other" => "#9467bd",
        "Minerals" => "#8c564b",
        "Waste" => "#e377c2",
        "Metals" => "#7f7f7f",
        "Pulp and Paper" => "#bcbd22",
        _ => DEFAULT_SECTOR_COLOR,
    }
}

fn credits(year: &str) -> String {
    format!("Data from EPA GHGRP {}", year)
}

fn text_json(value: &Value) -> Json {
    value.to_json()
}

// Rows: (id, lt, ln)
pub fn map_markers(rows: &[Row]) -> Json {
    let markers: Vec<Json> = rows
        .iter()
        .filter_map(|row| {
            let lt = cell(row, 1).as_f64()?;
            let ln = cell(row, 2).as_f64()?;
            Some(json!({ "id": cell(row, 0).as_i64(), "lt": lt, "ln": ln }))
        })
        .collect();
    Json::Array(markers)
}

// Rows: (id, lt, ln, emissions)
pub fn map_overlay(rows: &[Row]) -> Json {
    let markers: Vec<Json> = rows
        .iter()
        .filter_map(|row| {
            let lt = cell(row, 1).as_f64()?;
            let ln = cell(row, 2).as_f64()?;
            Some(json!({
                "id": cell(row, 0).as_i64(),
                "lt": lt,
                "ln": ln,
                "emissions": tons_cell(row, 3),
            }))
        })
        .collect();
    Json::Array(markers)
}

/// Sector rows: (sector_name, total_emissions, facility_count, sector_id).
fn sector_id(row: &Row) -> Option<i64> {
    cell(row, 3).as_i64().filter(|id| *id != 0)
}

pub fn sector_totals(rows: &[Row], year: &str) -> Json {
    let total_tons: f64 = rows.iter().filter_map(|r| cell(r, 1).as_f64()).sum();
    let total_facilities: i64 = rows.iter().map(|r| count_cell(r, 2)).sum();

    let details: Vec<Json> = rows
        .iter()
        .map(|row| {
            let mmt = mmt_cell(row, 1);
            let count = count_cell(row, 2);
            json!({
                "sectorId": sector_id(row),
                "sectorName": text_json(cell(row, 0)),
                "ghgEmission": mmt,
                "reportedEmission": mmt,
                "totalEmissions": mmt,
                "numberOfFacilitiesReported": count,
                "facilityCount": count,
                "numFacilities": count,
            })
        })
        .collect();

    json!({
        "sectorEmissionDetails": details,
        "totalReportedEmission": to_mmt(total_tons),
        "totalNumberOfFacilities": total_facilities,
        "totalNumOfFacilitesReported": total_facilities,
        "reportingYear": reporting_year(year),
        "unitAbbr": "MMT",
    })
}

fn icon_column() -> Json {
    json!({"id": "icons", "field": "icons", "name": "", "sortable": false, "cssClass": "icon-col"})
}

fn list_column(id: &str, field: &str, name: &str, kind: &str) -> Json {
    json!({"id": id, "field": field, "name": name, "sortable": true, "cssClass": "", "type": kind})
}

fn list_table(cols: Vec<Json>, rows: Vec<Json>, year: &str) -> Json {
    json!({
        "data": { "cols": cols, "rows": rows },
        "year": reporting_year(year),
        "unit": "MMT",
    })
}

pub fn list_sectors(rows: &[Row], year: &str) -> Json {
    let cols = vec![
        icon_column(),
        list_column("sector", "sector", "Sector", "string"),
        list_column("facilities", "facilities", "# Facilities", "number"),
        list_column("total", "totalReportedEmissions", "Total Reported Emissions", "number"),
    ];
    let rows = rows
        .iter()
        .map(|row| {
            json!({
                "icons": [],
                "sector": text_json(cell(row, 0)),
                "facilities": thousands(count_cell(row, 2)),
                "totalReportedEmissions": thousands(mmt_cell(row, 1)),
            })
        })
        .collect();
    list_table(cols, rows, year)
}

// Rows: (facility_id, facility_name, city, state, county, latitude, longitude, total_emission)
pub fn list_facilities(rows: &[Row], year: &str) -> Json {
    let cols = vec![
        icon_column(),
        list_column("facility", "facility", "Facility", "string"),
        list_column("city", "city", "City", "string"),
        list_column("state", "state", "State", "string"),
        list_column("total", "totalReportedEmissions", "Total Reported Emissions", "number"),
    ];
    let rows = rows
        .iter()
        .map(|row| {
            json!({
                "icons": [],
                "facility": format!("{} [{}]", cell(row, 1), cell(row, 0)),
                "city": text_json(cell(row, 2)),
                "state": text_json(cell(row, 3)),
                "totalReportedEmissions": thousands(mmt_cell(row, 7)),
            })
        })
        .collect();
    list_table(cols, rows, year)
}

/// First sector name from a lookup, if any.
pub fn sector_lookup(rows: &[Row]) -> Option<String> {
    rows.first().and_then(|row| cell(row, 0).as_text())
}

// Rows: (year, total_emissions)
pub fn sector_trend(rows: &[Row], sector: Option<&str>) -> Json {
    let years: Vec<String> = rows.iter().map(|r| cell(r, 0).to_string()).collect();
    let values: Vec<i64> = rows.iter().map(|r| mmt_cell(r, 1)).collect();
    let name = match sector {
        Some(sector) => format!("{} Emissions", sector),
        None => "Total GHG Emissions".to_string(),
    };
    let credits = match (years.first(), years.last()) {
        (Some(first), Some(last)) => format!("Data from EPA GHGRP {}-{}", first, last),
        _ => String::new(),
    };

    json!({
        "xAxis": { "categories": years },
        "series": [{ "name": name, "data": values, "color": TREND_COLOR }],
        "yearRange": years,
        "credits": credits,
    })
}

pub fn bar_sector(rows: &[Row], year: &str) -> Json {
    let categories: Vec<Json> = rows.iter().map(|r| text_json(cell(r, 0))).collect();
    let colors: Vec<&str> = rows
        .iter()
        .map(|r| sector_color(&cell(r, 0).to_string()))
        .collect();
    let data: Vec<i64> = rows.iter().map(|r| mmt_cell(r, 1)).collect();

    json!({
        "xAxis": { "categories": categories },
        "series": [{
            "name": "GHG Emissions",
            "id": "ghg_emissions",
            "color": TREND_COLOR,
            "data": data,
        }],
        "colors": colors,
        "domain": "GHG",
        "unit": "MMT",
        "view": "SECTOR1",
        "credits": credits(year),
    })
}

pub fn pie_sectors(rows: &[Row], year: &str) -> Json {
    let data: Vec<Json> = rows
        .iter()
        .map(|row| {
            let name = cell(row, 0).to_string();
            json!({
                "name": text_json(cell(row, 0)),
                "y": mmt_cell(row, 1),
                "color": sector_color(&name),
                "id": sector_id(row),
            })
        })
        .collect();

    json!({
        "series": [{ "name": "Emissions", "data": data }],
        "domain": "GHG",
        "unit": "MMT",
        "view": "SECTOR1",
        "credits": credits(year),
    })
}

const EXPORT_HEADERS: [&str; 11] = [
    "Facility ID",
    "Facility Name",
    "City",
    "State",
    "County",
    "ZIP",
    "Address",
    "Latitude",
    "Longitude",
    "Parent Company",
    "Total Emissions (Metric Tons CO2e)",
];

/// Attachment name for an export download.
pub fn export_filename(year: &str, all_years: bool) -> String {
    if all_years {
        "ghg_emissions_all_years.csv".to_string()
    } else {
        format!("ghg_emissions_{}.csv", year)
    }
}

/// RFC 4180 CSV; the last column of every row is the emissions total.
pub fn export_csv(rows: &[Row], all_years: bool) -> Result<String> {
    let mut headers: Vec<&str> = Vec::with_capacity(EXPORT_HEADERS.len() + 1);
    if all_years {
        headers.push("Year");
    }
    headers.extend(EXPORT_HEADERS);

    let width = headers.len();
    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(rows.len()); width];
    for row in rows {
        for (index, column) in columns.iter_mut().enumerate() {
            let value = if index + 1 == width {
                Some(tons_cell(row, index).to_string())
            } else {
                cell(row, index).as_text()
            };
            column.push(value);
        }
    }

    let schema = Arc::new(Schema::new(
        headers
            .iter()
            .map(|h| Field::new(*h, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|values| Arc::new(StringArray::from(values)) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(schema, arrays)?;

    let mut buffer = Vec::new();
    {
        let mut writer = WriterBuilder::new().with_header(true).build(&mut buffer);
        writer.write(&batch)?;
    }
    String::from_utf8(buffer).map_err(|e| GhgpError::internal(format!("CSV not UTF-8: {}", e)))
}

// Info row follows FACILITY_INFO_COLUMNS; gas rows are (gas_name, total_emission).
pub fn facility_hover(info: &Row, gases: &[Row]) -> Json {
    let dto = json!({
        "facilityId": cell(info, 0).as_i64(),
        "facilityName": text_json(cell(info, 1)),
        "address1": text_json(cell(info, 2)),
        "address2": text_json(cell(info, 3)),
        "city": text_json(cell(info, 4)),
        "state": text_json(cell(info, 5)),
        "county": text_json(cell(info, 6)),
        "zip": text_json(cell(info, 7)),
        "latitude": cell(info, 8).as_f64(),
        "longitude": cell(info, 9).as_f64(),
        "parentCompany": text_json(cell(info, 10)),
    });
    let emissions: Vec<Json> = gases
        .iter()
        .map(|row| json!({ "type": text_json(cell(row, 0)), "quantity": tons_cell(row, 1) }))
        .collect();

    json!({ "facilityTipDto": dto, "emissions": emissions })
}

/// CSV objects under `prefix`, sorted by file name.
pub fn data_files(objects: &[ObjectInfo], prefix: &str) -> Json {
    let prefix = prefix.trim_end_matches('/');
    let mut files: Vec<(String, &ObjectInfo)> = objects
        .iter()
        .filter_map(|object| {
            let name = object
                .key
                .strip_prefix(prefix)
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(&object.key);
            (!name.is_empty() && name.ends_with(".csv")).then(|| (name.to_string(), object))
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let count = files.len();
    let files: Vec<Json> = files
        .into_iter()
        .map(|(filename, object)| {
            json!({
                "filename": filename,
                "size": human_size(object.size),
                "sizeBytes": object.size,
                "lastModified": object.last_modified.to_rfc3339(),
            })
        })
        .collect();

    json!({ "files": files, "count": count })
}

pub fn download_link(url: &str, filename: &str) -> Json {
    json!({ "url": url, "filename": filename })
}

pub fn version(today: NaiveDate, release_number: &str) -> Json {
    json!({
        "reportedDate": today.format("%m/%d/%Y").to_string(),
        "releaseNumber": release_number,
    })
}
