//! Operation to plan compilation.
//!
//! [`QueryCompiler::compile`] is pure: the same operation always yields the
//! same plan, and no I/O happens here.

use ghgp_common::config::{DEFAULT_EXPORT_ROW_CAP, DEFAULT_PAGE_SIZE};

use crate::catalog::Table;
use crate::plan::{
    column, Aggregate, JoinKeys, JoinKind, Output, Predicate, RelationalPlan, SortKey,
};

pub const BIOGENIC_CO2: &str = "Biogenic CO2";
pub const EMITTER_SECTOR_TYPE: &str = "E";

/// Output aliases shared with the response shaper.
pub mod aliases {
    pub const ID: &str = "id";
    pub const LATITUDE: &str = "lt";
    pub const LONGITUDE: &str = "ln";
    pub const EMISSIONS: &str = "emissions";
    pub const SECTOR_NAME: &str = "sector_name";
    pub const TOTAL_EMISSIONS: &str = "total_emissions";
    pub const TOTAL_EMISSION: &str = "total_emission";
    pub const FACILITY_COUNT: &str = "facility_count";
    pub const SECTOR_ID: &str = "sector_id";
    pub const YEAR: &str = "year";
    pub const GAS_NAME: &str = "gas_name";
}

use aliases::*;

/// Every analytic query the service can run.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    MapMarkers {
        year: String,
        state: Option<String>,
    },
    MapOverlay {
        year: String,
        state: Option<String>,
        source: String,
    },
    SectorTotals {
        year: String,
        state: Option<String>,
    },
    ListSectors {
        year: String,
    },
    ListFacilities {
        year: String,
        page: usize,
    },
    SectorLookup {
        sector_id: i64,
    },
    SectorTrend {
        state: Option<String>,
        sector: Option<String>,
    },
    BarSector {
        year: String,
        state: Option<String>,
    },
    PieSectors {
        year: String,
        state: Option<String>,
        sector: Option<String>,
    },
    Export {
        year: String,
        state: Option<String>,
        source: String,
        all_years: bool,
    },
    FacilityInfo {
        id: String,
        year: Option<String>,
    },
    FacilityGasBreakdown {
        id: String,
        year: String,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::MapMarkers { .. } => "map_markers",
            Operation::MapOverlay { .. } => "map_overlay",
            Operation::SectorTotals { .. } => "sector_totals",
            Operation::ListSectors { .. } => "list_sectors",
            Operation::ListFacilities { .. } => "list_facilities",
            Operation::SectorLookup { .. } => "sector_lookup",
            Operation::SectorTrend { .. } => "sector_trend",
            Operation::BarSector { .. } => "bar_sector",
            Operation::PieSectors { .. } => "pie_sectors",
            Operation::Export { .. } => "export",
            Operation::FacilityInfo { .. } => "facility_info",
            Operation::FacilityGasBreakdown { .. } => "facility_gas_breakdown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryCompiler {
    page_size: usize,
    export_row_cap: usize,
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_EXPORT_ROW_CAP)
    }
}

impl QueryCompiler {
    pub fn new(page_size: usize, export_row_cap: usize) -> Self {
        Self {
            page_size,
            export_row_cap,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn compile(&self, operation: &Operation) -> RelationalPlan {
        match operation {
            Operation::MapMarkers { year, state } => map_markers(year, state.as_deref()),
            Operation::MapOverlay {
                year,
                state,
                source,
            } => map_overlay(year, state.as_deref(), source),
            Operation::SectorTotals { year, state } | Operation::BarSector { year, state } => {
                sector_totals(year, state.as_deref(), None)
            }
            Operation::ListSectors { year } => sector_totals(year, None, None),
            Operation::PieSectors {
                year,
                state,
                sector,
            } => sector_totals(year, state.as_deref(), sector.as_deref()),
            Operation::ListFacilities { year, page } => self.list_facilities(year, *page),
            Operation::SectorLookup { sector_id } => sector_lookup(*sector_id),
            Operation::SectorTrend { state, sector } => {
                sector_trend(state.as_deref(), sector.as_deref())
            }
            Operation::Export {
                year,
                state,
                source,
                all_years,
            } => self.export(year, state.as_deref(), source, *all_years),
            Operation::FacilityInfo { id, year } => facility_info(id, year.as_deref()),
            Operation::FacilityGasBreakdown { id, year } => facility_gas_breakdown(id, year),
        }
    }

    fn list_facilities(&self, year: &str, page: usize) -> RelationalPlan {
        let f = Table::Facilities;
        let offset = page.saturating_sub(1).saturating_mul(self.page_size);

        RelationalPlan::scan(f)
            .join(
                Table::FacilityYearAgg,
                JoinKeys::FacilityYear,
                JoinKind::Left,
                vec![],
            )
            .filter(year_eq(f, year))
            .outputs(vec![
                Output::column(column(f, "facility_id"), "facility_id"),
                Output::column(column(f, "facility_name"), "facility_name"),
                Output::column(column(f, "city"), "city"),
                Output::column(column(f, "state"), "state"),
                Output::column(column(f, "county"), "county"),
                Output::numeric(column(f, "latitude"), "latitude"),
                Output::numeric(column(f, "longitude"), "longitude"),
                Output::numeric(column(Table::FacilityYearAgg, "total_emission"), TOTAL_EMISSION),
            ])
            .sort(vec![SortKey::desc(TOTAL_EMISSION)])
            .paginate(offset, self.page_size)
    }

    fn export(&self, year: &str, state: Option<&str>, source: &str, all_years: bool) -> RelationalPlan {
        let f = Table::Facilities;
        let e = Table::SectorFacts;

        let mut group_by = Vec::new();
        let mut outputs = Vec::new();
        if all_years {
            group_by.push(column(f, "year"));
            outputs.push(Output::column(column(f, "year"), YEAR));
        }
        for name in EXPORT_FACILITY_COLUMNS {
            group_by.push(column(f, name));
            outputs.push(Output::column(column(f, name), name));
        }
        outputs.push(Output::Aggregate {
            alias: TOTAL_EMISSIONS,
        });

        let plan = RelationalPlan::scan(f)
            .join(
                e,
                JoinKeys::FacilityYear,
                JoinKind::Left,
                vec![
                    Predicate::text_eq(column(e, "sector_type"), source),
                    not_biogenic(e),
                ],
            )
            .filter_opt((!all_years).then(|| year_eq(f, year)))
            .filter_opt(state_eq(f, state))
            .group_by(group_by)
            .aggregate(Aggregate::Sum {
                column: column(e, "co2e_emission"),
                alias: TOTAL_EMISSIONS,
            })
            .outputs(outputs);

        if all_years {
            plan.having(Predicate::OutputGreaterThan {
                alias: TOTAL_EMISSIONS,
                value: 0.0,
            })
            .sort(vec![SortKey::desc(YEAR), SortKey::desc(TOTAL_EMISSIONS)])
            .limit(self.export_row_cap)
        } else {
            plan.sort(vec![SortKey::desc(TOTAL_EMISSIONS)])
        }
    }
}

/// Facility columns in export order, after the optional year.
pub const EXPORT_FACILITY_COLUMNS: [&str; 10] = [
    "facility_id",
    "facility_name",
    "city",
    "state",
    "county",
    "zip",
    "address1",
    "latitude",
    "longitude",
    "parent_company",
];

/// Facility columns returned by [`Operation::FacilityInfo`], in order.
pub const FACILITY_INFO_COLUMNS: [&str; 11] = [
    "facility_id",
    "facility_name",
    "address1",
    "address2",
    "city",
    "state",
    "county",
    "zip",
    "latitude",
    "longitude",
    "parent_company",
];

fn year_eq(table: Table, year: &str) -> Predicate {
    Predicate::text_eq(column(table, "year"), year)
}

fn state_eq(table: Table, state: Option<&str>) -> Option<Predicate> {
    state.map(|s| Predicate::text_eq(column(table, "state"), s))
}

fn not_biogenic(table: Table) -> Predicate {
    Predicate::text_not_eq(column(table, "gas_name"), BIOGENIC_CO2)
}

/// Adds the facility join and state equality when a state is selected.
fn with_state(plan: RelationalPlan, state: Option<&str>) -> RelationalPlan {
    match state {
        Some(state) => plan
            .join(
                Table::Facilities,
                JoinKeys::FacilityYear,
                JoinKind::Inner,
                vec![],
            )
            .filter(Predicate::text_eq(column(Table::Facilities, "state"), state)),
        None => plan,
    }
}

fn map_markers(year: &str, state: Option<&str>) -> RelationalPlan {
    let f = Table::Facilities;
    RelationalPlan::scan(f)
        .filter(year_eq(f, year))
        .filter(Predicate::Present {
            column: column(f, "latitude"),
        })
        .filter(Predicate::Present {
            column: column(f, "longitude"),
        })
        .filter_opt(state_eq(f, state))
        .outputs(vec![
            Output::column(column(f, "facility_id"), ID),
            Output::numeric(column(f, "latitude"), LATITUDE),
            Output::numeric(column(f, "longitude"), LONGITUDE),
        ])
        .distinct()
}

fn map_overlay(year: &str, state: Option<&str>, source: &str) -> RelationalPlan {
    let f = Table::Facilities;
    let e = Table::SectorFacts;
    RelationalPlan::scan(f)
        .join(e, JoinKeys::FacilityYear, JoinKind::Inner, vec![])
        .filter(year_eq(f, year))
        .filter(Predicate::Present {
            column: column(f, "latitude"),
        })
        .filter(Predicate::Present {
            column: column(f, "longitude"),
        })
        .filter(Predicate::text_eq(column(e, "sector_type"), source))
        .filter(not_biogenic(e))
        .filter_opt(state_eq(f, state))
        .group_by(vec![
            column(f, "facility_id"),
            column(f, "latitude"),
            column(f, "longitude"),
        ])
        .aggregate(Aggregate::Sum {
            column: column(e, "co2e_emission"),
            alias: EMISSIONS,
        })
        .outputs(vec![
            Output::column(column(f, "facility_id"), ID),
            Output::numeric(column(f, "latitude"), LATITUDE),
            Output::numeric(column(f, "longitude"), LONGITUDE),
            Output::Aggregate { alias: EMISSIONS },
        ])
}

/// Per-sector totals shared by the sector, list, bar and pie operations.
fn sector_totals(year: &str, state: Option<&str>, sector: Option<&str>) -> RelationalPlan {
    let e = Table::SectorFacts;
    let d = Table::SectorDim;

    let plan = RelationalPlan::scan(e).join(d, JoinKeys::SectorName, JoinKind::Left, vec![]);
    with_state(plan, state)
        .filter(year_eq(e, year))
        .filter(Predicate::text_eq(
            column(e, "sector_type"),
            EMITTER_SECTOR_TYPE,
        ))
        .filter(not_biogenic(e))
        .filter_opt(sector.map(|s| Predicate::text_eq(column(e, "sector_name"), s)))
        .group_by(vec![column(e, "sector_name")])
        .aggregate(Aggregate::Sum {
            column: column(e, "co2e_emission"),
            alias: TOTAL_EMISSIONS,
        })
        .aggregate(Aggregate::CountDistinct {
            column: column(e, "facility_id"),
            alias: FACILITY_COUNT,
        })
        .aggregate(Aggregate::MaxInt {
            column: column(d, "sector_id"),
            alias: SECTOR_ID,
        })
        .outputs(vec![
            Output::column(column(e, "sector_name"), SECTOR_NAME),
            Output::Aggregate {
                alias: TOTAL_EMISSIONS,
            },
            Output::Aggregate {
                alias: FACILITY_COUNT,
            },
            Output::Aggregate { alias: SECTOR_ID },
        ])
        .sort(vec![SortKey::desc(TOTAL_EMISSIONS)])
}

fn sector_lookup(sector_id: i64) -> RelationalPlan {
    let d = Table::SectorDim;
    RelationalPlan::scan(d)
        .filter(Predicate::IntEq {
            column: column(d, "sector_id"),
            value: sector_id,
        })
        .outputs(vec![Output::column(column(d, "sector_name"), SECTOR_NAME)])
        .limit(1)
}

fn sector_trend(state: Option<&str>, sector: Option<&str>) -> RelationalPlan {
    let e = Table::SectorFacts;
    with_state(RelationalPlan::scan(e), state)
        .filter(Predicate::text_eq(
            column(e, "sector_type"),
            EMITTER_SECTOR_TYPE,
        ))
        .filter(not_biogenic(e))
        .filter_opt(sector.map(|s| Predicate::text_eq(column(e, "sector_name"), s)))
        .group_by(vec![column(e, "year")])
        .aggregate(Aggregate::Sum {
            column: column(e, "co2e_emission"),
            alias: TOTAL_EMISSIONS,
        })
        .outputs(vec![
            Output::column(column(e, "year"), YEAR),
            Output::Aggregate {
                alias: TOTAL_EMISSIONS,
            },
        ])
        .sort(vec![SortKey::asc(YEAR)])
}

fn facility_info(id: &str, year: Option<&str>) -> RelationalPlan {
    let f = Table::Facilities;
    let mut outputs: Vec<Output> = FACILITY_INFO_COLUMNS
        .iter()
        .map(|&name| Output::column(column(f, name), name))
        .collect();
    outputs.push(Output::column(column(f, "year"), YEAR));

    RelationalPlan::scan(f)
        .filter(Predicate::text_eq(column(f, "facility_id"), id))
        .filter_opt(year.map(|y| year_eq(f, y)))
        .outputs(outputs)
        .sort(vec![SortKey::desc(YEAR)])
        .limit(1)
}

fn facility_gas_breakdown(id: &str, year: &str) -> RelationalPlan {
    let e = Table::SectorFacts;
    RelationalPlan::scan(e)
        .filter(Predicate::text_eq(column(e, "facility_id"), id))
        .filter(year_eq(e, year))
        .filter(not_biogenic(e))
        .group_by(vec![column(e, "gas_name")])
        .aggregate(Aggregate::Sum {
            column: column(e, "co2e_emission"),
            alias: TOTAL_EMISSION,
        })
        .outputs(vec![
            Output::column(column(e, "gas_name"), GAS_NAME),
            Output::Aggregate {
                alias: TOTAL_EMISSION,
            },
        ])
        .sort(vec![SortKey::desc(TOTAL_EMISSION)])
}
