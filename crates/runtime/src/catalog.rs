//! Static mapping from logical dataset names to remote keys and local files.

use std::fmt;
use std::path::{Path, PathBuf};

use ghgp_common::config::StorageSettings;

/// The four emission tables published as Parquet snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// One row per facility per reporting year.
    Facilities,
    /// Emissions per facility, year, sector and gas.
    SectorFacts,
    /// Sector id to sector name.
    SectorDim,
    /// Total emissions per facility per year, keyed by `pgm_sys_id`.
    FacilityYearAgg,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Facilities,
        Table::SectorFacts,
        Table::SectorDim,
        Table::FacilityYearAgg,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Facilities => "RLPS_GHG_EMITTER_FACILITIES",
            Table::SectorFacts => "RLPS_GHG_EMITTER_SECTOR",
            Table::SectorDim => "PUB_DIM_SECTOR",
            Table::FacilityYearAgg => "RLPS_FAC_YEAR_AGG",
        }
    }

    /// Relation alias used when the table takes part in a plan.
    pub fn alias(&self) -> &'static str {
        match self {
            Table::Facilities => "f",
            Table::SectorFacts => "e",
            Table::SectorDim => "d",
            Table::FacilityYearAgg => "a",
        }
    }

    /// Column holding the facility identifier, if the table is facility-keyed.
    pub fn facility_key(&self) -> Option<&'static str> {
        match self {
            Table::Facilities | Table::SectorFacts => Some("facility_id"),
            Table::FacilityYearAgg => Some("pgm_sys_id"),
            Table::SectorDim => None,
        }
    }

    pub fn file_name(&self) -> String {
        format!("ghg.{}.parquet", self.name())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// JSON documents keyed by upper-case state code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoDocument {
    StateGeometries,
    CountiesByState,
}

impl GeoDocument {
    pub fn file_name(&self) -> &'static str {
        match self {
            GeoDocument::StateGeometries => "state_geometries.json",
            GeoDocument::CountiesByState => "counties_by_state.json",
        }
    }
}

/// Anything the snapshot cache can materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Table(Table),
    Geo(GeoDocument),
}

impl Dataset {
    /// Cache key; unique across tables and geo documents.
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Table(table) => table.name(),
            Dataset::Geo(doc) => doc.file_name(),
        }
    }
}

impl From<Table> for Dataset {
    fn from(table: Table) -> Self {
        Dataset::Table(table)
    }
}

impl From<GeoDocument> for Dataset {
    fn from(doc: GeoDocument) -> Self {
        Dataset::Geo(doc)
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    table_prefix: String,
    geo_prefix: String,
    snapshot_dir: PathBuf,
}

impl Catalog {
    pub fn new(
        table_prefix: impl Into<String>,
        geo_prefix: impl Into<String>,
        snapshot_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            table_prefix: table_prefix.into(),
            geo_prefix: geo_prefix.into(),
            snapshot_dir: snapshot_dir.into(),
        }
    }

    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self::new(
            &settings.table_prefix,
            &settings.geo_prefix,
            &settings.snapshot_dir,
        )
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn remote_key(&self, dataset: Dataset) -> String {
        match dataset {
            Dataset::Table(table) => join_key(&self.table_prefix, &table.file_name()),
            Dataset::Geo(doc) => join_key(&self.geo_prefix, doc.file_name()),
        }
    }

    pub fn local_path(&self, dataset: Dataset) -> PathBuf {
        match dataset {
            Dataset::Table(table) => self.snapshot_dir.join(table.file_name()),
            Dataset::Geo(doc) => self.snapshot_dir.join(doc.file_name()),
        }
    }
}

fn join_key(prefix: &str, file: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", prefix, file)
    }
}
