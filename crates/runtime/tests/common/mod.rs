#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use datafusion::arrow::array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use ghgp_common::config::QuerySettings;
use ghgp_error::Result;
use ghgp_runtime::catalog::Catalog;
use ghgp_runtime::remote::ObjectInfo;
use ghgp_runtime::{
    AnalyticsService, DataFusionExecutor, ObjectStoreRemote, QueryCompiler, RemoteStore,
    ServiceSettings, SnapshotCache,
};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ObjectStore, PutPayload};
use parquet::arrow::ArrowWriter;
use tempfile::TempDir;

pub const TABLE_PREFIX: &str = "epa_ghg_tables_parquet";
pub const CSV_PREFIX: &str = "epa_ghg_tables_csvs/";

/// Counts every call that reaches the object store.
#[derive(Debug)]
pub struct CountingRemote {
    inner: ObjectStoreRemote,
    pub fetches: AtomicUsize,
    pub heads: AtomicUsize,
    pub presigns: AtomicUsize,
    pub lists: AtomicUsize,
    delay: Duration,
}

impl CountingRemote {
    pub fn calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
            + self.heads.load(Ordering::SeqCst)
            + self.presigns.load(Ordering::SeqCst)
            + self.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for CountingRemote {
    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_to(key, dest).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list(prefix).await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        self.inner.head(key).await
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        self.presigns.fetch_add(1, Ordering::SeqCst);
        self.inner.presign_get(key, expires_in).await
    }
}

#[derive(Debug)]
pub struct FakeSigner;

#[async_trait]
impl Signer for FakeSigner {
    async fn signed_url(
        &self,
        method: http::Method,
        path: &ObjectPath,
        expires_in: Duration,
    ) -> object_store::Result<url::Url> {
        let url = format!(
            "https://signed.example/{}?method={}&expires={}",
            path,
            method,
            expires_in.as_secs()
        );
        Ok(url::Url::parse(&url).expect("valid test url"))
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<InMemory>,
    pub remote: Arc<CountingRemote>,
    pub service: AnalyticsService,
}

fn strings(values: &[Option<&str>]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

fn ints(values: &[i64]) -> ArrayRef {
    Arc::new(Int64Array::from(values.to_vec()))
}

fn parquet_bytes(batch: &RecordBatch) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
    buffer
}

pub fn facilities() -> RecordBatch {
    RecordBatch::try_from_iter(vec![
        ("facility_id", ints(&[1001, 1002, 1003, 1004, 1001, 1005])),
        (
            "facility_name",
            strings(&[
                Some("Alpha Power"),
                Some("Beta Refinery"),
                Some("Gamma Chemicals"),
                Some("Delta Landfill"),
                Some("Alpha Power"),
                Some("Epsilon Lime"),
            ]),
        ),
        ("year", ints(&[2023, 2023, 2023, 2023, 2022, 2021])),
        (
            "state",
            strings(&[Some("TX"), Some("TX"), Some("CA"), Some("CA"), Some("TX"), Some("OH")]),
        ),
        (
            "city",
            strings(&[
                Some("Houston"),
                Some("Beaumont"),
                Some("Los Angeles"),
                Some("Fresno"),
                Some("Houston"),
                Some("Columbus"),
            ]),
        ),
        (
            "county",
            strings(&[
                Some("Harris"),
                Some("Jefferson"),
                Some("Los Angeles"),
                Some("Fresno"),
                Some("Harris"),
                Some("Franklin"),
            ]),
        ),
        (
            "zip",
            strings(&[
                Some("77001"),
                Some("77701"),
                Some("90001"),
                Some("93650"),
                Some("77001"),
                Some("43004"),
            ]),
        ),
        (
            "address1",
            strings(&[
                Some("1 Plant Rd"),
                Some("2 Refinery Way"),
                Some("3 Lab St"),
                Some("4 Dump Ln"),
                Some("1 Plant Rd"),
                Some("5 Quarry Ct"),
            ]),
        ),
        ("address2", strings(&[None, Some("Unit B"), None, None, None, None])),
        (
            "latitude",
            strings(&[
                Some("29.76"),
                Some("30.08"),
                Some("34.05"),
                Some(""),
                Some("29.76"),
                Some("39.96"),
            ]),
        ),
        (
            "longitude",
            strings(&[
                Some("-95.36"),
                Some("-94.10"),
                Some("-118.24"),
                Some(""),
                Some("-95.36"),
                Some("-83.00"),
            ]),
        ),
        (
            "parent_company",
            strings(&[
                Some("Alpha Corp"),
                Some("Beta, Inc."),
                None,
                Some("Delta LLC"),
                Some("Alpha Corp"),
                None,
            ]),
        ),
    ])
    .unwrap()
}

pub fn sector_facts() -> RecordBatch {
    let rows: [(i64, i64, &str, &str, &str, &str); 12] = [
        (1001, 2023, "Power Plants", "E", "Carbon Dioxide", "1500000000"),
        (1001, 2023, "Power Plants", "E", "Methane", "500000"),
        (1001, 2023, "Power Plants", "E", "Biogenic CO2", "9000000"),
        (1002, 2023, "Refineries", "E", "Carbon Dioxide", "2000000"),
        (1002, 2023, "Refineries", "S", "Carbon Dioxide", "700000"),
        (1003, 2023, "Chemicals", "E", "Carbon Dioxide", "1000000"),
        (1003, 2023, "Chemicals", "E", "Nitrous Oxide", "250000"),
        (1004, 2023, "Waste", "E", "Methane", "400000"),
        (1004, 2023, "Waste", "E", "Biogenic CO2", "300000"),
        (1001, 2022, "Power Plants", "E", "Carbon Dioxide", "2500000"),
        (1001, 2022, "Power Plants", "E", "Biogenic CO2", "1000000"),
        (1005, 2021, "Minerals", "E", "Carbon Dioxide", "1500000"),
    ];

    RecordBatch::try_from_iter(vec![
        ("facility_id", ints(&rows.map(|r| r.0))),
        ("year", ints(&rows.map(|r| r.1))),
        ("sector_name", strings(&rows.map(|r| Some(r.2)))),
        ("sector_type", strings(&rows.map(|r| Some(r.3)))),
        ("gas_name", strings(&rows.map(|r| Some(r.4)))),
        ("co2e_emission", strings(&rows.map(|r| Some(r.5)))),
    ])
    .unwrap()
}

pub fn sector_dim() -> RecordBatch {
    RecordBatch::try_from_iter(vec![
        ("sector_id", ints(&[1, 2, 3, 4, 5])),
        (
            "sector_name",
            strings(&[
                Some("Power Plants"),
                Some("Refineries"),
                Some("Chemicals"),
                Some("Waste"),
                Some("Minerals"),
            ]),
        ),
    ])
    .unwrap()
}

pub fn facility_year_agg() -> RecordBatch {
    RecordBatch::try_from_iter(vec![
        ("pgm_sys_id", strings(&[Some("1001"), Some("1002"), Some("1003"), Some("1001")])),
        ("year", strings(&[Some("2023"), Some("2023"), Some("2023"), Some("2022")])),
        (
            "total_emission",
            Arc::new(Float64Array::from(vec![1_500_500_000.0, 2_000_000.0, 1_250_000.0, 2_500_000.0]))
                as ArrayRef,
        ),
    ])
    .unwrap()
}

/// `count` facilities reporting in 2023, ids from 2000 upward, each emitting
/// its own id in metric tons so the list order is by descending id.
pub fn numbered_facilities(count: i64) -> (RecordBatch, RecordBatch) {
    let ids: Vec<i64> = (2000..2000 + count).collect();
    let names: Vec<String> = ids.iter().map(|id| format!("Facility {}", id)).collect();
    let id_text: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    let text = |values: &[String]| -> ArrayRef {
        Arc::new(StringArray::from_iter_values(values.iter()))
    };
    let same = |value: &str| -> ArrayRef {
        Arc::new(StringArray::from_iter_values(ids.iter().map(|_| value)))
    };

    let facilities = RecordBatch::try_from_iter(vec![
        ("facility_id", ints(&ids)),
        ("facility_name", text(&names)),
        ("year", ints(&vec![2023; ids.len()])),
        ("state", same("TX")),
        ("city", same("Houston")),
        ("county", same("Harris")),
        ("zip", same("77001")),
        ("address1", same("1 Plant Rd")),
        ("address2", same("")),
        ("latitude", same("29.76")),
        ("longitude", same("-95.36")),
        ("parent_company", same("")),
    ])
    .unwrap();

    let aggregate = RecordBatch::try_from_iter(vec![
        ("pgm_sys_id", text(&id_text)),
        ("year", same("2023")),
        (
            "total_emission",
            Arc::new(Float64Array::from_iter_values(ids.iter().map(|id| *id as f64))) as ArrayRef,
        ),
    ])
    .unwrap();

    (facilities, aggregate)
}

/// Overwrite one seeded table before the cache first fetches it.
pub async fn replace_table(store: &InMemory, table: &str, batch: &RecordBatch) {
    let key = format!("{}/ghg.{}.parquet", TABLE_PREFIX, table);
    put(store, &key, parquet_bytes(batch)).await;
}

async fn put(store: &InMemory, key: &str, bytes: Vec<u8>) {
    store
        .put(&ObjectPath::from(key), PutPayload::from(bytes))
        .await
        .unwrap();
}

pub async fn seeded_store() -> Arc<InMemory> {
    let store = Arc::new(InMemory::new());
    for (table, batch) in [
        ("RLPS_GHG_EMITTER_FACILITIES", facilities()),
        ("RLPS_GHG_EMITTER_SECTOR", sector_facts()),
        ("PUB_DIM_SECTOR", sector_dim()),
        ("RLPS_FAC_YEAR_AGG", facility_year_agg()),
    ] {
        let key = format!("{}/ghg.{}.parquet", TABLE_PREFIX, table);
        put(&store, &key, parquet_bytes(&batch)).await;
    }

    put(
        &store,
        "epa_ghg_tables_csvs/rlps_ghg_emitter_facilities.csv",
        b"facility_id\n1001\n".to_vec(),
    )
    .await;
    put(&store, "epa_ghg_tables_csvs/pub_dim_sector.csv", vec![b'x'; 2048]).await;
    put(&store, "epa_ghg_tables_csvs/README.md", b"notes".to_vec()).await;
    store
}

pub async fn fixture() -> Fixture {
    fixture_with(QueryCompiler::default(), Duration::ZERO).await
}

pub async fn fixture_with(compiler: QueryCompiler, fetch_delay: Duration) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let remote = Arc::new(CountingRemote {
        inner: ObjectStoreRemote::new(store.clone()).with_signer(Arc::new(FakeSigner)),
        fetches: AtomicUsize::new(0),
        heads: AtomicUsize::new(0),
        presigns: AtomicUsize::new(0),
        lists: AtomicUsize::new(0),
        delay: fetch_delay,
    });

    let cache = SnapshotCache::new(
        Catalog::new(TABLE_PREFIX, "epa_ghg_geo", dir.path()),
        remote.clone(),
        Duration::from_secs(30),
    );
    let executor = Arc::new(DataFusionExecutor::new(&QuerySettings::default()).unwrap());
    let service = AnalyticsService::new(
        compiler,
        cache,
        executor,
        ServiceSettings {
            csv_prefix: CSV_PREFIX.to_string(),
            presign_ttl: Duration::from_secs(3600),
            release_number: "TEST-1.0".to_string(),
        },
    );

    Fixture {
        dir,
        store,
        remote,
        service,
    }
}
