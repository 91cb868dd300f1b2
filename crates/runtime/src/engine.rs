//! Plan execution over local Parquet snapshots.
//!
//! [`DataFusionExecutor`] translates a [`RelationalPlan`] into DataFusion
//! DataFrame calls. Each execution gets its own `SessionContext` over the
//! shared runtime environment, bounded by a connection budget and a timeout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use datafusion::arrow::datatypes::DataType;
use datafusion::common::JoinType;
use datafusion::execution::memory_pool::{FairSpillPool, GreedyMemoryPool};
use datafusion::execution::runtime_env::{RuntimeEnv, RuntimeEnvBuilder};
use datafusion::functions_aggregate::expr_fn::{count_distinct, max, sum};
use datafusion::prelude::{
    cast, col, lit, try_cast, DataFrame, Expr, ParquetReadOptions, SessionConfig, SessionContext,
};
use datafusion::scalar::ScalarValue;
use ghgp_common::config::QuerySettings;
use ghgp_error::{ErrorCode, GhgpError, Result};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::catalog::Table;
use crate::plan::{Aggregate, ColumnRef, JoinKind, Output, Predicate, RelationalPlan};
use crate::value::{Row, Value};

/// Local snapshot location per table.
pub type SourceFiles = HashMap<Table, PathBuf>;

#[async_trait]
pub trait PlanExecutor: Send + Sync {
    async fn execute(&self, plan: &RelationalPlan, sources: &SourceFiles) -> Result<Vec<Row>>;
}

pub struct DataFusionExecutor {
    session_config: SessionConfig,
    runtime_env: Arc<RuntimeEnv>,
    connection_budget: Arc<Semaphore>,
    query_timeout: Duration,
    active_queries: Arc<AtomicUsize>,
}

impl DataFusionExecutor {
    pub fn new(settings: &QuerySettings) -> Result<Self> {
        let mut session_config = SessionConfig::new();
        session_config
            .options_mut()
            .execution
            .parquet
            .pushdown_filters = true;
        session_config.options_mut().execution.parquet.pruning = true;
        session_config.options_mut().execution.target_partitions = settings.target_partitions;

        let mut rt_builder = RuntimeEnvBuilder::new();
        rt_builder = match settings.memory_limit_mb {
            // Spill instead of failing when a large export exhausts the pool
            Some(limit_mb) => {
                rt_builder.with_memory_pool(Arc::new(FairSpillPool::new(limit_mb * 1024 * 1024)))
            }
            None => rt_builder.with_memory_pool(Arc::new(GreedyMemoryPool::new(usize::MAX))),
        };
        let runtime_env = rt_builder.build_arc()?;

        Ok(Self {
            session_config,
            runtime_env,
            connection_budget: Arc::new(Semaphore::new(settings.max_concurrent_queries)),
            query_timeout: Duration::from_secs(settings.query_timeout_secs),
            active_queries: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn active_queries(&self) -> usize {
        self.active_queries.load(Ordering::Relaxed)
    }

    async fn run(&self, plan: &RelationalPlan, sources: &SourceFiles) -> Result<Vec<Row>> {
        let context =
            SessionContext::new_with_config_rt(self.session_config.clone(), self.runtime_env.clone());
        let df = build_dataframe(&context, plan, sources).await?;
        let batches = df.collect().await?;

        let mut rows = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let mut values = Vec::with_capacity(batch.num_columns());
                for array in batch.columns() {
                    values.push(Value::from(ScalarValue::try_from_array(array, row)?));
                }
                rows.push(values);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl PlanExecutor for DataFusionExecutor {
    async fn execute(&self, plan: &RelationalPlan, sources: &SourceFiles) -> Result<Vec<Row>> {
        let _permit = self
            .connection_budget
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GhgpError::internal("Query budget closed"))?;

        let start = Instant::now();
        let active = ActiveQuery::enter(self.active_queries.clone());
        let result = tokio::time::timeout(self.query_timeout, self.run(plan, sources)).await;
        drop(active);

        let rows = match result {
            Ok(rows) => rows?,
            Err(_) => {
                return Err(GhgpError::new(
                    ErrorCode::QueryTimeout,
                    format!(
                        "Query exceeded {}s timeout",
                        self.query_timeout.as_secs()
                    ),
                ))
            }
        };

        info!(
            target: "queries",
            base = %plan.base,
            joins = plan.joins.len(),
            rows_returned = rows.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Executed plan"
        );
        Ok(rows)
    }
}

/// Holds one slot of `active_queries` until dropped.
struct ActiveQuery {
    active: Arc<AtomicUsize>,
}

impl ActiveQuery {
    fn enter(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        Self { active }
    }
}

impl Drop for ActiveQuery {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

async fn scan(context: &SessionContext, table: Table, sources: &SourceFiles) -> Result<DataFrame> {
    let path = sources.get(&table).ok_or_else(|| {
        GhgpError::internal(format!("No snapshot supplied for table {}", table))
    })?;
    let path = path
        .to_str()
        .ok_or_else(|| GhgpError::internal(format!("Non UTF-8 snapshot path for {}", table)))?;

    debug!(table = %table, path, "Scanning snapshot");
    let df = context
        .read_parquet(path, ParquetReadOptions::default())
        .await?
        .alias(table.alias())?;
    Ok(df)
}

/// Translate a plan into a DataFrame. Step order mirrors the plan's contract.
pub async fn build_dataframe(
    context: &SessionContext,
    plan: &RelationalPlan,
    sources: &SourceFiles,
) -> Result<DataFrame> {
    let mut df = scan(context, plan.base, sources).await?;

    for join in &plan.joins {
        let right = scan(context, join.right, sources).await?;
        let mut on: Vec<Expr> = join
            .keys
            .pairs(plan.base, join.right)
            .into_iter()
            .map(|(left, right)| as_text(left).eq(as_text(right)))
            .collect();
        on.extend(join.on.iter().map(predicate_expr));

        let join_type = match join.kind {
            JoinKind::Inner => JoinType::Inner,
            JoinKind::Left => JoinType::Left,
        };
        df = df.join_on(right, join_type, on)?;
    }

    for predicate in &plan.filters {
        df = df.filter(predicate_expr(predicate))?;
    }

    if plan.is_aggregate() {
        let group_by = plan.group_by.iter().map(column_expr).collect();
        let aggregates = plan.aggregates.iter().map(aggregate_expr).collect();
        df = df.aggregate(group_by, aggregates)?;
    }

    let outputs: Vec<Expr> = plan.outputs.iter().map(output_expr).collect();
    df = df.select(outputs)?;

    for predicate in &plan.having {
        df = df.filter(predicate_expr(predicate))?;
    }

    if plan.distinct {
        df = df.distinct()?;
    }

    if !plan.sort.is_empty() {
        let sort = plan
            .sort
            .iter()
            .map(|key| col(key.alias).sort(!key.descending, key.nulls_first))
            .collect();
        df = df.sort(sort)?;
    }

    if plan.offset > 0 || plan.limit.is_some() {
        df = df.limit(plan.offset, plan.limit)?;
    }

    Ok(df)
}

fn column_expr(column: &ColumnRef) -> Expr {
    col(column.qualified())
}

fn as_text(column: ColumnRef) -> Expr {
    cast(column_expr(&column), DataType::Utf8)
}

fn predicate_expr(predicate: &Predicate) -> Expr {
    match predicate {
        Predicate::TextEq { column, value } => as_text(*column).eq(lit(value.as_str())),
        Predicate::TextNotEq { column, value } => as_text(*column).not_eq(lit(value.as_str())),
        Predicate::Present { column } => column_expr(column)
            .is_not_null()
            .and(as_text(*column).not_eq(lit(""))),
        Predicate::IntEq { column, value } => {
            try_cast(column_expr(column), DataType::Int64).eq(lit(*value))
        }
        Predicate::OutputGreaterThan { alias, value } => col(*alias).gt(lit(*value)),
    }
}

fn aggregate_expr(aggregate: &Aggregate) -> Expr {
    match aggregate {
        Aggregate::Sum { column, alias } => {
            sum(try_cast(column_expr(column), DataType::Float64)).alias(*alias)
        }
        Aggregate::CountDistinct { column, alias } => {
            count_distinct(column_expr(column)).alias(*alias)
        }
        Aggregate::MaxInt { column, alias } => {
            max(try_cast(column_expr(column), DataType::Int64)).alias(*alias)
        }
    }
}

fn output_expr(output: &Output) -> Expr {
    match output {
        Output::Column { column, alias } => column_expr(column).alias(*alias),
        Output::Numeric { column, alias } => {
            try_cast(column_expr(column), DataType::Float64).alias(*alias)
        }
        Output::Aggregate { alias } => col(*alias),
    }
}
