//! Typed relational plans.
//!
//! A [`RelationalPlan`] is built fresh per request by the compiler and handed
//! to a [`PlanExecutor`](crate::engine::PlanExecutor). Literal values only ever
//! appear as typed predicate operands, never as query text.
//!
//! Execution order is fixed: scan, joins, filters, aggregation, output
//! projection, post-aggregate filter, distinct, sort, offset/limit.

use std::collections::BTreeSet;

use crate::catalog::Table;

/// `alias.column` reference into one of the plan's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Table,
    pub column: &'static str,
}

impl ColumnRef {
    pub fn new(table: Table, column: &'static str) -> Self {
        Self { table, column }
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table.alias(), self.column)
    }
}

/// Shorthand for building column references.
pub fn column(table: Table, column: &'static str) -> ColumnRef {
    ColumnRef::new(table, column)
}

/// The only join predicates the data model has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKeys {
    /// Facility id and reporting year; the aggregate table keys facilities by `pgm_sys_id`.
    FacilityYear,
    /// Sector name enrichment from the dimension table.
    SectorName,
}

impl JoinKeys {
    /// Column pairs (left, right) compared for equality.
    pub fn pairs(&self, left: Table, right: Table) -> Vec<(ColumnRef, ColumnRef)> {
        match self {
            JoinKeys::FacilityYear => {
                let left_id = left.facility_key().unwrap_or("facility_id");
                let right_id = right.facility_key().unwrap_or("facility_id");
                vec![
                    (column(left, left_id), column(right, right_id)),
                    (column(left, "year"), column(right, "year")),
                ]
            }
            JoinKeys::SectorName => vec![(column(left, "sector_name"), column(right, "sector_name"))],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub right: Table,
    pub keys: JoinKeys,
    pub kind: JoinKind,
    /// Extra conditions evaluated as part of the join, not after it.
    pub on: Vec<Predicate>,
}

/// Row filters. Text comparisons cast the column to a string first, so
/// year and id filters behave the same whether the file stores them as
/// strings or integers.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    TextEq { column: ColumnRef, value: String },
    TextNotEq { column: ColumnRef, value: String },
    /// Not null and not the empty string.
    Present { column: ColumnRef },
    /// Integer comparison after a lenient cast.
    IntEq { column: ColumnRef, value: i64 },
    /// Post-aggregate comparison against an output alias.
    OutputGreaterThan { alias: &'static str, value: f64 },
}

impl Predicate {
    pub fn text_eq(column: ColumnRef, value: impl Into<String>) -> Self {
        Predicate::TextEq {
            column,
            value: value.into(),
        }
    }

    pub fn text_not_eq(column: ColumnRef, value: impl Into<String>) -> Self {
        Predicate::TextNotEq {
            column,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    /// Sum of the column read as a double.
    Sum { column: ColumnRef, alias: &'static str },
    CountDistinct { column: ColumnRef, alias: &'static str },
    /// Maximum of the column read as an integer.
    MaxInt { column: ColumnRef, alias: &'static str },
}

impl Aggregate {
    pub fn alias(&self) -> &'static str {
        match self {
            Aggregate::Sum { alias, .. }
            | Aggregate::CountDistinct { alias, .. }
            | Aggregate::MaxInt { alias, .. } => alias,
        }
    }
}

/// One projected output column. Position in [`RelationalPlan::outputs`] is
/// the contract with the response shaper.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Column as stored.
    Column { column: ColumnRef, alias: &'static str },
    /// Column read as a double; unparseable values become null.
    Numeric { column: ColumnRef, alias: &'static str },
    /// An aggregate computed by this plan.
    Aggregate { alias: &'static str },
}

impl Output {
    pub fn column(column: ColumnRef, alias: &'static str) -> Self {
        Output::Column { column, alias }
    }

    pub fn numeric(column: ColumnRef, alias: &'static str) -> Self {
        Output::Numeric { column, alias }
    }

    pub fn alias(&self) -> &'static str {
        match self {
            Output::Column { alias, .. }
            | Output::Numeric { alias, .. }
            | Output::Aggregate { alias } => alias,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    /// Output alias to sort on.
    pub alias: &'static str,
    pub descending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    pub fn asc(alias: &'static str) -> Self {
        Self {
            alias,
            descending: false,
            nulls_first: false,
        }
    }

    pub fn desc(alias: &'static str) -> Self {
        Self {
            alias,
            descending: true,
            nulls_first: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationalPlan {
    pub base: Table,
    pub joins: Vec<Join>,
    pub filters: Vec<Predicate>,
    pub group_by: Vec<ColumnRef>,
    pub aggregates: Vec<Aggregate>,
    pub outputs: Vec<Output>,
    pub having: Vec<Predicate>,
    pub distinct: bool,
    pub sort: Vec<SortKey>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl RelationalPlan {
    pub fn scan(base: Table) -> Self {
        Self {
            base,
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            aggregates: Vec::new(),
            outputs: Vec::new(),
            having: Vec::new(),
            distinct: false,
            sort: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    pub fn join(mut self, right: Table, keys: JoinKeys, kind: JoinKind, on: Vec<Predicate>) -> Self {
        self.joins.push(Join {
            right,
            keys,
            kind,
            on,
        });
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    pub fn filter_opt(self, predicate: Option<Predicate>) -> Self {
        match predicate {
            Some(p) => self.filter(p),
            None => self,
        }
    }

    pub fn group_by(mut self, columns: Vec<ColumnRef>) -> Self {
        self.group_by = columns;
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    pub fn outputs(mut self, outputs: Vec<Output>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn having(mut self, predicate: Predicate) -> Self {
        self.having.push(predicate);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.sort = keys;
        self
    }

    pub fn paginate(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Every table the plan reads.
    pub fn tables(&self) -> BTreeSet<Table> {
        std::iter::once(self.base)
            .chain(self.joins.iter().map(|j| j.right))
            .collect()
    }

    pub fn is_aggregate(&self) -> bool {
        !self.aggregates.is_empty() || !self.group_by.is_empty()
    }

    pub fn joins_table(&self, table: Table) -> bool {
        self.joins.iter().any(|j| j.right == table)
    }

    /// Position of an output alias, for shapers that read by name.
    pub fn output_index(&self, alias: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o.alias() == alias)
    }
}
