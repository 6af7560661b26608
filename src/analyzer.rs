use crate::buckets::{BucketScheme, BucketSchemeError, BucketSchemeKind};
use crate::models::{Config, CurrentLoanState, LoanEvent, UserId, ValueField};
use crate::stats::{describe, GroupSummary};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// How to choose between two events of one user stamped with the same
/// `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TieBreak {
    /// Earliest row in the input wins. Same result as a stable sort by
    /// `(user_id asc, created_at desc)` followed by keeping the first row of
    /// every user.
    #[default]
    #[serde(rename = "input_order")]
    InputOrder,
    /// Larger `loan_rank` wins (null ranks lowest), then input order.
    #[serde(rename = "highest_loan_rank")]
    HighestLoanRank,
}

/// Which of the two outcome cohorts a current state falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cohort {
    Defaulted,
    NotDefaulted,
}

impl Cohort {
    pub fn of(state: &CurrentLoanState) -> Self {
        if state.is_defaulted() {
            Cohort::Defaulted
        } else {
            Cohort::NotDefaulted
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cohorts {
    pub defaulted: Vec<CurrentLoanState>,
    pub not_defaulted: Vec<CurrentLoanState>,
}

impl Cohorts {
    pub fn total(&self) -> usize {
        self.defaulted.len() + self.not_defaulted.len()
    }

    /// Share of borrowers whose latest loan defaulted, `None` without borrowers.
    pub fn default_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.defaulted.len() as f64 / total as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    LoanRank,
    LoanStatus,
    CreditScoreBucket(BucketScheme),
}

/// One key of an aggregate table. Buckets order by interval, not by label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupValue {
    Rank(i64),
    Status(String),
    Bucket { index: usize, label: String },
}

impl fmt::Display for GroupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupValue::Rank(rank) => write!(f, "{}", rank),
            GroupValue::Status(status) => f.write_str(status),
            GroupValue::Bucket { label, .. } => f.write_str(label),
        }
    }
}

impl GroupKey {
    pub fn column_name(&self) -> &'static str {
        match self {
            GroupKey::LoanRank => "loan_rank",
            GroupKey::LoanStatus => "loan_status",
            GroupKey::CreditScoreBucket(_) => "credit_score_range",
        }
    }

    /// `None` keeps the row out of every group.
    pub fn value_of(&self, state: &CurrentLoanState) -> Option<GroupValue> {
        match self {
            GroupKey::LoanRank => state.loan_rank.map(GroupValue::Rank),
            GroupKey::LoanStatus => state.loan_status.clone().map(GroupValue::Status),
            GroupKey::CreditScoreBucket(scheme) => {
                let score = state.credit_score?;
                let index = scheme.bucket_index(score)?;
                Some(GroupValue::Bucket {
                    index,
                    label: scheme.labels()[index].clone(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    /// Arithmetic mean of the non-null values.
    Mean,
    /// Number of rows with a non-null value.
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateTable {
    pub group_column: &'static str,
    pub value_field: ValueField,
    pub op: AggregateOp,
    rows: Vec<(GroupValue, f64)>,
}

impl AggregateTable {
    /// Rows in ascending key order.
    pub fn rows(&self) -> &[(GroupValue, f64)] {
        &self.rows
    }

    pub fn get(&self, key: &GroupValue) -> Option<f64> {
        self.rows
            .binary_search_by(|(candidate, _)| candidate.cmp(key))
            .ok()
            .map(|idx| self.rows[idx].1)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value_column(&self) -> String {
        match self.op {
            AggregateOp::Mean => format!("mean_{}", self.value_field.column_name()),
            AggregateOp::Count => "count".to_string(),
        }
    }
}

/// Reduce each user's history to the event with the latest `created_at`,
/// breaking same-instant ties by input order.
pub fn resolve_current(events: &[LoanEvent]) -> Vec<CurrentLoanState> {
    resolve_current_with(events, TieBreak::InputOrder)
}

/// Same as [`resolve_current`] with an explicit tie-break rule.
///
/// Output holds exactly one row per distinct `user_id`, sorted by user id.
pub fn resolve_current_with(events: &[LoanEvent], tie_break: TieBreak) -> Vec<CurrentLoanState> {
    let latest = latest_indices(events, tie_break);

    let ties = count_ties(events, &latest);
    if ties > 0 {
        log::warn!(
            "{ties} events share their user's latest timestamp with the chosen one, \
             resolved by {tie_break:?}"
        );
    }

    let mut states: Vec<CurrentLoanState> = latest
        .into_values()
        .map(|idx| events[idx].clone())
        .collect();
    states.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    log::info!("resolved {} events to {} current loan states", events.len(), states.len());
    states
}

/// Index of the winning event for every user.
fn latest_indices(events: &[LoanEvent], tie_break: TieBreak) -> HashMap<&UserId, usize> {
    let mut latest: HashMap<&UserId, usize> = HashMap::new();

    for (idx, event) in events.iter().enumerate() {
        match latest.entry(&event.user_id) {
            Entry::Vacant(slot) => {
                slot.insert(idx);
            }
            Entry::Occupied(mut slot) => {
                let current = &events[*slot.get()];
                let replace = match event.created_at.cmp(&current.created_at) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => {
                        tie_break == TieBreak::HighestLoanRank
                            && event.loan_rank > current.loan_rank
                    }
                };
                if replace {
                    slot.insert(idx);
                }
            }
        }
    }

    latest
}

/// Events that lost to their user's winner on the tie-break alone. A tie at an
/// instant some later event superseded is not counted.
fn count_ties(events: &[LoanEvent], latest: &HashMap<&UserId, usize>) -> usize {
    events
        .iter()
        .enumerate()
        .filter(|(idx, event)| {
            latest.get(&event.user_id).is_some_and(|&winner| {
                winner != *idx && events[winner].created_at == event.created_at
            })
        })
        .count()
}

/// Partition current states on `loan_status == "defaulted"`. Order within each
/// cohort follows `states`.
pub fn split_cohorts(states: &[CurrentLoanState]) -> Cohorts {
    let (defaulted, not_defaulted): (Vec<_>, Vec<_>) = states
        .iter()
        .cloned()
        .partition(|state| Cohort::of(state) == Cohort::Defaulted);

    log::info!(
        "split {} borrowers into {} defaulted and {} not defaulted",
        states.len(),
        defaulted.len(),
        not_defaulted.len()
    );

    Cohorts {
        defaulted,
        not_defaulted,
    }
}

/// Group `cohort` by `group_key` and summarise `value_field` with `op`.
///
/// Rows without a key or without a value do not contribute. A group that ends
/// up with no contributing rows is left out of the table entirely.
pub fn aggregate(
    cohort: &[CurrentLoanState],
    group_key: &GroupKey,
    value_field: ValueField,
    op: AggregateOp,
) -> AggregateTable {
    let mut groups: BTreeMap<GroupValue, (usize, f64)> = BTreeMap::new();

    for state in cohort {
        let (Some(key), Some(value)) = (group_key.value_of(state), state.value(value_field)) else {
            continue;
        };
        let entry = groups.entry(key).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += value;
    }

    let rows = groups
        .into_iter()
        .map(|(key, (count, sum))| {
            let statistic = match op {
                AggregateOp::Mean => sum / count as f64,
                AggregateOp::Count => count as f64,
            };
            (key, statistic)
        })
        .collect();

    AggregateTable {
        group_column: group_key.column_name(),
        value_field,
        op,
        rows,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedTable {
    pub name: String,
    pub table: AggregateTable,
}

#[derive(Debug, Clone)]
pub struct LoanAnalysis {
    pub total_events: usize,
    pub current_states: Vec<CurrentLoanState>,
    pub cohorts: Cohorts,
    pub tables: Vec<NamedTable>,
    pub credit_score_by_status: Vec<GroupSummary>,
}

impl LoanAnalysis {
    pub fn table(&self, name: &str) -> Option<&AggregateTable> {
        self.tables.iter().find(|t| t.name == name).map(|t| &t.table)
    }
}

pub struct LoanAnalyzer {
    pub tie_break: TieBreak,
    pub credit_score_schemes: Vec<BucketScheme>,
}

impl LoanAnalyzer {
    pub fn new(tie_break: TieBreak, credit_score_schemes: Vec<BucketScheme>) -> Self {
        Self {
            tie_break,
            credit_score_schemes,
        }
    }

    /// Named schemes first, then the custom ones in config order. Scheme names
    /// become table names, so they must be unique.
    pub fn from_config(config: &Config) -> Result<Self, BucketSchemeError> {
        let mut schemes: Vec<BucketScheme> = config
            .credit_score_schemes
            .iter()
            .map(BucketSchemeKind::scheme)
            .collect();
        for custom in &config.custom_credit_score_schemes {
            schemes.push(custom.build()?);
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = schemes.iter().find(|scheme| !seen.insert(scheme.name())) {
            return Err(BucketSchemeError::DuplicateName {
                name: duplicate.name().to_string(),
            });
        }

        Ok(Self::new(config.tie_break, schemes))
    }

    /// Run every stage after loading and collect the standard report tables.
    pub fn analyze(&self, events: &[LoanEvent]) -> LoanAnalysis {
        // Step 1: one current state per borrower
        let current_states = resolve_current_with(events, self.tie_break);

        // Step 2: outcome cohorts
        let cohorts = split_cohorts(&current_states);

        // Step 3: aggregate tables
        let mut tables = Vec::new();
        let mut push = |name: &str, table: AggregateTable| {
            tables.push(NamedTable {
                name: name.to_string(),
                table,
            })
        };
        let by_rank = |cohort: &[CurrentLoanState], field: ValueField, op: AggregateOp| {
            aggregate(cohort, &GroupKey::LoanRank, field, op)
        };

        push(
            "avg_credit_score_by_rank_non_defaulters",
            by_rank(&cohorts.not_defaulted, ValueField::CreditScore, AggregateOp::Mean),
        );
        push(
            "avg_credit_score_by_rank",
            by_rank(&current_states, ValueField::CreditScore, AggregateOp::Mean),
        );
        push(
            "avg_amount_by_rank_non_defaulters",
            by_rank(&cohorts.not_defaulted, ValueField::AmountDisbursed, AggregateOp::Mean),
        );
        push(
            "rank_count_defaulters",
            by_rank(&cohorts.defaulted, ValueField::LoanRank, AggregateOp::Count),
        );
        push(
            "rank_count_non_defaulters",
            by_rank(&cohorts.not_defaulted, ValueField::LoanRank, AggregateOp::Count),
        );
        for scheme in &self.credit_score_schemes {
            push(
                &format!("default_count_by_credit_range_{}", scheme.name()),
                aggregate(
                    &cohorts.defaulted,
                    &GroupKey::CreditScoreBucket(scheme.clone()),
                    ValueField::CreditScore,
                    AggregateOp::Count,
                ),
            );
        }

        // Step 4: distribution of scores per status
        let credit_score_by_status =
            describe(&current_states, &GroupKey::LoanStatus, ValueField::CreditScore);

        LoanAnalysis {
            total_events: events.len(),
            current_states,
            cohorts,
            tables,
            credit_score_by_status,
        }
    }
}
