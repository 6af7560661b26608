//! End-to-end runs from CSV text through every pipeline stage.

use loan_cohort_analyzer::{
    aggregate, load, resolve_current, split_cohorts, AggregateOp, BucketScheme, GroupKey,
    GroupValue, LoanAnalyzer, LoanEvent, PipelineError, RawTable, TieBreak, UserId, ValueField,
};
use std::collections::{HashMap, HashSet};

const EXPORT: &str = "\
USER_ID,CREATED_AT,USER_LOAN_RANK,CREDIT_SCORE,AMOUNT_DISBURSED,LOAN_STATUS
101,2024-01-01 09:00:00,1,0.61,5000,closed
101,2024-02-01 09:00:00,2,0.58,7000,defaulted
102,2024-01-15 12:30:00,1,0.72,3000,active
103,2024-03-01,1,0.45,2500,closed
103,2024-04-10,2,0.47,4000,active
103,2024-04-10,3,0.49,4500,defaulted
104,2024-02-20T08:00:00,1,,1500,defaulted
105,2024-05-05 10:00,4,0.91,9000,Defaulted
";

fn events() -> Vec<LoanEvent> {
    let table = RawTable::from_csv_reader(EXPORT.as_bytes()).expect("valid csv");
    load(&table).expect("valid export")
}

#[test]
fn one_current_state_per_distinct_user() {
    let events = events();
    let distinct: HashSet<_> = events.iter().map(|e| e.user_id.clone()).collect();
    let states = resolve_current(&events);

    assert_eq!(states.len(), distinct.len());
    let resolved: HashSet<_> = states.iter().map(|s| s.user_id.clone()).collect();
    assert_eq!(resolved, distinct);
}

#[test]
fn current_state_carries_the_latest_timestamp_and_is_an_input_row() {
    let events = events();
    let mut latest = HashMap::new();
    for event in &events {
        let entry = latest.entry(event.user_id.clone()).or_insert(event.created_at);
        if event.created_at > *entry {
            *entry = event.created_at;
        }
    }

    for state in resolve_current(&events) {
        assert_eq!(state.created_at, latest[&state.user_id]);
        assert!(events.contains(&state));
    }
}

#[test]
fn resolution_is_deterministic() {
    let events = events();
    assert_eq!(resolve_current(&events), resolve_current(&events));
}

#[test]
fn same_instant_rows_resolve_by_configured_rule() {
    let events = events();

    let by_order = resolve_current(&events);
    let user_103 = by_order.iter().find(|s| s.user_id.as_str() == "103").unwrap();
    assert_eq!(user_103.loan_rank, Some(2));
    assert_eq!(user_103.loan_status.as_deref(), Some("active"));

    let by_rank = loan_cohort_analyzer::resolve_current_with(&events, TieBreak::HighestLoanRank);
    let user_103 = by_rank.iter().find(|s| s.user_id.as_str() == "103").unwrap();
    assert_eq!(user_103.loan_rank, Some(3));
    assert!(user_103.is_defaulted());
}

#[test]
fn cohorts_are_a_total_disjoint_partition() {
    let states = resolve_current(&events());
    let cohorts = split_cohorts(&states);

    assert_eq!(cohorts.defaulted.len() + cohorts.not_defaulted.len(), states.len());
    let user_ids = |cohort: &[LoanEvent]| -> HashSet<UserId> {
        cohort.iter().map(|s| s.user_id.clone()).collect()
    };
    let defaulted = user_ids(&cohorts.defaulted);
    let not_defaulted = user_ids(&cohorts.not_defaulted);
    assert!(defaulted.is_disjoint(&not_defaulted));

    let ids = |set: &HashSet<UserId>| {
        let mut ids: Vec<String> = set.iter().map(|id| id.to_string()).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&defaulted), vec!["101", "104"]);
    // "Defaulted" is not the defaulted status
    assert_eq!(ids(&not_defaulted), vec!["102", "103", "105"]);
}

#[test]
fn standard_analysis_over_export() {
    let schemes = vec![BucketScheme::normalized_credit_score_percent()];
    let analysis = LoanAnalyzer::new(TieBreak::InputOrder, schemes).analyze(&events());

    assert_eq!(analysis.total_events, 8);
    assert_eq!(analysis.current_states.len(), 5);

    let ranks = analysis.table("rank_count_defaulters").unwrap();
    assert_eq!(ranks.rows(), &[(GroupValue::Rank(1), 1.0), (GroupValue::Rank(2), 1.0)]);

    // user 104 has no score, so only 101 lands in a range
    let ranges = analysis
        .table("default_count_by_credit_range_normalized_percent")
        .unwrap();
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges.rows()[0].0.to_string(), "Poor");
    assert!(analysis.table("default_count_by_credit_range_absolute").is_none());

    let means = analysis.table("avg_credit_score_by_rank_non_defaulters").unwrap();
    assert_eq!(means.get(&GroupValue::Rank(1)), Some(0.72));
    assert_eq!(means.get(&GroupValue::Rank(2)), Some(0.47));
    assert_eq!(means.get(&GroupValue::Rank(4)), Some(0.91));
}

#[test]
fn aggregating_twice_gives_the_same_table() {
    let cohorts = split_cohorts(&resolve_current(&events()));
    let mean_amount = || {
        aggregate(
            &cohorts.not_defaulted,
            &GroupKey::LoanRank,
            ValueField::AmountDisbursed,
            AggregateOp::Mean,
        )
    };
    assert_eq!(mean_amount(), mean_amount());
}

#[test]
fn header_only_export_yields_empty_outputs() {
    let table = RawTable::from_csv_reader(EXPORT.lines().next().unwrap().as_bytes()).unwrap();
    let events = load(&table).unwrap();
    assert!(events.is_empty());

    let analysis = LoanAnalyzer::new(TieBreak::InputOrder, Vec::new()).analyze(&events);
    assert!(analysis.current_states.is_empty());
    assert!(analysis.cohorts.defaulted.is_empty());
    assert!(analysis.cohorts.not_defaulted.is_empty());
    assert!(analysis.tables.iter().all(|t| t.table.is_empty()));
    assert!(analysis.credit_score_by_status.is_empty());
}

#[test]
fn missing_required_column_aborts_before_rows() {
    let csv = "created_at,loan_rank,credit_score,amount_disbursed,loan_status\n\
               broken,1,1,1,active\n";
    let table = RawTable::from_csv_reader(csv.as_bytes()).unwrap();
    match load(&table) {
        Err(PipelineError::Schema { column }) => assert_eq!(column, "user_id"),
        other => panic!("expected schema error, got {:?}", other),
    }
}

#[test]
fn unparseable_timestamp_aborts_the_whole_load() {
    let csv = "user_id,created_at,loan_rank,credit_score,amount_disbursed,loan_status\n\
               1,2024-01-01,1,0.5,100,active\n\
               2,31/31/2024,1,0.5,100,active\n";
    let table = RawTable::from_csv_reader(csv.as_bytes()).unwrap();
    let err = load(&table).unwrap_err();
    assert_eq!(err.to_string(), "Row 2: cannot parse created_at value '31/31/2024'");
}
