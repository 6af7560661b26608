use crate::analyzer::{GroupKey, GroupValue};
use crate::models::{CurrentLoanState, ValueField};
use std::collections::BTreeMap;

/// Distribution of one value field inside one group, the numbers behind a box
/// plot.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: GroupValue,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Summarise `value_field` per `group_key` over `states`, keys ascending.
/// Groups without a single non-null value are omitted.
pub fn describe(
    states: &[CurrentLoanState],
    group_key: &GroupKey,
    value_field: ValueField,
) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<GroupValue, Vec<f64>> = BTreeMap::new();
    for state in states {
        if let (Some(key), Some(value)) = (group_key.value_of(state), state.value(value_field)) {
            groups.entry(key).or_default().push(value);
        }
    }

    groups
        .into_iter()
        .map(|(key, mut values)| {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let count = values.len();
            GroupSummary {
                key,
                count,
                mean: values.iter().sum::<f64>() / count as f64,
                min: values[0],
                q1: quantile(&values, 0.25),
                median: quantile(&values, 0.5),
                q3: quantile(&values, 0.75),
                max: values[count - 1],
            }
        })
        .collect()
}

/// Linear interpolation between the closest ranks of a sorted, non-empty
/// slice.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;
    use chrono::NaiveDateTime;

    fn state(status: &str, score: Option<f64>) -> CurrentLoanState {
        CurrentLoanState {
            user_id: UserId::new("1"),
            created_at: NaiveDateTime::default(),
            loan_rank: Some(1),
            credit_score: score,
            amount_disbursed: None,
            loan_status: Some(status.to_string()),
            loan_tenure: None,
        }
    }

    #[test]
    fn quantiles_interpolate() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.0), 1.0);
        assert_eq!(quantile(&values, 0.25), 1.75);
        assert_eq!(quantile(&values, 0.5), 2.5);
        assert_eq!(quantile(&values, 1.0), 4.0);
        assert_eq!(quantile(&[7.0], 0.75), 7.0);
    }

    #[test]
    fn describes_each_status() {
        let states = vec![
            state("defaulted", Some(400.0)),
            state("active", Some(700.0)),
            state("defaulted", Some(500.0)),
            state("active", None),
            state("defaulted", Some(300.0)),
        ];
        let summary = describe(&states, &GroupKey::LoanStatus, ValueField::CreditScore);

        assert_eq!(summary.len(), 2);
        let active = &summary[0];
        assert_eq!(active.key, GroupValue::Status("active".to_string()));
        assert_eq!(active.count, 1);
        assert_eq!(active.median, 700.0);

        let defaulted = &summary[1];
        assert_eq!(defaulted.count, 3);
        assert_eq!(defaulted.min, 300.0);
        assert_eq!(defaulted.q1, 350.0);
        assert_eq!(defaulted.median, 400.0);
        assert_eq!(defaulted.q3, 450.0);
        assert_eq!(defaulted.max, 500.0);
        assert_eq!(defaulted.mean, 400.0);
    }

    #[test]
    fn nothing_to_describe() {
        assert!(describe(&[], &GroupKey::LoanRank, ValueField::CreditScore).is_empty());
        let states = vec![state("active", None)];
        assert!(describe(&states, &GroupKey::LoanStatus, ValueField::CreditScore).is_empty());
    }
}
