//! Policy → workload matching.
//!
//! Namespace equality plus a label subset check. No wildcards, no negative
//! selectors, no set-based operators; new selector forms belong here, not at
//! call sites.

use crate::types::{PolicyRecord, WorkloadRecord};

/// Whether `workload` falls under `policy`.
///
/// Every selector pair must be present on the workload with an equal value.
/// Extra workload labels are ignored, so an empty selector matches every
/// workload in the target namespace.
pub fn matches(policy: &PolicyRecord, workload: &WorkloadRecord) -> bool {
    workload.namespace == policy.target_namespace
        && policy
            .label_selector
            .iter()
            .all(|(key, value)| workload.labels.get(key) == Some(value))
}

/// All workloads in `workloads` matched by `policy`, in input order.
pub fn match_set<'a>(
    policy: &PolicyRecord,
    workloads: &'a [WorkloadRecord],
) -> Vec<&'a WorkloadRecord> {
    workloads.iter().filter(|w| matches(policy, w)).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn subset_selector_matches_superset_labels() {
        let policy = PolicyRecord::new("p", "prod", labels(&[("tier", "web")]), Duration::from_secs(20));
        let workload = WorkloadRecord::new("prod", "a", labels(&[("tier", "web"), ("env", "x")]));
        assert!(matches(&policy, &workload));
    }

    #[test]
    fn namespace_is_exact() {
        let policy = PolicyRecord::new("p", "prod", HashMap::new(), Duration::from_secs(20));
        assert!(!matches(&policy, &WorkloadRecord::new("production", "a", HashMap::new())));
        assert!(!matches(&policy, &WorkloadRecord::new("", "a", HashMap::new())));
    }
}
