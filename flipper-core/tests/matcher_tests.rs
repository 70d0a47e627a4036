//! Parameterised matcher and canonical-key tests for `flipper-core`.

use std::collections::HashMap;
use std::time::Duration;

use flipper_core::{matches, match_set, PolicyRecord, WorkloadRecord};
use rstest::rstest;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn policy(ns: &str, selector: &[(&str, &str)]) -> PolicyRecord {
    PolicyRecord::new("web-restarts", ns, labels(selector), Duration::from_secs(20))
}

fn workload(ns: &str, name: &str, pairs: &[(&str, &str)]) -> WorkloadRecord {
    WorkloadRecord::new(ns, name, labels(pairs))
}

// ---------------------------------------------------------------------------
// 1. Subset matching
// ---------------------------------------------------------------------------

#[rstest]
#[case(&[("tier", "web")], &[("tier", "web")], true)]
#[case(&[("tier", "web")], &[("tier", "web"), ("env", "x")], true)]
#[case(&[("tier", "web"), ("env", "x")], &[("tier", "web"), ("env", "x"), ("zone", "a")], true)]
#[case(&[("tier", "web")], &[("tier", "api")], false)]
#[case(&[("tier", "web")], &[("role", "web")], false)]
#[case(&[("tier", "web"), ("env", "x")], &[("tier", "web")], false)]
#[case(&[("tier", "web"), ("env", "x")], &[("tier", "web"), ("env", "y")], false)]
#[case(&[("tier", "web")], &[], false)]
fn selector_is_a_subset_constraint(
    #[case] selector: &[(&str, &str)],
    #[case] workload_labels: &[(&str, &str)],
    #[case] expected: bool,
) {
    let p = policy("prod", selector);
    let w = workload("prod", "a", workload_labels);
    assert_eq!(matches(&p, &w), expected);
}

#[rstest]
#[case("prod", true)]
#[case("stage", false)]
#[case("Prod", false)]
#[case("", false)]
fn empty_selector_matches_whole_namespace_only(#[case] ns: &str, #[case] expected: bool) {
    let p = policy("prod", &[]);
    let w = workload(ns, "anything", &[("tier", "web"), ("env", "x")]);
    assert_eq!(matches(&p, &w), expected);
}

#[test]
fn end_to_end_fixture_match_set() {
    let p = policy("prod", &[("tier", "web")]);
    let workloads = vec![
        workload("prod", "a", &[("tier", "web")]),
        workload("prod", "b", &[("tier", "api")]),
        workload("stage", "c", &[("tier", "web")]),
    ];
    let names: Vec<String> = match_set(&p, &workloads)
        .into_iter()
        .map(|w| w.key().to_string())
        .collect();
    assert_eq!(names, vec!["prod.a"]);
}

// ---------------------------------------------------------------------------
// 2. Canonical keys
// ---------------------------------------------------------------------------

#[test]
fn canonical_key_is_independent_of_insertion_order() {
    let pairs = [("tier", "web"), ("app", "shop"), ("env", "x"), ("zone", "eu-1")];
    let expected = policy("prod", &pairs).canonical_key();

    // Every rotation and its reverse; each builds a fresh HashMap with its
    // own hasher state, so iteration order differs between them too.
    for shift in 0..pairs.len() {
        let mut rotated = pairs.to_vec();
        rotated.rotate_left(shift);
        assert_eq!(policy("prod", &rotated).canonical_key(), expected);
        rotated.reverse();
        assert_eq!(policy("prod", &rotated).canonical_key(), expected);
    }
    assert_eq!(expected.0, "prod|app=shop,env=x,tier=web,zone=eu-1");
}

#[rstest]
#[case("prod", &[("tier", "web")], "stage", &[("tier", "web")])]
#[case("prod", &[("tier", "web")], "prod", &[("tier", "api")])]
#[case("prod", &[("tier", "web")], "prod", &[])]
#[case("prod", &[("a", "1"), ("b", "2")], "prod", &[("a", "1")])]
#[case("prod", &[("a", "1,b=2")], "prod", &[("a", "1"), ("b", "2")])]
#[case("prod", &[("a=1", "x")], "prod", &[("a", "1=x")])]
#[case("prod|a=1", &[], "prod", &[("a", "1")])]
fn different_content_gives_different_keys(
    #[case] ns_a: &str,
    #[case] sel_a: &[(&str, &str)],
    #[case] ns_b: &str,
    #[case] sel_b: &[(&str, &str)],
) {
    assert_ne!(policy(ns_a, sel_a).canonical_key(), policy(ns_b, sel_b).canonical_key());
}

#[test]
fn separators_inside_labels_are_escaped() {
    let key = policy("prod", &[("a", "1,b=2")]).canonical_key();
    assert_eq!(key.0, r"prod|a=1\,b\=2");
}

#[test]
fn canonical_key_ignores_policy_name_and_interval() {
    let a = PolicyRecord::new("a", "prod", labels(&[("tier", "web")]), Duration::from_secs(20));
    let b = PolicyRecord::new("b", "prod", labels(&[("tier", "web")]), Duration::from_secs(60));
    assert_eq!(a.canonical_key(), b.canonical_key());
}
