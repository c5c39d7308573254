mod common;

use common::{model, placements, process, server_in, solved};
use schedrs::model::LocationPolicy;
use schedrs::report::Allocation;

fn richer_model() -> schedrs::model::Model {
    let mut api = process("api", 4.0);
    api.replicas = 2;
    api.policy = LocationPolicy::Single;
    let mut cache = process("cache", 2.0);
    cache.affinity = vec!["api".into()];
    model(
        vec![
            server_in("s1", 16.0, 4.0, "eu"),
            server_in("s2", 16.0, 4.0, "eu"),
            server_in("s3", 16.0, 4.0, "us"),
        ],
        vec![api, cache, process("batch", 3.0)],
    )
}

#[test]
fn allocation_survives_a_yaml_round_trip() {
    let report = solved(richer_model());
    let yaml = serde_yaml::to_string(&report.allocation).unwrap();
    let parsed: Allocation = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed, report.allocation);
}

#[test]
fn identical_inputs_yield_identical_allocations() {
    let first = solved(richer_model());
    let second = solved(richer_model());
    assert_eq!(first.allocation, second.allocation);
    assert_eq!(placements(&first), placements(&second));
}
