use std::path::Path;

use schedrs::config;
use schedrs::model::Model;
use schedrs::solver::{Placement, Scheduler, SolveOptions};

/// End-to-end over the shipped sample preset: load, build, solve, check the
/// headline invariants of the allocation.
#[test]
fn tiny_x_preset_solves() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("presets/tiny-x");
    let preset = config::load_preset(&dir).unwrap();
    let model = Model::from_preset(preset).unwrap();
    let servers = model.servers.len();

    let placement = Scheduler::new(model)
        .solve(&SolveOptions::default())
        .unwrap();
    let Placement::Solved(report) = placement else {
        panic!("sample preset must be feasible");
    };

    // One server is reserved for redundancy.
    assert!(report.servers_used <= servers - 1);

    // The redundant api process lands in both of its locations.
    let api_locations: Vec<&str> = report
        .allocation
        .servers
        .iter()
        .flat_map(|s| s.processes.iter())
        .filter(|p| p.name == "api")
        .map(|p| p.location.as_str())
        .collect();
    assert!(api_locations.contains(&"eu-west"));
    assert!(api_locations.contains(&"us-east"));

    // The cache follows an api replica onto the same host.
    let cache_hosts: Vec<&str> = report
        .allocation
        .servers
        .iter()
        .filter(|s| s.processes.iter().any(|p| p.name == "cache"))
        .map(|s| s.name.as_str())
        .collect();
    for host in cache_hosts {
        let srv = report
            .allocation
            .servers
            .iter()
            .find(|s| s.name == host)
            .unwrap();
        assert!(srv.processes.iter().any(|p| p.name == "api"));
    }
}
