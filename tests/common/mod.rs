#![allow(dead_code)]

use schedrs::model::{Constraints, LocationPolicy, Model, Process, Server};
use schedrs::report::SolveReport;
use schedrs::solver::{Placement, Scheduler, SolveOptions};

pub fn server(name: &str, ram: f64, cpu: f64) -> Server {
    Server {
        name: name.into(),
        ram,
        cpu,
        disk: 1000.0,
        bandwidth: 1000.0,
        location: None,
        os: None,
        process_scope: vec![],
        green_energy: false,
        energy_cost: None,
    }
}

pub fn server_in(name: &str, ram: f64, cpu: f64, location: &str) -> Server {
    Server {
        location: Some(location.into()),
        ..server(name, ram, cpu)
    }
}

pub fn process(name: &str, ram: f64) -> Process {
    Process {
        name: name.into(),
        ram,
        disk: 1.0,
        bandwidth: 1.0,
        cpu: None,
        replicas: 1,
        locations: vec![],
        policy: LocationPolicy::None,
        os: None,
        scope: None,
        affinity: vec![],
        non_affinity: vec![],
        critical: false,
    }
}

pub fn model(servers: Vec<Server>, processes: Vec<Process>) -> Model {
    Model {
        servers,
        processes,
        constraints: Constraints::default(),
    }
}

pub fn solve(model: Model) -> Placement {
    Scheduler::new(model)
        .solve(&SolveOptions::default())
        .expect("solver failed")
}

/// Solve and panic unless a feasible assignment exists.
pub fn solved(model: Model) -> SolveReport {
    match solve(model) {
        Placement::Solved(report) => report,
        Placement::Infeasible => panic!("expected a feasible model"),
    }
}

pub fn infeasible(model: Model) -> bool {
    matches!(solve(model), Placement::Infeasible)
}

/// Flatten an allocation into (process, replica, server) triples.
pub fn placements(report: &SolveReport) -> Vec<(String, u32, String)> {
    report
        .allocation
        .servers
        .iter()
        .flat_map(|s| {
            s.processes
                .iter()
                .map(|p| (p.name.clone(), p.replica, s.name.clone()))
        })
        .collect()
}

/// Servers hosting at least one replica of the named process.
pub fn hosts_of(report: &SolveReport, process: &str) -> Vec<String> {
    placements(report)
        .into_iter()
        .filter(|(name, _, _)| name == process)
        .map(|(_, _, server)| server)
        .collect()
}
