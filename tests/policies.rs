mod common;

use common::{hosts_of, infeasible, model, placements, process, server, server_in, solved};
use schedrs::model::LocationPolicy;

#[test]
fn location_filter_restricts_candidate_servers() {
    let mut p = process("p", 2.0);
    p.locations = vec!["A".into()];
    let report = solved(model(
        vec![server_in("a1", 16.0, 4.0, "A"), server_in("b1", 16.0, 4.0, "B")],
        vec![p],
    ));
    assert_eq!(hosts_of(&report, "p"), vec!["a1".to_string()]);
}

#[test]
fn single_policy_spreads_replicas_across_servers() {
    let mut p = process("p", 2.0);
    p.policy = LocationPolicy::Single;
    p.replicas = 2;
    let report = solved(model(
        vec![server("s1", 16.0, 4.0), server("s2", 16.0, 4.0)],
        vec![p],
    ));
    let mut hosts = hosts_of(&report, "p");
    hosts.sort_unstable();
    assert_eq!(hosts.len(), 2);
    assert_ne!(hosts[0], hosts[1]);
}

#[test]
fn os_mismatch_excludes_servers() {
    let mut linux = server("linux-host", 16.0, 4.0);
    linux.os = Some("linux".into());
    let mut windows = server("windows-host", 16.0, 4.0);
    windows.os = Some("windows".into());
    let mut p = process("p", 2.0);
    p.os = Some("linux".into());

    let report = solved(model(vec![windows, linux], vec![p]));
    assert_eq!(hosts_of(&report, "p"), vec!["linux-host".to_string()]);
}

#[test]
fn scope_must_be_offered_by_the_server() {
    let mut web = server("web", 16.0, 4.0);
    web.process_scope = vec!["web".into(), "cache".into()];
    let mut db = server("db", 16.0, 4.0);
    db.process_scope = vec!["database".into()];
    let mut p = process("p", 2.0);
    p.scope = Some("cache".into());

    let report = solved(model(vec![db, web], vec![p]));
    assert_eq!(hosts_of(&report, "p"), vec!["web".to_string()]);
}

#[test]
fn affine_process_shares_a_host_with_its_target() {
    let mut p = process("p", 2.0);
    p.affinity = vec!["q".into()];
    let report = solved(model(
        vec![server("s1", 16.0, 4.0), server("s2", 16.0, 4.0)],
        vec![p, process("q", 2.0)],
    ));
    assert_eq!(hosts_of(&report, "p"), hosts_of(&report, "q"));
}

#[test]
fn missing_affinity_target_is_ignored() {
    let mut p = process("p", 2.0);
    p.affinity = vec!["ghost".into()];
    let report = solved(model(vec![server("s1", 16.0, 4.0)], vec![p]));
    assert_eq!(placements(&report).len(), 1);
}

#[test]
fn critical_replicas_are_isolated_from_non_critical_ones() {
    let mut critical = process("db", 2.0);
    critical.critical = true;
    let mut m = model(
        vec![server("s1", 16.0, 4.0), server("s2", 16.0, 4.0)],
        vec![critical, process("web", 2.0)],
    );
    m.constraints.isolate_critical_processes = true;

    let report = solved(m);
    assert_ne!(hosts_of(&report, "db"), hosts_of(&report, "web"));
}

#[test]
fn forced_idle_servers_stay_empty() {
    let mut m = model(
        vec![
            server("s1", 16.0, 4.0),
            server("s2", 16.0, 4.0),
            server("s3", 16.0, 4.0),
        ],
        vec![process("p", 2.0)],
    );
    m.constraints.servers_for_redundancy = 2;

    let report = solved(m);
    assert_eq!(report.servers_used, 1);
}

#[test]
fn reserving_every_server_is_infeasible() {
    let mut m = model(vec![server("s1", 16.0, 4.0)], vec![process("p", 2.0)]);
    m.constraints.servers_for_redundancy = 1;
    assert!(infeasible(m));
}

#[test]
fn zero_process_cap_is_infeasible_for_nonempty_workload() {
    let mut m = model(vec![server("s1", 16.0, 4.0)], vec![process("p", 2.0)]);
    m.constraints.max_processes_per_server = Some(0);
    assert!(infeasible(m));
}

#[test]
fn percentage_caps_shrink_usable_capacity() {
    // Half of 10 GB is usable; a 6 GB process no longer fits.
    let mut m = model(vec![server("s1", 10.0, 4.0)], vec![process("p", 6.0)]);
    m.constraints.max_ram_pct = 50;
    assert!(infeasible(m));

    let mut m = model(vec![server("s1", 10.0, 4.0)], vec![process("p", 4.0)]);
    m.constraints.max_ram_pct = 50;
    let report = solved(m);
    assert_eq!(placements(&report).len(), 1);
    assert!(report.utilization[0].ram_percent <= 50.0);
}

#[test]
fn tight_budget_forces_the_cheap_server() {
    let mut pricey = server("pricey", 16.0, 4.0);
    pricey.energy_cost = Some(0.5);
    let mut cheap = server("cheap", 16.0, 4.0);
    cheap.energy_cost = Some(0.01);
    let mut p = process("p", 4.0);
    p.cpu = Some(2.0);

    let mut m = model(vec![pricey, cheap], vec![p]);
    // Placement on "pricey" costs ~89 cents in the constraint model; on
    // "cheap" about 1 cent.
    m.constraints.max_daily_cost = Some(0.05);

    let report = solved(m);
    assert_eq!(hosts_of(&report, "p"), vec!["cheap".to_string()]);
}

#[test]
fn energy_cap_bounds_per_server_consumption() {
    // One 8 GB process on a 16 GB / 4-core server draws 20 + ln(9) ≈ 22.2
    // units in the integer energy approximation.
    let mut m = model(vec![server("s1", 16.0, 4.0)], vec![process("p", 8.0)]);
    m.constraints.max_energy_per_server = Some(10.0);
    assert!(infeasible(m.clone()));

    m.constraints.max_energy_per_server = Some(30.0);
    assert_eq!(placements(&solved(m)).len(), 1);
}
