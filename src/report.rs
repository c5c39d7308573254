//! Post-solve extraction: the allocation record, per-server utilization and
//! cost accounting, and the soft-limit checks.
//!
//! The reporting cost model (`energy × energy_cost × 24`) intentionally
//! differs from the constraint-time linear estimate; the report is
//! authoritative for output, the constraint model for feasibility, and any
//! disagreement surfaces as a budget warning here.

use good_lp::Solution;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{LocationPolicy, Model};
use crate::variables::DecisionVariables;

const UNKNOWN_LOCATION: &str = "Unknown";

/// One placed replica as reported to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedReplica {
    pub name: String,
    pub replica: u32,
    pub location: String,
}

/// All replicas hosted by one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerAllocation {
    pub name: String,
    pub processes: Vec<PlacedReplica>,
}

/// The normalized allocation record, serializable as YAML:
/// `{servers: [{name, processes: [{name, replica, location}]}]}`.
/// Servers appear in model order; idle servers are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub servers: Vec<ServerAllocation>,
}

/// Resource accounting for one server after the solve.
#[derive(Debug, Clone, Serialize)]
pub struct ServerUtilization {
    pub name: String,
    pub ram_used: f64,
    pub ram_total: f64,
    pub ram_percent: f64,
    pub cpu_used: f64,
    pub cpu_total: f64,
    pub cpu_percent: f64,
    pub disk_used: f64,
    pub disk_total: f64,
    pub disk_percent: f64,
    pub bandwidth_used: f64,
    pub bandwidth_total: f64,
    pub bandwidth_percent: f64,
    pub process_count: u32,
    /// Daily energy consumption in kWh.
    pub energy: f64,
    /// Daily energy cost; zero for servers without an energy price.
    pub cost: f64,
    pub green: bool,
    pub location: Option<String>,
}

/// Everything extracted from a successful solve. Outlives the solver.
#[derive(Debug)]
pub struct SolveReport {
    pub allocation: Allocation,
    pub utilization: Vec<ServerUtilization>,
    pub total_daily_cost: f64,
    pub servers_used: usize,
}

#[derive(Default, Clone, Copy)]
struct Usage {
    ram: f64,
    cpu: f64,
    disk: f64,
    bandwidth: f64,
    count: u32,
}

/// Read the assignment out of the solver and build the report.
pub fn extract<S: Solution>(model: &Model, dv: &DecisionVariables, solution: &S) -> SolveReport {
    let mut placed: Vec<Vec<PlacedReplica>> = vec![Vec::new(); model.servers.len()];
    let mut usage = vec![Usage::default(); model.servers.len()];

    for (p_idx, process) in model.processes.iter().enumerate() {
        let base = process.replicas;
        for r in 0..process.effective_replicas() {
            for (s_idx, server) in model.servers.iter().enumerate() {
                if solution.value(dv.placements[p_idx][r][s_idx]) <= 0.5 {
                    continue;
                }
                // Redundant chunks restart numbering per location.
                let replica = if process.policy == LocationPolicy::Redundant {
                    (r as u32 % base) + 1
                } else {
                    r as u32 + 1
                };
                let location = server
                    .location
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_LOCATION.into());
                info!(
                    process = %process.name,
                    replica,
                    server = %server.name,
                    location = %location,
                    "placement"
                );
                placed[s_idx].push(PlacedReplica {
                    name: process.name.clone(),
                    replica,
                    location,
                });

                let u = &mut usage[s_idx];
                u.ram += process.ram;
                u.cpu += server.cpu_demand(process);
                u.disk += process.disk;
                u.bandwidth += process.bandwidth;
                u.count += 1;
            }
        }
    }

    let allocation = Allocation {
        servers: model
            .servers
            .iter()
            .zip(placed)
            .filter(|(_, replicas)| !replicas.is_empty())
            .map(|(server, replicas)| ServerAllocation {
                name: server.name.clone(),
                processes: replicas,
            })
            .collect(),
    };

    let utilization: Vec<ServerUtilization> = model
        .servers
        .iter()
        .zip(&usage)
        .map(|(server, u)| {
            let energy = (u.cpu * 24.0 + u.ram * 5.0) / 1000.0;
            let cost = server
                .energy_cost
                .map_or(0.0, |energy_cost| energy * energy_cost * 24.0);
            ServerUtilization {
                name: server.name.clone(),
                ram_used: u.ram,
                ram_total: server.ram,
                ram_percent: percent(u.ram, server.ram),
                cpu_used: u.cpu,
                cpu_total: server.cpu,
                cpu_percent: percent(u.cpu, server.cpu),
                disk_used: u.disk,
                disk_total: server.disk,
                disk_percent: percent(u.disk, server.disk),
                bandwidth_used: u.bandwidth,
                bandwidth_total: server.bandwidth,
                bandwidth_percent: percent(u.bandwidth, server.bandwidth),
                process_count: u.count,
                energy,
                cost,
                green: server.green_energy,
                location: server.location.clone(),
            }
        })
        .collect();

    let total_daily_cost: f64 = utilization.iter().map(|u| u.cost).sum();
    let servers_used = usage.iter().filter(|u| u.count > 0).count();

    soft_limit_checks(model, &utilization, total_daily_cost, servers_used);
    summary(model, &utilization, total_daily_cost, servers_used);

    SolveReport {
        allocation,
        utilization,
        total_daily_cost,
        servers_used,
    }
}

fn percent(used: f64, total: f64) -> f64 {
    if total > 0.0 { used / total * 100.0 } else { 0.0 }
}

/// Post-hoc checks on limits the constraint model only approximates. These
/// warn, never fail.
fn soft_limit_checks(
    model: &Model,
    utilization: &[ServerUtilization],
    total_daily_cost: f64,
    servers_used: usize,
) {
    if let Some(budget) = model.constraints.max_daily_cost
        && total_daily_cost > budget
    {
        warn!(
            total_daily_cost,
            budget,
            "reported daily cost exceeds the budget constraint; the \
             constraint-time estimate and the reported cost use different \
             models, consider tightening max-daily-cost"
        );
    }

    let reserve = model.constraints.servers_for_redundancy;
    if reserve > 0 {
        let idle = utilization.len() - servers_used;
        if idle < reserve {
            warn!(idle, reserve, "fewer idle servers than requested for redundancy");
        } else {
            info!(idle, reserve, "server redundancy satisfied");
        }
    }
}

fn summary(
    model: &Model,
    utilization: &[ServerUtilization],
    total_daily_cost: f64,
    servers_used: usize,
) {
    let ram_used: f64 = utilization.iter().map(|u| u.ram_used).sum();
    let ram_total: f64 = utilization.iter().map(|u| u.ram_total).sum();
    let cpu_used: f64 = utilization.iter().map(|u| u.cpu_used).sum();
    let cpu_total: f64 = utilization.iter().map(|u| u.cpu_total).sum();
    let replicas: u32 = utilization.iter().map(|u| u.process_count).sum();
    let green_used = utilization
        .iter()
        .filter(|u| u.green && u.process_count > 0)
        .count();
    info!(
        replicas,
        servers_used,
        servers = model.servers.len(),
        ram_used,
        ram_total,
        cpu_used,
        cpu_total,
        green_used,
        total_daily_cost,
        "allocation summary"
    );
}
