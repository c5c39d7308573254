//! Constraint families emitted into the placement problem.
//!
//! All families are additive and commutative; emission order only affects
//! which family a diagnostic points at. Every demand sum ranges over
//! effective replicas and is expressed in scaled integer units (see
//! [`crate::model::SCALE`]); coefficient magnitudes are checked against i64
//! before they reach the solver.

use good_lp::{Expression, SolverModel, constraint};
use tracing::{debug, warn};

use crate::model::{LoadBalancingStrategy, LocationPolicy, Model, Process, checked_i64, scaled,
                   scaled_capacity};
use crate::solver::SolveError;
use crate::variables::DecisionVariables;

/// Add every constraint family to `problem`.
pub fn apply<P: SolverModel>(
    mut problem: P,
    model: &Model,
    dv: &DecisionVariables,
) -> Result<P, SolveError> {
    problem = assignment_uniqueness(problem, model, dv);
    problem = location_filter(problem, model, dv);
    problem = redundancy_partition(problem, model, dv);
    problem = single_policy_distinctness(problem, model, dv);
    problem = os_compatibility(problem, model, dv);
    problem = scope_compatibility(problem, model, dv);
    problem = affinity(problem, model, dv);
    problem = anti_affinity(problem, model, dv);
    problem = capacity(problem, model, dv)?;
    problem = max_processes(problem, model, dv);
    problem = critical_isolation(problem, model, dv);
    problem = server_used_links(problem, model, dv);
    problem = energy_cap(problem, model, dv)?;
    problem = daily_cost_cap(problem, model, dv)?;
    problem = forced_idle(problem, model, dv);
    problem = strategy_links(problem, model, dv);
    Ok(problem)
}

/// Each effective replica lands on exactly one server.
fn assignment_uniqueness<P: SolverModel>(
    mut problem: P,
    model: &Model,
    dv: &DecisionVariables,
) -> P {
    for (p_idx, process) in model.processes.iter().enumerate() {
        for r in 0..process.effective_replicas() {
            let total: Expression = dv.placements[p_idx][r].iter().copied().sum();
            problem = problem.with(constraint!(total == 1));
        }
    }
    problem
}

/// Replicas of a location-restricted process may only land on servers whose
/// location is in the allowed set. Servers with no location never qualify.
fn location_filter<P: SolverModel>(mut problem: P, model: &Model, dv: &DecisionVariables) -> P {
    for (p_idx, process) in model.processes.iter().enumerate() {
        if process.locations.is_empty() {
            continue;
        }
        for (s_idx, server) in model.servers.iter().enumerate() {
            let allowed = server
                .location
                .as_deref()
                .is_some_and(|loc| process.locations.iter().any(|a| a == loc));
            if allowed {
                continue;
            }
            for r in 0..process.effective_replicas() {
                problem = problem.with(constraint!(dv.placements[p_idx][r][s_idx] == 0));
            }
        }
    }
    problem
}

/// Under the redundant policy, chunk i of `base` replicas lives entirely in
/// location L[i]: the chunk places exactly `base` replicas there, each of its
/// replicas exactly once within the location, on pairwise distinct servers.
///
/// The constraints are emitted even when a location has no servers; the model
/// is then infeasible, since the placement cannot honor the pinning.
fn redundancy_partition<P: SolverModel>(
    mut problem: P,
    model: &Model,
    dv: &DecisionVariables,
) -> P {
    for (p_idx, process) in model.processes.iter().enumerate() {
        if process.policy != LocationPolicy::Redundant || process.locations.is_empty() {
            continue;
        }
        let base = process.replicas as usize;
        debug!(
            process = %process.name,
            base,
            locations = process.locations.len(),
            "redundant policy expands replicas"
        );
        for (loc_idx, location) in process.locations.iter().enumerate() {
            let members = model.server_indices_in(location);
            let start = loc_idx * base;
            let end = start + base;

            let chunk_total: Expression = (start..end)
                .flat_map(|r| members.iter().map(move |&s| dv.placements[p_idx][r][s]))
                .sum();
            problem = problem.with(constraint!(chunk_total == base as f64));

            for r in start..end {
                let within: Expression =
                    members.iter().map(|&s| dv.placements[p_idx][r][s]).sum();
                problem = problem.with(constraint!(within == 1));
            }

            if base > 1 {
                for r1 in start..end {
                    for r2 in r1 + 1..end {
                        for s_idx in 0..model.servers.len() {
                            problem = problem.with(constraint!(
                                dv.placements[p_idx][r1][s_idx]
                                    + dv.placements[p_idx][r2][s_idx]
                                    <= 1
                            ));
                        }
                    }
                }
            }
        }
    }
    problem
}

/// Single policy with more than one replica: all on distinct servers.
fn single_policy_distinctness<P: SolverModel>(
    mut problem: P,
    model: &Model,
    dv: &DecisionVariables,
) -> P {
    for (p_idx, process) in model.processes.iter().enumerate() {
        let base = process.replicas as usize;
        if process.policy != LocationPolicy::Single || base <= 1 {
            continue;
        }
        for r1 in 0..base {
            for r2 in r1 + 1..base {
                for s_idx in 0..model.servers.len() {
                    problem = problem.with(constraint!(
                        dv.placements[p_idx][r1][s_idx] + dv.placements[p_idx][r2][s_idx] <= 1
                    ));
                }
            }
        }
    }
    problem
}

fn os_compatibility<P: SolverModel>(mut problem: P, model: &Model, dv: &DecisionVariables) -> P {
    for (p_idx, process) in model.processes.iter().enumerate() {
        let Some(process_os) = &process.os else {
            continue;
        };
        for (s_idx, server) in model.servers.iter().enumerate() {
            let incompatible = server.os.as_ref().is_some_and(|os| os != process_os);
            if !incompatible {
                continue;
            }
            for r in 0..process.effective_replicas() {
                problem = problem.with(constraint!(dv.placements[p_idx][r][s_idx] == 0));
            }
        }
    }
    problem
}

/// A scoped process only runs on servers whose scope set contains its scope.
/// Servers with an empty scope set accept everything.
fn scope_compatibility<P: SolverModel>(mut problem: P, model: &Model, dv: &DecisionVariables) -> P {
    for (p_idx, process) in model.processes.iter().enumerate() {
        let Some(scope) = &process.scope else {
            continue;
        };
        for (s_idx, server) in model.servers.iter().enumerate() {
            let rejects = !server.process_scope.is_empty()
                && !server.process_scope.iter().any(|s| s == scope);
            if !rejects {
                continue;
            }
            for r in 0..process.effective_replicas() {
                problem = problem.with(constraint!(dv.placements[p_idx][r][s_idx] == 0));
            }
        }
    }
    problem
}

/// Existential co-location: a replica on server s requires at least one
/// replica of some same-named partner process on s. Linearized as
/// `Σ partner-literals ≥ x`. This is *not* pairwise equality: only one
/// partner replica needs to share the host.
fn affinity<P: SolverModel>(mut problem: P, model: &Model, dv: &DecisionVariables) -> P {
    let by_name = model.process_indices_by_name();
    for (p_idx, process) in model.processes.iter().enumerate() {
        for target in &process.affinity {
            let Some(indices) = by_name.get(target.as_str()) else {
                warn!(
                    process = %process.name,
                    target = %target,
                    "affinity target does not exist, constraint ignored"
                );
                continue;
            };
            let partners: Vec<usize> = indices.iter().copied().filter(|&q| q != p_idx).collect();
            if partners.is_empty() {
                continue;
            }
            debug!(process = %process.name, target = %target, "affinity constraint");
            for r in 0..process.effective_replicas() {
                for s_idx in 0..model.servers.len() {
                    let partner_sum: Expression = partners
                        .iter()
                        .flat_map(|&q| dv.placements[q].iter().map(move |servers| servers[s_idx]))
                        .sum();
                    problem = problem
                        .with(constraint!(partner_sum >= dv.placements[p_idx][r][s_idx]));
                }
            }
        }
    }
    problem
}

/// Pairwise exclusion: no server hosts replicas of both processes. A process
/// naming itself is silently ignored.
fn anti_affinity<P: SolverModel>(mut problem: P, model: &Model, dv: &DecisionVariables) -> P {
    let by_name = model.process_indices_by_name();
    for (p_idx, process) in model.processes.iter().enumerate() {
        for target in &process.non_affinity {
            let Some(indices) = by_name.get(target.as_str()) else {
                warn!(
                    process = %process.name,
                    target = %target,
                    "non-affinity target does not exist, constraint ignored"
                );
                continue;
            };
            for &q_idx in indices.iter().filter(|&&q| q != p_idx) {
                for r1 in 0..process.effective_replicas() {
                    for r2 in 0..model.processes[q_idx].effective_replicas() {
                        for s_idx in 0..model.servers.len() {
                            problem = problem.with(constraint!(
                                dv.placements[p_idx][r1][s_idx]
                                    + dv.placements[q_idx][r2][s_idx]
                                    <= 1
                            ));
                        }
                    }
                }
            }
        }
    }
    problem
}

/// Scaled demand sum for one server, with per-process coefficients supplied
/// by `demand`. Checks both individual coefficients and the accumulated
/// magnitude against i64.
fn demand_sum(
    model: &Model,
    dv: &DecisionVariables,
    s_idx: usize,
    demand: impl Fn(&Process) -> Option<i64>,
    what: &str,
) -> Result<Expression, SolveError> {
    let overflow = || SolveError::Overflow {
        context: format!("{what} on server {}", model.servers[s_idx].name),
    };
    let mut magnitude: i64 = 0;
    let mut sum = Expression::default();
    for (p_idx, process) in model.processes.iter().enumerate() {
        let coefficient = demand(process).ok_or_else(overflow)?;
        for r in 0..process.effective_replicas() {
            magnitude = magnitude
                .checked_add(coefficient.abs())
                .ok_or_else(overflow)?;
            sum += dv.placements[p_idx][r][s_idx] * coefficient as f64;
        }
    }
    Ok(sum)
}

/// RAM, disk and bandwidth have fixed per-process demands; CPU demand depends
/// on the hosting server, so its coefficient is computed per (process,
/// server) pair. All four are capped by percentage of capacity.
fn capacity<P: SolverModel>(
    mut problem: P,
    model: &Model,
    dv: &DecisionVariables,
) -> Result<P, SolveError> {
    let c = &model.constraints;
    for (s_idx, server) in model.servers.iter().enumerate() {
        let caps: [(&str, f64, u32, fn(&Process) -> f64); 3] = [
            ("ram", server.ram, c.max_ram_pct, |p| p.ram),
            ("disk", server.disk, c.max_disk_pct, |p| p.disk),
            ("bandwidth", server.bandwidth, c.max_bandwidth_pct, |p| {
                p.bandwidth
            }),
        ];
        for (what, total, pct, demand) in caps {
            let usage = demand_sum(model, dv, s_idx, |p| scaled(demand(p)), what)?;
            let limit = scaled_capacity(total, pct).ok_or_else(|| SolveError::Overflow {
                context: format!("{what} capacity of server {}", server.name),
            })?;
            problem = problem.with(constraint!(usage <= limit as f64));
        }

        let cpu_usage = demand_sum(model, dv, s_idx, |p| scaled(server.cpu_demand(p)), "cpu")?;
        let cpu_limit =
            scaled_capacity(server.cpu, c.max_cpu_pct).ok_or_else(|| SolveError::Overflow {
                context: format!("cpu capacity of server {}", server.name),
            })?;
        problem = problem.with(constraint!(cpu_usage <= cpu_limit as f64));
    }
    Ok(problem)
}

fn max_processes<P: SolverModel>(mut problem: P, model: &Model, dv: &DecisionVariables) -> P {
    let Some(limit) = model.constraints.max_processes_per_server else {
        return problem;
    };
    for s_idx in 0..model.servers.len() {
        let count = dv.process_count(s_idx).clone();
        problem = problem.with(constraint!(count <= limit as f64));
    }
    problem
}

/// No server hosts both a critical and a non-critical replica.
fn critical_isolation<P: SolverModel>(mut problem: P, model: &Model, dv: &DecisionVariables) -> P {
    if !model.constraints.isolate_critical_processes {
        return problem;
    }
    let critical: Vec<usize> = (0..model.processes.len())
        .filter(|&p| model.processes[p].critical)
        .collect();
    let non_critical: Vec<usize> = (0..model.processes.len())
        .filter(|&p| !model.processes[p].critical)
        .collect();
    for s_idx in 0..model.servers.len() {
        for &pc in &critical {
            for rc in 0..model.processes[pc].effective_replicas() {
                for &pn in &non_critical {
                    for rn in 0..model.processes[pn].effective_replicas() {
                        problem = problem.with(constraint!(
                            dv.placements[pc][rc][s_idx] + dv.placements[pn][rn][s_idx] <= 1
                        ));
                    }
                }
            }
        }
    }
    problem
}

/// Exact reification of the shared `server_used` booleans against the
/// per-server assignment sums: `count ≤ R·used` forces used when anything is
/// placed, `count ≥ used` forces idle when nothing is.
fn server_used_links<P: SolverModel>(mut problem: P, model: &Model, dv: &DecisionVariables) -> P {
    let Some(used) = &dv.server_used else {
        return problem;
    };
    let total = model.total_replicas() as f64;
    for (s_idx, &is_used) in used.iter().enumerate() {
        let count = dv.process_count(s_idx).clone();
        let ceiling = is_used * total;
        problem = problem.with(constraint!(count <= ceiling));
        let count = dv.process_count(s_idx).clone();
        problem = problem.with(constraint!(count >= is_used));
    }
    problem
}

/// Per-server cap on an integer energy approximation: each placed replica
/// contributes `(ram-share × cpu) × 10` plus a logarithmic RAM term.
fn energy_cap<P: SolverModel>(
    mut problem: P,
    model: &Model,
    dv: &DecisionVariables,
) -> Result<P, SolveError> {
    let Some(max_energy) = model.constraints.max_energy_per_server else {
        return Ok(problem);
    };
    let limit = scaled(max_energy).ok_or_else(|| SolveError::Overflow {
        context: "energy consumption cap".into(),
    })?;
    for (s_idx, server) in model.servers.iter().enumerate() {
        let usage = demand_sum(
            model,
            dv,
            s_idx,
            |p| {
                checked_i64(
                    (p.ram / server.ram * server.cpu) * 10.0 * crate::model::SCALE as f64
                        + (1.0 + p.ram).ln() * crate::model::SCALE as f64,
                )
            },
            "energy",
        )?;
        problem = problem.with(constraint!(usage <= limit as f64));
    }
    Ok(problem)
}

/// Daily budget in cents. Each replica on a costed server contributes a
/// linear energy-cost estimate (the cost model assumes one core when a
/// process declares no CPU demand); a used costed server additionally pays a
/// 50 W idle surcharge.
fn daily_cost_cap<P: SolverModel>(
    mut problem: P,
    model: &Model,
    dv: &DecisionVariables,
) -> Result<P, SolveError> {
    if !model.has_cost_cap() {
        return Ok(problem);
    }
    let (Some(budget), Some(used)) = (model.constraints.max_daily_cost, &dv.server_used) else {
        return Ok(problem);
    };
    let mut total_cost = Expression::default();
    for (s_idx, server) in model.servers.iter().enumerate() {
        let Some(energy_cost) = server.energy_cost else {
            continue;
        };
        let process_cost = demand_sum(
            model,
            dv,
            s_idx,
            |p| {
                checked_i64(
                    (p.cpu.unwrap_or(1.0) * 10.0 + p.ram) * 24.0 / 1000.0 * energy_cost * 100.0,
                )
            },
            "energy cost",
        )?;
        let idle_factor =
            checked_i64(50.0 * 24.0 / 1000.0 * energy_cost * 100.0).ok_or_else(|| {
                SolveError::Overflow {
                    context: format!("idle power cost of server {}", server.name),
                }
            })?;
        total_cost += process_cost + used[s_idx] * idle_factor as f64;
    }
    let budget_cents = checked_i64(budget * 100.0).ok_or_else(|| SolveError::Overflow {
        context: "daily cost budget".into(),
    })?;
    debug!(budget_cents, "applying daily cost constraint");
    problem = problem.with(constraint!(total_cost <= budget_cents as f64));
    Ok(problem)
}

/// At least `servers_for_redundancy` servers carry zero replicas.
fn forced_idle<P: SolverModel>(mut problem: P, model: &Model, dv: &DecisionVariables) -> P {
    let reserve = model.constraints.servers_for_redundancy;
    if reserve == 0 {
        return problem;
    }
    let Some(used) = &dv.server_used else {
        return problem;
    };
    debug!(reserve, "applying server redundancy constraint");
    let used_sum: Expression = used.iter().copied().sum();
    let limit = model.servers.len() as f64 - reserve as f64;
    problem.with(constraint!(used_sum <= limit))
}

/// Linking constraints for the objective helper variables: the round-robin
/// envelope dominates every per-server count; the weighted-capacity pairs
/// tie deviation to `count − target` and absolute deviation to its magnitude.
fn strategy_links<P: SolverModel>(mut problem: P, model: &Model, dv: &DecisionVariables) -> P {
    match model.constraints.load_balancing_strategy {
        Some(LoadBalancingStrategy::RoundRobin) => {
            let Some(envelope) = dv.max_process_count else {
                return problem;
            };
            for s_idx in 0..model.servers.len() {
                let count = dv.process_count(s_idx).clone();
                problem = problem.with(constraint!(count <= envelope));
            }
        }
        Some(LoadBalancingStrategy::WeightedCapacity) => {
            let Some(deviations) = &dv.capacity_deviation else {
                return problem;
            };
            for (s_idx, vars) in deviations.iter().enumerate() {
                let count = dv.process_count(s_idx).clone();
                problem = problem
                    .with(constraint!(count - vars.deviation == vars.target as f64));
                problem =
                    problem.with(constraint!(vars.abs_deviation - vars.deviation >= 0));
                problem =
                    problem.with(constraint!(vars.abs_deviation + vars.deviation >= 0));
            }
        }
        Some(LoadBalancingStrategy::BinPacking) | None => {}
    }
    problem
}
