use good_lp::{Expression, ProblemVariables, Variable, variable};

use crate::model::{LoadBalancingStrategy, Model};

/// Deviation helpers for the weighted-capacity strategy: one pair per server,
/// with the capacity-proportional target count fixed at layout time.
pub struct DeviationVars {
    pub deviation: Variable,
    pub abs_deviation: Variable,
    pub target: i64,
}

/// All decision variables for one solve, allocated up front.
///
/// The solver API requires every variable to exist before the problem is
/// instantiated, so the auxiliary families are created here too, gated on
/// whether any constraint or objective will reference them.
pub struct DecisionVariables {
    /// `placements[p][r][s]` is 1 iff replica r of process p is on server s.
    pub placements: Vec<Vec<Vec<Variable>>>,
    /// One boolean per server, true iff the server hosts any replica. Shared
    /// by the bin-packing objective, the daily-cost cap and the forced-idle
    /// constraint.
    pub server_used: Option<Vec<Variable>>,
    /// Upper envelope on per-server process counts (round-robin strategy).
    pub max_process_count: Option<Variable>,
    /// Per-server deviation pairs (weighted-capacity strategy).
    pub capacity_deviation: Option<Vec<DeviationVars>>,
    counts: Vec<Expression>,
}

impl DecisionVariables {
    pub fn layout(vars: &mut ProblemVariables, model: &Model) -> Self {
        let placements: Vec<Vec<Vec<Variable>>> = model
            .processes
            .iter()
            .enumerate()
            .map(|(p_idx, process)| {
                (0..process.effective_replicas())
                    .map(|r| {
                        (0..model.servers.len())
                            .map(|s_idx| {
                                vars.add(
                                    variable()
                                        .binary()
                                        .name(format!("proc_{p_idx}_replica_{r}_server_{s_idx}")),
                                )
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();

        let counts: Vec<Expression> = (0..model.servers.len())
            .map(|s_idx| {
                placements
                    .iter()
                    .flat_map(|replicas| replicas.iter().map(move |servers| servers[s_idx]))
                    .sum()
            })
            .collect();

        let total = model.total_replicas() as f64;

        let server_used = model.needs_server_used().then(|| {
            (0..model.servers.len())
                .map(|s_idx| vars.add(variable().binary().name(format!("server_{s_idx}_used"))))
                .collect()
        });

        let max_process_count = (model.constraints.load_balancing_strategy
            == Some(LoadBalancingStrategy::RoundRobin))
        .then(|| {
            vars.add(
                variable()
                    .integer()
                    .min(0.0)
                    .max(total)
                    .name("max_processes"),
            )
        });

        let capacity_deviation = (model.constraints.load_balancing_strategy
            == Some(LoadBalancingStrategy::WeightedCapacity))
        .then(|| {
            let total_ram: f64 = model.servers.iter().map(|s| s.ram).sum();
            let total_cpu: f64 = model.servers.iter().map(|s| s.cpu).sum();
            model
                .servers
                .iter()
                .enumerate()
                .map(|(s_idx, server)| {
                    let ratio = if total_ram > 0.0 && total_cpu > 0.0 {
                        (server.ram / total_ram + server.cpu / total_cpu) / 2.0
                    } else {
                        0.0
                    };
                    let target = (total * ratio).round() as i64;
                    let bound = total + target as f64;
                    DeviationVars {
                        deviation: vars.add(
                            variable()
                                .integer()
                                .min(-bound)
                                .max(bound)
                                .name(format!("process_deviation_{s_idx}")),
                        ),
                        abs_deviation: vars.add(
                            variable()
                                .integer()
                                .min(0.0)
                                .max(bound)
                                .name(format!("abs_process_deviation_{s_idx}")),
                        ),
                        target,
                    }
                })
                .collect()
        });

        Self {
            placements,
            server_used,
            max_process_count,
            capacity_deviation,
            counts,
        }
    }

    /// Linear expression counting the replicas placed on server `s_idx`.
    /// A cached term, not a stored variable.
    pub fn process_count(&self, s_idx: usize) -> &Expression {
        &self.counts[s_idx]
    }
}
