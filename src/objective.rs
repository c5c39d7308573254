//! Objective construction: one maximized weighted sum over three
//! sub-objectives, with weights derived from the configured priority order.

use good_lp::Expression;
use tracing::debug;

use crate::model::{LoadBalancingStrategy, Model, OptimizationPriority};
use crate::variables::DecisionVariables;

/// Weights for the three sub-objectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weights {
    pub load_balancing: i64,
    pub green_energy: i64,
    pub cost: i64,
}

/// Priority at index i receives weight 10^(4-i); priorities not listed keep
/// their default weight divided by ten.
pub fn derive_weights(priorities: &[OptimizationPriority]) -> Weights {
    let mut weights = Weights {
        load_balancing: OptimizationPriority::LoadBalancing.default_weight() / 10,
        green_energy: OptimizationPriority::GreenEnergy.default_weight() / 10,
        cost: OptimizationPriority::Cost.default_weight() / 10,
    };
    for (i, priority) in priorities.iter().enumerate() {
        let exponent = 4i64 - i as i64;
        let value = if exponent >= 0 {
            10i64.pow(exponent as u32)
        } else {
            1
        };
        match priority {
            OptimizationPriority::LoadBalancing => weights.load_balancing = value,
            OptimizationPriority::GreenEnergy => weights.green_energy = value,
            OptimizationPriority::Cost => weights.cost = value,
        }
    }
    weights
}

/// Build the maximized objective expression. An empty term list yields the
/// zero expression, making any feasible solution acceptable.
pub fn build(model: &Model, dv: &DecisionVariables) -> Expression {
    let weights = derive_weights(&model.constraints.priorities);
    debug!(
        load_balancing = weights.load_balancing,
        green_energy = weights.green_energy,
        cost = weights.cost,
        "applying optimization weights"
    );

    let mut terms = Expression::default();

    match model.constraints.load_balancing_strategy {
        Some(LoadBalancingStrategy::RoundRobin) => {
            if let Some(envelope) = dv.max_process_count {
                terms += envelope * -(weights.load_balancing as f64);
            }
        }
        Some(LoadBalancingStrategy::BinPacking) => {
            if let Some(used) = &dv.server_used {
                for &is_used in used {
                    terms += is_used * -(weights.load_balancing as f64);
                }
            }
        }
        Some(LoadBalancingStrategy::WeightedCapacity) => {
            if let Some(deviations) = &dv.capacity_deviation {
                for vars in deviations {
                    terms += vars.abs_deviation * -(weights.load_balancing as f64);
                }
            }
        }
        None => {}
    }

    if model.constraints.prioritize_green_energy {
        for (p_idx, process) in model.processes.iter().enumerate() {
            for r in 0..process.effective_replicas() {
                for (s_idx, server) in model.servers.iter().enumerate() {
                    if server.green_energy {
                        terms +=
                            dv.placements[p_idx][r][s_idx] * weights.green_energy as f64;
                    }
                }
            }
        }
    }

    // Cost terms are normalized by the most expensive single placement so
    // the configured weight bounds every coefficient.
    let max_possible_cost = model
        .servers
        .iter()
        .filter_map(|s| s.energy_cost)
        .flat_map(|energy_cost| {
            model
                .processes
                .iter()
                .map(move |p| placement_cost_cents(p.cpu, p.ram, energy_cost))
        })
        .fold(0.0f64, f64::max);

    if max_possible_cost > 0.0 {
        for (p_idx, process) in model.processes.iter().enumerate() {
            for r in 0..process.effective_replicas() {
                for (s_idx, server) in model.servers.iter().enumerate() {
                    let Some(energy_cost) = server.energy_cost else {
                        continue;
                    };
                    let cost_cents = placement_cost_cents(process.cpu, process.ram, energy_cost);
                    let weight = (cost_cents * weights.cost as f64 / max_possible_cost).round();
                    terms += dv.placements[p_idx][r][s_idx] * -weight;
                }
            }
        }
    }

    terms
}

/// Daily cost in cents of one replica on a server with the given energy
/// price. The cost model assumes one core when no CPU demand is declared.
fn placement_cost_cents(cpu: Option<f64>, ram: f64, energy_cost: f64) -> f64 {
    (cpu.unwrap_or(1.0) * 10.0 + ram) * 24.0 / 1000.0 * energy_cost * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use OptimizationPriority::{Cost, GreenEnergy, LoadBalancing};

    #[test]
    fn listed_priorities_get_positional_weights() {
        let weights = derive_weights(&[LoadBalancing, GreenEnergy, Cost]);
        assert_eq!(weights.load_balancing, 10_000);
        assert_eq!(weights.green_energy, 1_000);
        assert_eq!(weights.cost, 100);
    }

    #[test]
    fn reordering_reassigns_weights() {
        let weights = derive_weights(&[Cost, LoadBalancing]);
        assert_eq!(weights.cost, 10_000);
        assert_eq!(weights.load_balancing, 1_000);
        // Unlisted: default divided by ten.
        assert_eq!(weights.green_energy, 100);
    }

    #[test]
    fn empty_list_keeps_reduced_defaults() {
        let weights = derive_weights(&[]);
        assert_eq!(weights.load_balancing, 1_000);
        assert_eq!(weights.green_energy, 100);
        assert_eq!(weights.cost, 10);
    }

    #[test]
    fn single_placement_cost_model() {
        // 2 cores, 4 GB at $0.10/kWh: (2*10 + 4) * 24/1000 * 0.10 * 100 cents.
        let cents = placement_cost_cents(Some(2.0), 4.0, 0.10);
        assert!((cents - 5.76).abs() < 1e-9);
        // Defaults to one core.
        let cents = placement_cost_cents(None, 4.0, 0.10);
        assert!((cents - 3.36).abs() < 1e-9);
    }
}
