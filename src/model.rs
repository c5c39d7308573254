use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Scale factor for floating-point to integer conversion.
///
/// Demands and capacities may be fractional in the YAML; the solver side is
/// pure-integer, so every value is multiplied by this before comparison.
pub const SCALE: i64 = 1000;

/// A physical server that replicas can be placed on.
#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub name: String,
    /// RAM capacity in GB.
    pub ram: f64,
    /// CPU capacity in cores.
    pub cpu: f64,
    /// Disk capacity in GB.
    pub disk: f64,
    /// Network bandwidth capacity in GB/s.
    pub bandwidth: f64,
    pub location: Option<String>,
    pub os: Option<String>,
    /// Process scopes this server accepts. Empty means unrestricted.
    pub process_scope: Vec<String>,
    pub green_energy: bool,
    /// Currency per kWh. Servers without a cost don't participate in the
    /// budget constraint or the cost objective.
    pub energy_cost: Option<f64>,
}

impl Server {
    /// CPU demand of `process` when placed on this server.
    ///
    /// A process without an explicit CPU demand consumes CPU proportionally
    /// to the share of this server's RAM it takes, which makes the demand
    /// server-dependent. Callers must therefore compute it per candidate
    /// server, never once per process.
    pub fn cpu_demand(&self, process: &Process) -> f64 {
        process
            .cpu
            .unwrap_or_else(|| process.ram / self.ram * self.cpu)
    }
}

/// Placement rule for a process's replicas across its allowed locations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationPolicy {
    /// Place the base replica count anywhere allowed.
    #[default]
    None,
    /// Like `None`, but replicas must land on distinct servers.
    Single,
    /// Place the base replica count in *each* allowed location.
    Redundant,
}

/// A workload unit. Each of its effective replicas must be placed on some
/// server.
#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    pub name: String,
    pub ram: f64,
    pub disk: f64,
    pub bandwidth: f64,
    /// Explicit CPU demand in cores. See [`Server::cpu_demand`] for the
    /// derived value when absent.
    pub cpu: Option<f64>,
    /// Base replica count.
    pub replicas: u32,
    /// Allowed locations. Empty means any.
    pub locations: Vec<String>,
    pub policy: LocationPolicy,
    pub os: Option<String>,
    pub scope: Option<String>,
    /// Names of processes at least one replica of which must share the host.
    pub affinity: Vec<String>,
    /// Names of processes no replica of which may share the host.
    pub non_affinity: Vec<String>,
    pub critical: bool,
}

impl Process {
    /// Number of replicas the solver actually places.
    ///
    /// Under the redundant policy the base count is placed in each allowed
    /// location, so the total is `base × |locations|`, conceptually
    /// partitioned into per-location chunks of `base`.
    pub fn effective_replicas(&self) -> usize {
        match self.policy {
            LocationPolicy::Redundant if !self.locations.is_empty() => {
                self.replicas as usize * self.locations.len()
            }
            _ => self.replicas as usize,
        }
    }
}

/// How the load-balancing objective term is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancingStrategy {
    /// Minimize the maximum per-server process count.
    RoundRobin,
    /// Minimize the number of servers used.
    BinPacking,
    /// Minimize deviation from capacity-proportional target counts.
    WeightedCapacity,
}

/// A sub-objective that can be ranked in `optimization-priorities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationPriority {
    LoadBalancing,
    GreenEnergy,
    Cost,
}

impl OptimizationPriority {
    /// Weight applied when the priority is not ranked explicitly is this
    /// value divided by ten.
    pub fn default_weight(self) -> i64 {
        match self {
            Self::LoadBalancing => 10_000,
            Self::GreenEnergy => 1_000,
            Self::Cost => 100,
        }
    }
}

/// Global placement constraints and optimization settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
    /// Percentage caps (0-100) on per-server resource usage.
    pub max_ram_pct: u32,
    pub max_cpu_pct: u32,
    pub max_disk_pct: u32,
    pub max_bandwidth_pct: u32,
    pub max_processes_per_server: Option<i64>,
    /// When set, no server may host both a critical and a non-critical
    /// replica.
    pub isolate_critical_processes: bool,
    pub max_energy_per_server: Option<f64>,
    /// Daily budget in currency units, enforced in cents inside the model.
    pub max_daily_cost: Option<f64>,
    /// Number of servers that must stay idle as failover headroom.
    pub servers_for_redundancy: usize,
    pub load_balancing_strategy: Option<LoadBalancingStrategy>,
    pub prioritize_green_energy: bool,
    /// Ranked sub-objectives. Position i receives weight 10^(4-i).
    pub priorities: Vec<OptimizationPriority>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_ram_pct: 100,
            max_cpu_pct: 100,
            max_disk_pct: 100,
            max_bandwidth_pct: 100,
            max_processes_per_server: None,
            isolate_critical_processes: false,
            max_energy_per_server: None,
            max_daily_cost: None,
            servers_for_redundancy: 0,
            load_balancing_strategy: None,
            prioritize_green_energy: false,
            priorities: vec![
                OptimizationPriority::LoadBalancing,
                OptimizationPriority::GreenEnergy,
                OptimizationPriority::Cost,
            ],
        }
    }
}

/// The immutable problem description: servers, processes and global
/// constraints. Built once from the preset documents and owned by the
/// scheduler for its lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub servers: Vec<Server>,
    pub processes: Vec<Process>,
    pub constraints: Constraints,
}

impl Model {
    /// Total effective replica count across all processes.
    pub fn total_replicas(&self) -> usize {
        self.processes.iter().map(Process::effective_replicas).sum()
    }

    /// Indices of servers located in `location`.
    pub fn server_indices_in(&self, location: &str) -> Vec<usize> {
        self.servers
            .iter()
            .enumerate()
            .filter(|(_, s)| s.location.as_deref() == Some(location))
            .map(|(i, _)| i)
            .collect()
    }

    /// Process indices grouped by name. Duplicate names map to multiple
    /// indices; affinity targets match every one of them.
    pub fn process_indices_by_name(&self) -> HashMap<&str, Vec<usize>> {
        let mut map: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, process) in self.processes.iter().enumerate() {
            map.entry(process.name.as_str()).or_default().push(idx);
        }
        map
    }

    /// Whether the daily-cost cap has anything to constrain.
    pub fn has_cost_cap(&self) -> bool {
        self.constraints.max_daily_cost.is_some()
            && self.servers.iter().any(|s| s.energy_cost.is_some())
    }

    /// Whether any constraint or objective needs the `server_used` booleans.
    pub fn needs_server_used(&self) -> bool {
        self.constraints.servers_for_redundancy > 0
            || self.constraints.load_balancing_strategy
                == Some(LoadBalancingStrategy::BinPacking)
            || self.has_cost_cap()
    }
}

/// Truncate `value` to i64, or `None` if it doesn't fit.
pub(crate) fn checked_i64(value: f64) -> Option<i64> {
    if value.is_finite() && value > i64::MIN as f64 && value < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

/// `value × SCALE`, truncated to i64.
pub(crate) fn scaled(value: f64) -> Option<i64> {
    checked_i64(value * SCALE as f64)
}

/// `⌊capacity × pct × SCALE / 100⌋`, a percentage-capped capacity in scaled
/// units.
pub(crate) fn scaled_capacity(capacity: f64, pct: u32) -> Option<i64> {
    checked_i64((capacity * pct as f64 * SCALE as f64 / 100.0).floor())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(replicas: u32, locations: &[&str], policy: LocationPolicy) -> Process {
        Process {
            name: "p".into(),
            ram: 1.0,
            disk: 1.0,
            bandwidth: 1.0,
            cpu: None,
            replicas,
            locations: locations.iter().map(|s| s.to_string()).collect(),
            policy,
            os: None,
            scope: None,
            affinity: vec![],
            non_affinity: vec![],
            critical: false,
        }
    }

    #[test]
    fn effective_replicas_default_policy() {
        assert_eq!(process(3, &[], LocationPolicy::None).effective_replicas(), 3);
        assert_eq!(
            process(3, &["a", "b"], LocationPolicy::Single).effective_replicas(),
            3
        );
    }

    #[test]
    fn effective_replicas_redundant_multiplies_by_locations() {
        assert_eq!(
            process(2, &["a", "b", "c"], LocationPolicy::Redundant).effective_replicas(),
            6
        );
        // Redundant with no allowed locations degrades to the base count.
        assert_eq!(
            process(2, &[], LocationPolicy::Redundant).effective_replicas(),
            2
        );
    }

    #[test]
    fn cpu_demand_derived_from_ram_share() {
        let server = Server {
            name: "s".into(),
            ram: 16.0,
            cpu: 4.0,
            disk: 100.0,
            bandwidth: 100.0,
            location: None,
            os: None,
            process_scope: vec![],
            green_energy: false,
            energy_cost: None,
        };
        let mut p = process(1, &[], LocationPolicy::None);
        p.ram = 8.0;
        assert_eq!(server.cpu_demand(&p), 2.0);
        p.cpu = Some(1.5);
        assert_eq!(server.cpu_demand(&p), 1.5);
    }

    #[test]
    fn scaling_truncates_and_detects_overflow() {
        assert_eq!(scaled(1.5), Some(1500));
        assert_eq!(scaled(0.0004), Some(0));
        assert_eq!(scaled(f64::INFINITY), None);
        assert_eq!(scaled(1e18), None);
        assert_eq!(scaled_capacity(16.0, 80), Some(12_800));
        // Floor division: 1/3 of 1 GB at scale 1000.
        assert_eq!(scaled_capacity(0.001, 33), Some(0));
    }
}
