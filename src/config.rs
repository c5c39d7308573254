use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::model::{
    Constraints, LoadBalancingStrategy, LocationPolicy, Model, OptimizationPriority, Process,
    Server,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot find configuration file: {path}")]
    NotFound { path: PathBuf },

    #[error("cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// YAML syntax errors and missing required fields both land here; serde
    /// reports the offending field in `source`.
    #[error("malformed configuration in {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("no {0} defined in configuration files")]
    Empty(&'static str),
}

/// A value that may be a plain number or a string with a trailing `%`.
///
/// Percentage caps accept both `80` and `"80%"`; unparseable values warn and
/// fall back to a caller-provided default rather than aborting.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    pub fn as_percent(&self, default: u32) -> u32 {
        match self {
            Self::Number(n) => *n as u32,
            Self::Text(text) => match text.trim().trim_end_matches('%').trim().parse::<f64>() {
                Ok(pct) => pct as u32,
                Err(_) => {
                    warn!(value = %text, default, "could not parse percentage value, using default");
                    default
                }
            },
        }
    }

    /// Interpret as a dollar amount. A `"NN%"` string means a percentage of
    /// the historical $100 default budget. Unparseable values warn and drop
    /// the constraint.
    pub fn as_dollars(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(text) if text.contains('%') => {
                let pct = self.as_percent(100);
                Some(100.0 * pct as f64 / 100.0)
            }
            Self::Text(text) => match text.trim().parse::<f64>() {
                Ok(amount) => Some(amount),
                Err(_) => {
                    warn!(value = %text, "could not parse daily cost budget, constraint dropped");
                    None
                }
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServersDoc {
    #[serde(default)]
    pub servers: Vec<RawServer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawServer {
    pub name: String,
    pub ram: f64,
    pub cpu: f64,
    pub disk: f64,
    pub bandwidth: f64,
    pub geographical_location: Option<String>,
    pub os: Option<String>,
    #[serde(default)]
    pub process_scope: Vec<String>,
    /// The misspelled key is the contractual spelling; the corrected one is
    /// accepted as an alias.
    #[serde(rename = "green-enegery", alias = "green-energy", default)]
    pub green_energy: bool,
    pub energy_cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessesDoc {
    #[serde(default)]
    pub processes: Vec<RawProcess>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawProcess {
    pub name: String,
    pub ram: f64,
    pub disk: f64,
    pub bandwidth: f64,
    pub cpu: Option<f64>,
    pub replicas: Option<u32>,
    #[serde(default)]
    pub location: Vec<String>,
    pub location_policy: Option<String>,
    pub os: Option<String>,
    pub scope: Option<String>,
    #[serde(default)]
    pub affinity: Vec<String>,
    #[serde(default)]
    pub non_affinity: Vec<String>,
    #[serde(default)]
    pub critical: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConstraintsDoc {
    #[serde(default)]
    pub constraints: RawConstraints,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawConstraints {
    pub max_ram_usage_per_server: Option<NumberOrText>,
    pub max_cpu_usage_per_server: Option<NumberOrText>,
    pub max_disk_usage_per_server: Option<NumberOrText>,
    pub max_network_bandwidth_per_server: Option<NumberOrText>,
    pub max_processes_per_server: Option<i64>,
    #[serde(default)]
    pub isolate_critical_processes: bool,
    pub max_energy_consumption_per_server: Option<f64>,
    pub max_daily_cost: Option<NumberOrText>,
    pub servers_for_redundancy: Option<usize>,
    pub load_balancing_strategy: Option<String>,
    #[serde(default)]
    pub prioritize_green_energy: bool,
    pub optimization_priorities: Option<Vec<String>>,
}

/// The three preset documents, as parsed.
#[derive(Debug)]
pub struct Preset {
    pub servers: ServersDoc,
    pub processes: ProcessesDoc,
    pub constraints: ConstraintsDoc,
}

fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_owned(),
            }
        } else {
            ConfigError::Io {
                path: path.to_owned(),
                source,
            }
        }
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Malformed {
        path: path.to_owned(),
        source,
    })
}

/// Load `servers.yml`, `processes.yml` and `constraints.yml` from a preset
/// directory.
pub fn load_preset(dir: &Path) -> Result<Preset, ConfigError> {
    Ok(Preset {
        servers: load_yaml(&dir.join("servers.yml"))?,
        processes: load_yaml(&dir.join("processes.yml"))?,
        constraints: load_yaml(&dir.join("constraints.yml"))?,
    })
}

impl Model {
    /// Build the immutable model from the raw preset documents.
    ///
    /// Unknown policy/strategy/priority tokens warn and are dropped; empty
    /// server or process lists are load errors.
    pub fn from_preset(preset: Preset) -> Result<Self, ConfigError> {
        if preset.servers.servers.is_empty() {
            return Err(ConfigError::Empty("servers"));
        }
        if preset.processes.processes.is_empty() {
            return Err(ConfigError::Empty("processes"));
        }

        let servers = preset
            .servers
            .servers
            .into_iter()
            .map(|raw| Server {
                name: raw.name,
                ram: raw.ram,
                cpu: raw.cpu,
                disk: raw.disk,
                bandwidth: raw.bandwidth,
                location: raw.geographical_location,
                os: raw.os,
                process_scope: raw.process_scope,
                green_energy: raw.green_energy,
                energy_cost: raw.energy_cost,
            })
            .collect();

        let processes = preset
            .processes
            .processes
            .into_iter()
            .map(|raw| {
                let policy = parse_policy(&raw.name, raw.location_policy.as_deref());
                Process {
                    name: raw.name,
                    ram: raw.ram,
                    disk: raw.disk,
                    bandwidth: raw.bandwidth,
                    cpu: raw.cpu,
                    replicas: raw.replicas.unwrap_or(1),
                    locations: raw.location,
                    policy,
                    os: raw.os,
                    scope: raw.scope,
                    affinity: raw.affinity,
                    non_affinity: raw.non_affinity,
                    critical: raw.critical,
                }
            })
            .collect();

        let constraints = convert_constraints(preset.constraints.constraints);

        Ok(Model {
            servers,
            processes,
            constraints,
        })
    }
}

fn parse_policy(process: &str, raw: Option<&str>) -> LocationPolicy {
    match raw {
        None | Some("none") => LocationPolicy::None,
        Some("single") => LocationPolicy::Single,
        Some("redundant") => LocationPolicy::Redundant,
        Some(other) => {
            warn!(process, policy = other, "unknown location policy, treating as none");
            LocationPolicy::None
        }
    }
}

fn parse_strategy(raw: Option<&str>) -> Option<LoadBalancingStrategy> {
    match raw {
        None => None,
        Some("round-robin") => Some(LoadBalancingStrategy::RoundRobin),
        Some("bin-packing") => Some(LoadBalancingStrategy::BinPacking),
        Some("weighted-capacity") => Some(LoadBalancingStrategy::WeightedCapacity),
        Some(other) => {
            warn!(strategy = other, "unknown load balancing strategy, ignoring");
            None
        }
    }
}

fn parse_priorities(raw: Option<Vec<String>>) -> Vec<OptimizationPriority> {
    let Some(tokens) = raw else {
        return Constraints::default().priorities;
    };
    tokens
        .iter()
        .filter_map(|token| match token.as_str() {
            "load-balancing" => Some(OptimizationPriority::LoadBalancing),
            "green-energy" => Some(OptimizationPriority::GreenEnergy),
            "cost" => Some(OptimizationPriority::Cost),
            other => {
                warn!(priority = other, "invalid optimization priority, ignoring");
                None
            }
        })
        .collect()
}

fn convert_constraints(raw: RawConstraints) -> Constraints {
    Constraints {
        max_ram_pct: percent(&raw.max_ram_usage_per_server),
        max_cpu_pct: percent(&raw.max_cpu_usage_per_server),
        max_disk_pct: percent(&raw.max_disk_usage_per_server),
        max_bandwidth_pct: percent(&raw.max_network_bandwidth_per_server),
        max_processes_per_server: raw.max_processes_per_server,
        isolate_critical_processes: raw.isolate_critical_processes,
        max_energy_per_server: raw.max_energy_consumption_per_server,
        max_daily_cost: raw.max_daily_cost.as_ref().and_then(NumberOrText::as_dollars),
        servers_for_redundancy: raw.servers_for_redundancy.unwrap_or(0),
        load_balancing_strategy: parse_strategy(raw.load_balancing_strategy.as_deref()),
        prioritize_green_energy: raw.prioritize_green_energy,
        priorities: parse_priorities(raw.optimization_priorities),
    }
}

fn percent(value: &Option<NumberOrText>) -> u32 {
    value.as_ref().map_or(100, |v| v.as_percent(100))
}
