//! Constraint-based placement of process replicas onto servers.
//!
//! Three YAML documents (servers, processes, global constraints) are turned
//! into a mixed-integer program: binary variables decide which server hosts
//! each replica, constraint families encode capacity, compatibility,
//! locality, affinity, isolation, energy and budget rules, and a weighted
//! objective trades off load balancing, green-energy preference and cost.
//! The solved assignment is extracted into an allocation record with
//! per-server resource accounting.

pub mod config;
pub mod constraints;
pub mod model;
pub mod objective;
pub mod report;
pub mod solver;
pub mod variables;
