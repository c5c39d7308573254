use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use envconfig::Envconfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use schedrs::config;
use schedrs::model::Model;
use schedrs::solver::{Placement, Scheduler, SolveOptions};

/// Place process replicas onto servers from a preset of YAML documents.
#[derive(Parser, Debug)]
#[command(name = "scheduler", version)]
struct Cli {
    /// Directory holding servers.yml, processes.yml and constraints.yml.
    preset_dir: PathBuf,

    /// Also write the allocation record to
    /// DIR/processes-repartition-<preset>.yml.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Wall-clock solver time limit in seconds.
    #[arg(long, default_value_t = 30.0)]
    time_limit: f64,
}

#[derive(Envconfig)]
struct EnvSettings {
    /// DEBUG=1 raises the default log filter and prints full error chains.
    #[envconfig(from = "DEBUG")]
    debug: Option<String>,
}

fn main() -> ExitCode {
    let debug = EnvSettings::init_from_env()
        .ok()
        .and_then(|env| env.debug)
        .is_some_and(|v| !v.is_empty() && v != "0");

    let default_filter = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            if debug {
                error!("{err:?}");
            } else {
                error!("{err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Returns whether a feasible allocation was found. Load and build errors
/// bubble up with their file context.
fn run(cli: &Cli) -> anyhow::Result<bool> {
    info!(preset = %cli.preset_dir.display(), "loading configuration");
    let preset = config::load_preset(&cli.preset_dir)?;
    let model = Model::from_preset(preset)?;

    let scheduler = Scheduler::new(model);
    let options = SolveOptions {
        time_limit_seconds: Some(cli.time_limit),
    };

    match scheduler.solve(&options)? {
        Placement::Solved(report) => {
            let yaml = serde_yaml::to_string(&report.allocation)
                .context("serializing allocation record")?;
            print!("{yaml}");

            if let Some(dir) = &cli.output_dir {
                let preset_name = cli
                    .preset_dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("preset");
                let path = dir.join(format!("processes-repartition-{preset_name}.yml"));
                std::fs::write(&path, &yaml)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!(path = %path.display(), "allocation written");
            }
            Ok(true)
        }
        Placement::Infeasible => Ok(false),
    }
}
