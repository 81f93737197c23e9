use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use joint_motion_rs::{archive, metrics, Side};

#[derive(Parser, Debug)]
#[command(name = "joint_motion")]
#[command(about = "Knee joint-motion metrics from IMU session archives", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze an extracted session archive directory
    Analyze {
        /// Directory containing the per-sensor CSV exports
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Restrict computation to one knee
        #[arg(long, value_enum, default_value_t = SideArg::Both)]
        side: SideArg,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum SideArg {
    Left,
    Right,
    Both,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Analyze { dir, side } => analyze(&dir, side),
    }
}

fn analyze(dir: &std::path::Path, side: SideArg) -> Result<()> {
    let session = archive::load_session_from_dir(dir)
        .with_context(|| format!("loading session archive from {}", dir.display()))?;
    for warning in &session.warnings {
        log::warn!("{warning}");
    }

    let json = match side {
        SideArg::Both => {
            let analysis = metrics::analyze_session(&session)?;
            serde_json::to_string_pretty(&analysis)?
        }
        SideArg::Left => {
            let knee = metrics::knee_metrics(&session, Side::Left)?;
            serde_json::to_string_pretty(&knee)?
        }
        SideArg::Right => {
            let knee = metrics::knee_metrics(&session, Side::Right)?;
            serde_json::to_string_pretty(&knee)?
        }
    };
    println!("{json}");
    Ok(())
}
