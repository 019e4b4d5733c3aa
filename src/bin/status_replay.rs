use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use inference_root::validation::ModuleParams;
use inference_root::{render, replay};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "status-replay")]
#[command(about = "Replay a participant status evaluation from JSON snapshots", long_about = None)]
struct Cli {
    /// Governance parameter snapshot (JSON)
    #[arg(long)]
    params: PathBuf,

    /// Participant record (JSON)
    #[arg(long)]
    participant: PathBuf,

    /// Counters seen by the previous evaluation (JSON); zeroed when omitted
    #[arg(long)]
    previous: Option<PathBuf>,

    /// Refuse parameter snapshots that fail bounds validation
    #[arg(long)]
    strict: bool,
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("warn"));
    let cli = Cli::parse();

    let params = read(&cli.params)?;
    let participant = read(&cli.participant)?;
    let previous = cli.previous.as_deref().map(read).transpose()?;

    if cli.strict {
        ModuleParams::from_json_str(&params)?
            .validate()
            .context("Parameter snapshot failed bounds validation")?;
    }

    let decision = replay(&params, &participant, previous.as_deref())?;
    println!("{}", render(&decision)?);
    Ok(())
}
