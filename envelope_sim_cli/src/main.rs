use std::fs;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use envelope_sim::{simulate, Envelope, Scenario, SimulationResult, SimulationStage, SimulationSummary};
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train speed envelope simulation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate one or more scenario files and write the resulting envelopes as CSV
    Simulate(SimulateArgs),
    /// Print the parts of the envelopes of one or more scenario files
    Describe(DescribeArgs),
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Scenario JSON files
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "envelope.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Simulation stage to export
    #[arg(long, value_enum, default_value_t = StageOpt::Final)]
    stage: StageOpt,

    /// Optional JSON path for per-scenario summaries
    #[arg(long, value_hint = ValueHint::FilePath)]
    summary: Option<PathBuf>,

    /// Profile major stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct DescribeArgs {
    /// Scenario JSON files
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Simulation stage to describe
    #[arg(long, value_enum, default_value_t = StageOpt::Final)]
    stage: StageOpt,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StageOpt {
    Mrsp,
    MaxSpeed,
    MaxEffort,
    Final,
}

impl From<StageOpt> for SimulationStage {
    fn from(value: StageOpt) -> Self {
        match value {
            StageOpt::Mrsp => SimulationStage::Mrsp,
            StageOpt::MaxSpeed => SimulationStage::MaxSpeed,
            StageOpt::MaxEffort => SimulationStage::MaxEffort,
            StageOpt::Final => SimulationStage::Final,
        }
    }
}

/// A simulated scenario, named after its file.
struct Simulated {
    name: String,
    result: SimulationResult,
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    scenario: &'a str,
    #[serde(flatten)]
    summary: SimulationSummary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Simulate(args) => args.verbose,
        Command::Describe(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Simulate(args) => handle_simulate(args),
        Command::Describe(args) => handle_describe(args),
    }
}

fn handle_simulate(args: SimulateArgs) -> Result<()> {
    let t_simulate = Instant::now();
    let simulated = simulate_all(&args.inputs)?;
    if args.profile || args.verbose {
        info!(
            "Simulation stage: {:.1} ms ({} scenarios)",
            t_simulate.elapsed().as_secs_f64() * 1000.0,
            simulated.len()
        );
    }
    for scenario in &simulated {
        let summary = scenario.result.summary();
        info!(
            "{}: {:.0} m in {:.1} s ({:+.1} s over max effort, top speed {:.2} m/s)",
            scenario.name,
            summary.distance,
            summary.running_time,
            summary.added_time,
            summary.max_speed
        );
    }

    if let Some(summary_path) = args.summary.as_ref() {
        write_summary(&simulated, summary_path)?;
        info!("Wrote summary: {}", summary_path.display());
    }

    let stage = args.stage.into();
    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut writer = csv::Writer::from_writer(stdout.lock());
        write_envelope_rows(&simulated, stage, &mut writer)?;
    } else {
        let t_csv = Instant::now();
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        let rows = write_envelope_rows(&simulated, stage, &mut writer)?;
        if args.profile || args.verbose {
            info!(
                "CSV stage: {:.1} ms ({} rows)",
                t_csv.elapsed().as_secs_f64() * 1000.0,
                rows
            );
        }
        info!("Wrote envelope CSV: {}", args.output.display());
    }
    Ok(())
}

fn handle_describe(args: DescribeArgs) -> Result<()> {
    let simulated = simulate_all(&args.inputs)?;
    let stage = args.stage.into();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for scenario in &simulated {
        let envelope = scenario.result.stage(stage);
        writeln!(out, "{} ({:?}, {} parts)", scenario.name, stage, envelope.len())?;
        describe_envelope(envelope, &mut out)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Simulates every input in parallel, keeping the input order.
fn simulate_all(inputs: &[PathBuf]) -> Result<Vec<Simulated>> {
    if inputs.is_empty() {
        return Err(anyhow!("no scenario files supplied"));
    }
    let inputs: Vec<(usize, &PathBuf)> = inputs.iter().enumerate().collect();
    let mut simulated: Vec<(usize, Simulated)> = inputs
        .par_iter()
        .map(|&(index, path)| -> Result<(usize, Simulated)> {
            let scenario = load_scenario(path)?;
            let result = simulate(&scenario)
                .with_context(|| format!("failed to simulate {}", path.display()))?;
            Ok((
                index,
                Simulated {
                    name: scenario_name(path),
                    result,
                },
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    simulated.sort_by_key(|(index, _)| *index);
    Ok(simulated.into_iter().map(|(_, scenario)| scenario).collect())
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Scenario::from_json(&text).with_context(|| format!("{} is not a valid scenario", path.display()))
}

fn scenario_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

fn write_envelope_rows<W: Write>(
    simulated: &[Simulated],
    stage: SimulationStage,
    writer: &mut csv::Writer<W>,
) -> Result<usize> {
    writer.write_record(["scenario", "position_m", "speed_mps", "time_s"])?;
    let mut rows = 0;
    for scenario in simulated {
        for point in scenario.result.stage(stage).iterate_points() {
            writer.write_record([
                scenario.name.clone(),
                format!("{:.3}", point.position),
                format!("{:.4}", point.speed),
                format!("{:.3}", point.time),
            ])?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

fn write_summary(simulated: &[Simulated], path: &Path) -> Result<()> {
    let rows: Vec<SummaryRow> = simulated
        .iter()
        .map(|scenario| SummaryRow {
            scenario: &scenario.name,
            summary: scenario.result.summary(),
        })
        .collect();
    let json = serde_json::to_string_pretty(&rows)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn describe_envelope<W: Write>(envelope: &Envelope, out: &mut W) -> Result<()> {
    writeln!(
        out,
        "{:>4} {:>10} {:>10} {:>8} {:>8} {:>14} {:>9}",
        "part", "begin_m", "end_m", "v0_mps", "v1_mps", "profile", "time_s"
    )?;
    for (index, part) in envelope.iter().enumerate() {
        let profile = part
            .profile()
            .map_or_else(|| "-".to_string(), |profile| format!("{profile:?}"));
        writeln!(
            out,
            "{:>4} {:>10.1} {:>10.1} {:>8.2} {:>8.2} {:>14} {:>9.1}",
            index,
            part.begin_pos(),
            part.end_pos(),
            part.begin_speed(),
            part.end_speed(),
            profile,
            part.total_time()
        )?;
    }
    writeln!(
        out,
        "total: {:.1} m in {:.1} s{}",
        envelope.total_distance(),
        envelope.total_time(),
        if envelope.is_continuous() { "" } else { " (discontinuous)" }
    )?;
    Ok(())
}
