use std::{collections::BTreeMap, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::Context;
use clap::{Parser, Subcommand};
use rtplan_retarget::{
    Config, EditRequest, MachineSelection, OutputKind, PlanIo, trailer, workflow,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rtplan-retarget")]
#[command(about = "Retarget and edit DICOM RT Plan files")]
struct Cli {
    /// Machine profile file
    #[arg(long, global = true, env = "RTPLAN_PROFILES")]
    profiles: Option<PathBuf>,
    /// Private annex sidecar
    #[arg(long, global = true, env = "RTPLAN_ANNEX")]
    annex_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show identity, machine and per-beam geometry of a plan
    Inspect {
        plan: PathBuf,
    },
    /// Edit a plan and write it next to the input with the `_mod` suffix
    Modify {
        plan: PathBuf,
        /// Destination machine label (omit to keep the current machine)
        #[arg(long)]
        machine: Option<String>,
        /// Gantry angle of a beam, as INDEX=DEGREES
        #[arg(long, value_parser = parse_beam_value::<f64>)]
        gantry: Vec<(usize, f64)>,
        /// Collimator angle of a beam, as INDEX=DEGREES
        #[arg(long, value_parser = parse_beam_value::<f64>)]
        collimator: Vec<(usize, f64)>,
        /// Portal distance below isocenter of a beam in whole cm, as INDEX=CM
        #[arg(long, value_parser = parse_beam_value::<i32>)]
        portal: Vec<(usize, i32)>,
        /// Replace a non-QA tolerance table with T_QA
        #[arg(long)]
        qa_tolerance: bool,
        /// Also write the `_private` file with the annex appended
        #[arg(long)]
        annex: bool,
    },
    /// Append the private annex after the APPROVED marker of a written plan
    Annex {
        plan: PathBuf,
    },
}

fn parse_beam_value<T>(s: &str) -> Result<(usize, T), String>
where
    T: FromStr,
    T::Err: Display,
{
    let (index, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=VALUE, got '{s}'"))?;
    let index = index
        .trim()
        .parse()
        .map_err(|e| format!("invalid beam index '{index}': {e}"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value '{value}': {e}"))?;
    Ok((index, value))
}

fn inspect(plan: PathBuf) -> anyhow::Result<()> {
    let plan = PlanIo::open(&plan).with_context(|| format!("loading {}", plan.display()))?;
    println!(
        "Patient: {} ({})",
        plan.patient_name().unwrap_or_default(),
        plan.patient_id().unwrap_or_default()
    );
    println!("Plan: {}", plan.label().unwrap_or_default());
    println!("Approval: {}", plan.approval_status().unwrap_or_default());
    println!("Encoding: {:?}", plan.encoding());
    for table in plan.tolerance_tables()? {
        println!(
            "Tolerance table {}: {}",
            table.number()?,
            table.label().unwrap_or_default()
        );
    }
    for (index, beam) in plan.beams()?.iter().enumerate() {
        println!(
            "Beam {index} ({}): machine {}, gantry {}, collimator {}, tolerance {:?}, portal {:?}",
            beam.display_name(),
            beam.treatment_machine_name()?,
            beam.gantry_angle()?,
            beam.collimator_angle()?,
            beam.referenced_tolerance_table_number()?,
            beam.portal_distances()?
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtplan_retarget=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::resolve(cli.profiles, cli.annex_file);

    match cli.command {
        Commands::Inspect { plan } => inspect(plan)?,
        Commands::Modify {
            plan: input,
            machine,
            gantry,
            collimator,
            portal,
            qa_tolerance,
            annex,
        } => {
            let machine = MachineSelection::from(machine);
            let store = match machine {
                MachineSelection::Keep => Default::default(),
                MachineSelection::Machine(_) => config.template_store()?,
            };
            let plan =
                PlanIo::open(&input).with_context(|| format!("loading {}", input.display()))?;
            let request = EditRequest {
                machine,
                gantry_angles: BTreeMap::from_iter(gantry),
                collimator_angles: BTreeMap::from_iter(collimator),
                portal_distances: BTreeMap::from_iter(portal),
                adopt_qa_tolerance: qa_tolerance,
            };
            let outcome = workflow::apply(&plan, &store, &request)?;

            let output = PlanIo::output_path(&input, OutputKind::Modified);
            PlanIo::save(&outcome.plan, &output)?;
            println!("{}", outcome.summary());
            println!("Modified plan saved to: {}", output.display());

            if annex {
                let private = trailer::patch_file(&output, &config.read_annex()?)?;
                println!("Private annex saved to: {}", private.display());
            }
        }
        Commands::Annex { plan } => {
            let private = trailer::patch_file(&plan, &config.read_annex()?)?;
            println!("Private annex saved to: {}", private.display());
        }
    }

    Ok(())
}
