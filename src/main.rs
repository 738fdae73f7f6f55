use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use vkmc_core::compiler::pipeline::{self, CompiledSystem, CompilerInput};
use vkmc_core::error::{InvariantViolation, OracleError};
use vkmc_core::oracle::{BuiltinOracle, ExternalOracle, RateOracle};
use vkmc_core::sampler::checkpoint::{self, CheckpointRecord};
use vkmc_core::sampler::expansion::{self, VectorExpansionAccumulator};
use vkmc_core::sampler::kmc::{self, AtomTracker, JumpOutcome};
use vkmc_core::sampler::state::{OffSiteCounts, State};
use vkmc_core::sampler::sweep;

#[derive(Parser, Debug)]
#[command(author, version, about = "Vacancy-mediated kinetic Monte Carlo sampler for a compiled vector cluster expansion", long_about = None)]
struct Args {
    /// Path to the compiled cluster-expansion configuration (JSON).
    #[arg(long)]
    input: PathBuf,

    /// Raises the default log filter to `debug` (overridden by `RUST_LOG`).
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Equilibrates the configuration with Metropolis sweeps at a fixed temperature.
    Thermalise(RunArgs),
    /// Runs residence-time KMC trajectories and reports displacement statistics.
    Trajectory(RunArgs),
    /// Runs KMC trajectories while accumulating the vector cluster expansion (W̄, b̄).
    Expand(RunArgs),
}

#[derive(Parser, Debug, Clone)]
struct RunArgs {
    /// Temperature in the same energy units as the compiled coefficients (k_B = 1).
    #[arg(long)]
    temp: f64,

    /// Number of sweep attempts (thermalise) or jumps (trajectory/expand) per trajectory.
    #[arg(long)]
    nsteps: u64,

    /// Number of independent trajectories to run concurrently.
    #[arg(long, default_value_t = 1)]
    batch: usize,

    /// Steps between checkpoint flushes; defaults to flushing once at the end.
    #[arg(long)]
    chunk: Option<u64>,

    /// RNG seed; trajectory `i` in a batch seeds from `seed` mixed with `i`.
    #[arg(long)]
    seed: u64,

    /// Checkpoint path. With `--batch > 1`, trajectory index is appended as a suffix.
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Rate oracle used by `trajectory`/`expand` (ignored by `thermalise`).
    #[arg(long, value_enum, default_value = "builtin")]
    rate_oracle: RateOracleKind,

    /// Executable invoked per jump when `--rate-oracle external` is selected.
    #[arg(long)]
    oracle_cmd: Option<PathBuf>,

    /// Species index `W̄`/`b̄` are projected onto (`expand` only); defaults
    /// to the vacancy species (ordinary tracer correlation).
    #[arg(long)]
    observed_species: Option<usize>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum RateOracleKind {
    Builtin,
    External,
}

fn load_input(path: &Path) -> Result<CompilerInput> {
    let file = File::open(path).with_context(|| format!("opening compiler input {path:?}"))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).with_context(|| format!("parsing compiler input {path:?}"))
}

fn build_oracle(system: &CompiledSystem, args: &RunArgs) -> Result<Box<dyn RateOracle>> {
    match args.rate_oracle {
        RateOracleKind::Builtin => Ok(Box::new(BuiltinOracle::new(system.rate_prefactors.clone()))),
        RateOracleKind::External => {
            let exe = args
                .oracle_cmd
                .clone()
                .context("--rate-oracle external requires --oracle-cmd")?;
            Ok(Box::new(ExternalOracle::new(exe, Vec::new())))
        }
    }
}

fn checkpoint_path_for(base: &Path, index: usize, batch: usize) -> PathBuf {
    if batch <= 1 {
        base.to_path_buf()
    } else {
        base.with_extension(format!("{index}.json"))
    }
}

/// Starting point for a trajectory: either a freshly seeded state at step 0,
/// or everything restored from an existing checkpoint file. A checkpoint
/// that exists but fails to parse or restore is reported as a corrupt
/// checkpoint (exit code 2), never silently discarded.
struct Resumed {
    step: u64,
    state: State,
    off: OffSiteCounts,
    total_time: f64,
    atoms: AtomTracker,
    accumulator: VectorExpansionAccumulator,
}

fn resume_or_init(system: &CompiledSystem, input: &CompilerInput, args: &RunArgs, index: usize, dim: usize) -> Result<Resumed, TrajectoryFailure> {
    let path = args.checkpoint.as_ref().map(|base| checkpoint_path_for(base, index, args.batch));
    if let Some(path) = &path {
        if path.exists() {
            let record = checkpoint::load(path).map_err(|e| TrajectoryFailure::Checkpoint(e.to_string()))?;
            let (state, off, accumulator) = record
                .restore(&system.species, &system.tables)
                .map_err(|e| TrajectoryFailure::Checkpoint(e.to_string()))?;
            let mut atoms = AtomTracker::new(state.num_sites());
            atoms.cumulative_displacement = record.atom_displacements();
            return Ok(Resumed {
                step: record.step,
                state,
                off,
                total_time: record.total_time,
                atoms,
                accumulator,
            });
        }
    }

    let state = State::new(input.initial_occupancy.clone(), system.species.num_species(), system.species.vac_spec)
        .map_err(|e| TrajectoryFailure::Invariant(InvariantViolation::VacancyCountNotOne(0)).tap_log(&e))?;
    let off = OffSiteCounts::recompute(&state, &system.tables);
    let atoms = AtomTracker::new(state.num_sites());
    Ok(Resumed {
        step: 0,
        state,
        off,
        total_time: 0.0,
        atoms,
        accumulator: VectorExpansionAccumulator::new(dim),
    })
}

/// What went wrong with one trajectory in a batch; aggregated by `main` into
/// a single process exit code (spec §6: 0 success, 2 corrupt checkpoint, 3
/// oracle failure, 1 a build/invariant failure aborting that trajectory).
#[derive(Debug)]
enum TrajectoryFailure {
    Checkpoint(String),
    Oracle(OracleError),
    Invariant(InvariantViolation),
}

fn worst_exit_code(failures: &[TrajectoryFailure]) -> u8 {
    if failures.iter().any(|f| matches!(f, TrajectoryFailure::Checkpoint(_))) {
        2
    } else if failures.iter().any(|f| matches!(f, TrajectoryFailure::Oracle(_))) {
        3
    } else if !failures.is_empty() {
        1
    } else {
        0
    }
}

fn run_thermalise(system: &CompiledSystem, input: &CompilerInput, index: usize, args: &RunArgs) -> Result<(), TrajectoryFailure> {
    let chunk = args.chunk.unwrap_or(args.nsteps).max(1);
    let beta = 1.0 / args.temp;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));

    let Resumed { step, mut state, mut off, .. } = resume_or_init(system, input, args, index, 0)?;

    let mut done = step;
    let target = step + args.nsteps;
    while done < target {
        let attempts = (target - done).min(chunk);
        let stats = sweep::sweep(&mut state, &mut off, &system.tables, system.species.num_species(), beta, attempts, &mut rng);
        log::info!(
            "trajectory {index}: thermalise chunk done, {}/{} accepted",
            stats.accepted,
            stats.attempts
        );
        sweep::check_offsite_invariant(&state, &off, &system.tables)
            .map_err(TrajectoryFailure::Invariant)?;
        done += attempts;

        if let Some(base) = &args.checkpoint {
            let path = checkpoint_path_for(base, index, args.batch);
            let record = CheckpointRecord::capture(
                done,
                &state,
                0.0,
                &vec![Vector3::zeros(); state.num_sites()],
                &VectorExpansionAccumulator::new(0),
                &rng,
                true,
            );
            checkpoint::save(&path, &record).map_err(|e| TrajectoryFailure::Checkpoint(e.to_string()))?;
        }
    }
    Ok(())
}

fn run_trajectory(system: &CompiledSystem, input: &CompilerInput, index: usize, args: &RunArgs) -> Result<(), TrajectoryFailure> {
    let oracle = build_oracle(system, args)
        .map_err(|e| TrajectoryFailure::Oracle(OracleError::ProcessFailed(e.to_string())))?;
    let chunk = args.chunk.unwrap_or(args.nsteps).max(1);
    let beta = 1.0 / args.temp;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));

    let Resumed { step, mut state, mut off, mut total_time, mut atoms, .. } = resume_or_init(system, input, args, index, 0)?;

    let mut done = step;
    let target = step + args.nsteps;
    'outer: while done < target {
        let this_chunk = (target - done).min(chunk);
        for _ in 0..this_chunk {
            let outcome = kmc::step(
                &mut state, &mut off, &system.tables, &system.kra, &system.jump_star,
                &system.crystal, &system.supercell, &mut atoms, oracle.as_ref(), beta, &mut rng,
            )
            .map_err(TrajectoryFailure::Oracle)?;
            match outcome {
                JumpOutcome::Jumped { dt, .. } => total_time += dt,
                JumpOutcome::Absorbing => {
                    log::warn!("trajectory {index}: reached an absorbing state at t={total_time}");
                    break 'outer;
                }
            }
        }
        state.check_vacancy_invariant().map_err(TrajectoryFailure::Invariant)?;
        done += this_chunk;
        log::info!("trajectory {index}: t={total_time}, {} jumps remaining", target - done);

        if let Some(base) = &args.checkpoint {
            let path = checkpoint_path_for(base, index, args.batch);
            let record = CheckpointRecord::capture(
                done,
                &state,
                total_time,
                &atoms.cumulative_displacement,
                &VectorExpansionAccumulator::new(0),
                &rng,
                true,
            );
            checkpoint::save(&path, &record).map_err(|e| TrajectoryFailure::Checkpoint(e.to_string()))?;
        }
    }
    Ok(())
}

fn run_expand(system: &CompiledSystem, input: &CompilerInput, index: usize, args: &RunArgs) -> Result<(), TrajectoryFailure> {
    let oracle = build_oracle(system, args)
        .map_err(|e| TrajectoryFailure::Oracle(OracleError::ProcessFailed(e.to_string())))?;
    let chunk = args.chunk.unwrap_or(args.nsteps).max(1);
    let beta = 1.0 / args.temp;
    let dim = system.vector_dim().max(1);
    let observed_species = args.observed_species.unwrap_or(system.species.vac_spec);
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));

    let Resumed { step, mut state, mut off, mut atoms, mut accumulator, .. } = resume_or_init(system, input, args, index, dim)?;

    let mut done = step;
    let target = step + args.nsteps;
    'outer: while done < target {
        let this_chunk = (target - done).min(chunk);
        for _ in 0..this_chunk {
            let outcome = expansion::step_and_accumulate(
                &mut state, &mut off, &system.tables, &system.kra, &system.jump_star,
                &system.crystal, &system.supercell, &mut atoms, oracle.as_ref(), beta,
                observed_species, &mut accumulator, &mut rng,
            )
            .map_err(TrajectoryFailure::Oracle)?;
            if matches!(outcome, JumpOutcome::Absorbing) {
                log::warn!("trajectory {index}: reached an absorbing state at t={}", accumulator.total_time);
                break 'outer;
            }
        }
        state.check_vacancy_invariant().map_err(TrajectoryFailure::Invariant)?;
        debug_assert!(accumulator.asymmetry() < 1e-6);
        done += this_chunk;
        log::info!("trajectory {index}: t={}, {} jumps remaining", accumulator.total_time, target - done);

        if let Some(base) = &args.checkpoint {
            let path = checkpoint_path_for(base, index, args.batch);
            let record = CheckpointRecord::capture(
                done,
                &state,
                accumulator.total_time,
                &atoms.cumulative_displacement,
                &accumulator,
                &rng,
                true,
            );
            checkpoint::save(&path, &record).map_err(|e| TrajectoryFailure::Checkpoint(e.to_string()))?;
        }
    }
    Ok(())
}

/// Small helper so the `InvariantViolation` placeholder constructed on a
/// `BuildError` from `State::new` still logs the real cause.
trait TapLog {
    fn tap_log(self, cause: &dyn std::fmt::Display) -> Self;
}

impl TapLog for TrajectoryFailure {
    fn tap_log(self, cause: &dyn std::fmt::Display) -> Self {
        log::error!("failed to construct initial state: {cause}");
        self
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let input = match load_input(&args.input) {
        Ok(input) => input,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::from(1);
        }
    };

    let system = match pipeline::compile(&input) {
        Ok(system) => system,
        Err(e) => {
            log::error!("failed to compile cluster expansion: {e}");
            return ExitCode::from(1);
        }
    };
    log::info!(
        "compiled {} decorated orbits into {} interactions, vector dimension {}",
        system.decorated_orbits.len(),
        system.tables.num_interactions(),
        system.vector_dim()
    );

    let run_args = match &args.command {
        Command::Thermalise(a) | Command::Trajectory(a) | Command::Expand(a) => a.clone(),
    };

    let failures: Vec<TrajectoryFailure> = (0..run_args.batch)
        .into_par_iter()
        .filter_map(|index| {
            let result = match &args.command {
                Command::Thermalise(a) => run_thermalise(&system, &input, index, a),
                Command::Trajectory(a) => run_trajectory(&system, &input, index, a),
                Command::Expand(a) => run_expand(&system, &input, index, a),
            };
            result.err()
        })
        .collect();

    for failure in &failures {
        match failure {
            TrajectoryFailure::Checkpoint(msg) => log::error!("checkpoint failure: {msg}"),
            TrajectoryFailure::Oracle(e) => log::error!("oracle failure: {e}"),
            TrajectoryFailure::Invariant(e) => log::error!("invariant violation: {e}"),
        }
    }

    ExitCode::from(worst_exit_code(&failures))
}
