use thiserror::Error;

/// Static misconfiguration detected while compiling cluster/interaction tables.
/// Fatal: aborts the whole build, per spec (the tables are permanently wrong).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("species list length ({species_len}) does not match site list length ({sites_len})")]
    SpeciesAndSitesLengthMismatch { species_len: usize, sites_len: usize },

    #[error("duplicate interaction tuple produced during supercell translation (orbit {orbit}, site {site})")]
    DuplicateInteractionDuringTranslation { orbit: usize, site: usize },

    #[error("vacancy species {vac_spec} carries a nonzero KRA constant ({value})")]
    VacSpecConstantNonzero { vac_spec: usize, value: f64 },

    #[error("vacancy species {vac_spec} carries a nonzero rate prefactor ({value})")]
    VacSpecRatePrefactorNonzero { vac_spec: usize, value: f64 },

    #[error("non-diagonal supercells are unsupported (N must be a positive scalar)")]
    SupercellNondiagonalUnsupported,

    #[error("invalid supercell size N={0}, must be positive")]
    InvalidSupercellSize(i64),

    #[error("state must contain exactly one vacancy, found {0}")]
    VacancyCountNotOneAtInit(usize),

    #[error("jump network references basis index {0} outside the crystal's basis")]
    JumpBasisOutOfRange(usize),

    #[error("energy/KRA coefficient table is missing an entry for orbit {0}")]
    MissingCoefficient(usize),
}

/// Runtime guard failures. Aborts the current trajectory only; other
/// trajectories in a batch continue.
#[derive(Debug, Error)]
pub enum InvariantViolation {
    #[error("off-site count mismatch after sweep at interaction {interaction}: incremental={incremental}, recount={recount}")]
    OffCountMismatchAfterSweep {
        interaction: usize,
        incremental: i64,
        recount: i64,
    },

    #[error("sum of displacements nonzero after jump: {0:?}")]
    SumOfDisplacementsNonzeroAfterJump([f64; 3]),

    #[error("state contains {0} vacancies, expected exactly 1")]
    VacancyCountNotOne(usize),

    #[error("energy telescoping mismatch: incremental={incremental}, recount={recount}, tol={tol}")]
    EnergyMismatch { incremental: f64, recount: f64, tol: f64 },
}

/// External driver (LAMMPS/NEB-style rate oracle) failures. Fails only the
/// trajectory that invoked it.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle process exited with failure: {0}")]
    ProcessFailed(String),

    #[error("could not parse a forward barrier from oracle output")]
    UnparseableOutput,

    #[error("oracle call timed out")]
    Timeout,
}

/// Top-level error type a trajectory run can fail with. `Absorbing` is not
/// an error condition in the usual sense (see spec §7) and is represented
/// separately as a structured result, not part of this enum.
#[derive(Debug, Error)]
pub enum VkmcError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}
