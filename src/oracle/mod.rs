//! Rate-oracle collaborator: turns an energy change and a KRA barrier into
//! an attempt frequency for one candidate jump. `BuiltinOracle` evaluates
//! the closed-form Arrhenius expression directly; `ExternalOracle` shells
//! out to a LAMMPS/NEB-style barrier calculator the same way the teacher's
//! `GulpEvaluator` pipes a structure through an external relaxation code.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use log::debug;

use crate::error::OracleError;

/// Computes an attempt rate for a candidate vacancy jump from its energy
/// change and KRA barrier. `spec_b` is the species ending up at the jump's
/// destination site (the species the prefactor `ν[spec_b]` is keyed on).
pub trait RateOracle: Send + Sync {
    fn rate(&self, beta: f64, delta_e: f64, delta_kra: f64, spec_b: usize) -> Result<f64, OracleError>;
    fn name(&self) -> &str;
}

/// The closed-form rate `ν[specB] * exp(-β(½ΔE + ΔE_KRA))`, with a per-species
/// attempt-frequency table (`attempt_frequencies[vacSpec]` must be zero since
/// the vacancy itself never "moves into" a site).
#[derive(Debug, Clone)]
pub struct BuiltinOracle {
    pub attempt_frequencies: Vec<f64>,
}

impl BuiltinOracle {
    pub fn new(attempt_frequencies: Vec<f64>) -> Self {
        Self { attempt_frequencies }
    }
}

impl RateOracle for BuiltinOracle {
    fn rate(&self, beta: f64, delta_e: f64, delta_kra: f64, spec_b: usize) -> Result<f64, OracleError> {
        let barrier = 0.5 * delta_e + delta_kra;
        Ok(self.attempt_frequencies[spec_b] * (-beta * barrier).exp())
    }

    fn name(&self) -> &str {
        "builtin"
    }
}

/// Shells out to an external barrier calculator (NEB/LAMMPS-style) that
/// reads `beta`, `delta_e`, `delta_kra` on stdin and writes a single
/// `rate: <value>` line to stdout, mirroring the teacher's subprocess-pipe
/// pattern for relaxation codes.
pub struct ExternalOracle {
    executable: PathBuf,
    args: Vec<String>,
}

impl ExternalOracle {
    pub fn new(executable: PathBuf, args: Vec<String>) -> Self {
        Self { executable, args }
    }

    fn run(&self, beta: f64, delta_e: f64, delta_kra: f64, spec_b: usize) -> Result<String, OracleError> {
        let mut child = Command::new(&self.executable)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OracleError::ProcessFailed(format!("failed to spawn oracle: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload =
                format!("beta {beta:.17e}\ndelta_e {delta_e:.17e}\ndelta_kra {delta_kra:.17e}\nspec_b {spec_b}\n");
            stdin
                .write_all(payload.as_bytes())
                .map_err(|e| OracleError::ProcessFailed(format!("failed to write oracle stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| OracleError::ProcessFailed(format!("failed to read oracle output: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OracleError::ProcessFailed(stderr.into_owned()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn parse_rate(output: &str) -> Result<f64, OracleError> {
        for line in output.lines() {
            let lower = line.to_ascii_lowercase();
            if let Some(rest) = lower.strip_prefix("rate") {
                if let Some(value) = rest.split_whitespace().next() {
                    if let Ok(v) = value.parse::<f64>() {
                        return Ok(v);
                    }
                }
            }
        }
        Err(OracleError::UnparseableOutput)
    }
}

impl RateOracle for ExternalOracle {
    fn rate(&self, beta: f64, delta_e: f64, delta_kra: f64, spec_b: usize) -> Result<f64, OracleError> {
        debug!("invoking external oracle {:?}", self.executable);
        let output = self.run(beta, delta_e, delta_kra, spec_b)?;
        Self::parse_rate(&output)
    }

    fn name(&self) -> &str {
        "external"
    }
}
