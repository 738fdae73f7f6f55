//! Trajectory checkpoints: a typed record of everything needed to resume a
//! run, flushed via write-to-temp-then-rename so a crash mid-write never
//! leaves a corrupt checkpoint in the run's place.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use nalgebra::Vector3;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::compiler::interactions::InteractionTables;
use crate::core::species::SpeciesAlphabet;
use crate::sampler::expansion::VectorExpansionAccumulator;
use crate::sampler::state::{OffSiteCounts, State};

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub step: u64,
    pub occupancy: Vec<usize>,
    pub total_time: f64,
    pub atom_cumulative_displacement: Vec<[f64; 3]>,
    pub w_bar: Vec<f64>,
    pub b_bar: Vec<f64>,
    pub expansion_total_time: f64,
    pub rng: ChaCha8Rng,
    /// Whether `off` was cross-checked against a full recount before this
    /// checkpoint was written; a reload never trusts this flag and always
    /// rebuilds `off` from scratch, but it is kept for diagnostics.
    pub off_was_validated: bool,
}

impl CheckpointRecord {
    pub fn capture(
        step: u64,
        state: &State,
        total_time: f64,
        atom_cumulative_displacement: &[Vector3<f64>],
        expansion: &VectorExpansionAccumulator,
        rng: &ChaCha8Rng,
        off_was_validated: bool,
    ) -> Self {
        Self {
            step,
            occupancy: state.occupancy.clone(),
            total_time,
            atom_cumulative_displacement: atom_cumulative_displacement
                .iter()
                .map(|v| [v.x, v.y, v.z])
                .collect(),
            w_bar: expansion.w_bar.clone(),
            b_bar: expansion.b_bar.clone(),
            expansion_total_time: expansion.total_time,
            rng: rng.clone(),
            off_was_validated,
        }
    }

    /// Rebuilds a `State`, freshly recounted `OffSiteCounts`, and the
    /// expansion accumulator from this record (spec-mandated: checkpoints
    /// never trust an incrementally maintained `off` vector on reload).
    pub fn restore(
        &self,
        species: &SpeciesAlphabet,
        tables: &InteractionTables,
    ) -> Result<(State, OffSiteCounts, VectorExpansionAccumulator), crate::error::BuildError> {
        let state = State::new(self.occupancy.clone(), species.num_species(), species.vac_spec)?;
        let off = OffSiteCounts::recompute(&state, tables);
        let dim = self.b_bar.len();
        let mut expansion = VectorExpansionAccumulator::new(dim);
        expansion.total_time = self.expansion_total_time;
        expansion.w_bar.copy_from_slice(&self.w_bar);
        expansion.b_bar.copy_from_slice(&self.b_bar);
        Ok((state, off, expansion))
    }

    pub fn atom_displacements(&self) -> Vec<Vector3<f64>> {
        self.atom_cumulative_displacement
            .iter()
            .map(|a| Vector3::new(a[0], a[1], a[2]))
            .collect()
    }
}

/// Writes `record` to `path` via a temp file in the same directory followed
/// by a rename, so a reader never observes a partially written checkpoint.
pub fn save(path: &Path, record: &CheckpointRecord) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, record).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn load(path: &Path) -> io::Result<CheckpointRecord> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
