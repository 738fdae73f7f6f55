//! Species alphabet: the chemistry side of the data model (spec §3).

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesAlphabet {
    /// Human-readable labels, one per species index; purely cosmetic.
    pub names: Vec<String>,
    /// The one distinguished species index that represents the vacancy.
    pub vac_spec: usize,
}

impl SpeciesAlphabet {
    pub fn new(names: Vec<String>, vac_spec: usize) -> Result<Self, BuildError> {
        if vac_spec >= names.len() {
            return Err(BuildError::MissingCoefficient(vac_spec));
        }
        Ok(Self { names, vac_spec })
    }

    pub fn num_species(&self) -> usize {
        self.names.len()
    }

    pub fn is_vacancy(&self, spec: usize) -> bool {
        spec == self.vac_spec
    }
}
