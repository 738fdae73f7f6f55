pub mod cluster;
pub mod lattice;
pub mod species;
pub mod symmetry;
