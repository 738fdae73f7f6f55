pub mod enumerator;
pub mod interactions;
pub mod kra;
pub mod pipeline;
pub mod vector_basis;
