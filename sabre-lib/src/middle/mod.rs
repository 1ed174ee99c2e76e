//! Middle layer: the simplified ABI IR and the lattice elements the
//! analyses compute over it.

pub mod ir;
pub mod lattice;
