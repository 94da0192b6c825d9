//! Core data model types for csmt

mod hash;

pub use hash::Hash;
