//! Compile filter expressions over genomic variant records and evaluate them
//! against a variant store.

pub mod common;
pub mod err;
pub mod filter;
