//! Domain layer: pure types, the ACH file model, and the ports the
//! orchestration core consumes.

pub mod ach;
pub mod codes;
pub mod cutoff;
pub mod filename;
pub mod ports;
pub mod records;
