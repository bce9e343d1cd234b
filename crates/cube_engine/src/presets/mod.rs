//! Ready-to-use registries.
//!
//! - [`wind`]: onshore wind project finance (energy yield, merchant
//!   revenue, opex, senior debt)

pub mod wind;
