pub mod calculator;
pub mod normalizer;

pub use calculator::{compute_impact, ImpactFigures, CO2_LBS_PER_LB, MEALS_PER_LB};
pub use normalizer::{canonical_mass, to_canonical_mass};
