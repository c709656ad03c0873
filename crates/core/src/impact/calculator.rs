use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const CO2_LBS_PER_LB: f64 = 3.8;
pub const MEALS_PER_LB: f64 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactFigures {
    pub food_saved_lbs: f64,
    pub co2_avoided_lbs: f64,
    pub meals_provided: u64,
}

/// Derives impact figures from a canonical mass in pounds.
pub fn compute_impact(canonical_mass: f64) -> Result<ImpactFigures, DomainError> {
    if !canonical_mass.is_finite() || canonical_mass < 0.0 {
        return Err(DomainError::ImpactOutOfDomain { value: canonical_mass });
    }

    Ok(ImpactFigures {
        food_saved_lbs: canonical_mass,
        co2_avoided_lbs: canonical_mass * CO2_LBS_PER_LB,
        meals_provided: (canonical_mass * MEALS_PER_LB).floor() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::compute_impact;
    use crate::errors::DomainError;
    use crate::impact::to_canonical_mass;

    #[test]
    fn ten_kilograms_example() {
        let mass = to_canonical_mass(10.0, "kg").expect("kg is supported");
        let figures = compute_impact(mass).expect("in domain");

        assert!((figures.food_saved_lbs - 22.0462).abs() < 1e-9);
        assert!((figures.co2_avoided_lbs - 83.77556).abs() < 1e-6);
        assert_eq!(figures.meals_provided, 33);
    }

    #[test]
    fn formulas_hold_across_inputs() {
        for mass in [0.0, 0.4, 0.66, 1.0, 7.25, 19.999, 1_000.0] {
            let figures = compute_impact(mass).expect("in domain");
            assert_eq!(figures.co2_avoided_lbs, mass * 3.8);
            assert_eq!(figures.meals_provided, (mass * 1.5).floor() as u64);
        }
    }

    #[test]
    fn zero_mass_yields_zero_meals() {
        let figures = compute_impact(0.0).expect("zero is in domain");
        assert_eq!(figures.co2_avoided_lbs, 0.0);
        assert_eq!(figures.meals_provided, 0);
    }

    #[test]
    fn negative_and_non_finite_inputs_are_rejected() {
        for value in [-0.01, -5.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let error = compute_impact(value).expect_err("out of domain");
            assert!(matches!(error, DomainError::ImpactOutOfDomain { .. }), "{value}");
        }
    }
}
