//! Quantity normalization into canonical pounds.

use crate::domain::listing::{Quantity, QuantityUnit};
use crate::errors::DomainError;

const LBS_PER_KG: f64 = 2.20462;
const LBS_PER_SERVING: f64 = 0.5;
const LBS_PER_ITEM: f64 = 0.75;

fn factor(unit: QuantityUnit) -> f64 {
    match unit {
        QuantityUnit::Kilograms => LBS_PER_KG,
        QuantityUnit::Pounds => 1.0,
        QuantityUnit::Servings => LBS_PER_SERVING,
        QuantityUnit::Items => LBS_PER_ITEM,
    }
}

pub fn canonical_mass(quantity: Quantity) -> f64 {
    quantity.amount * factor(quantity.unit)
}

/// Converts an untyped `(amount, unit tag)` pair; unknown tags fail with
/// [`DomainError::UnsupportedUnit`].
pub fn to_canonical_mass(amount: f64, unit: &str) -> Result<f64, DomainError> {
    let unit = unit.parse::<QuantityUnit>()?;
    Ok(canonical_mass(Quantity { amount, unit }))
}

#[cfg(test)]
mod tests {
    use super::{canonical_mass, to_canonical_mass};
    use crate::domain::listing::{Quantity, QuantityUnit};
    use crate::errors::DomainError;

    const UNITS: [QuantityUnit; 4] =
        [QuantityUnit::Kilograms, QuantityUnit::Pounds, QuantityUnit::Servings, QuantityUnit::Items];

    #[test]
    fn conversion_table() {
        assert!((to_canonical_mass(10.0, "kg").expect("kg") - 22.0462).abs() < 1e-9);
        assert_eq!(to_canonical_mass(10.0, "lbs").expect("lbs"), 10.0);
        assert_eq!(to_canonical_mass(10.0, "servings").expect("servings"), 5.0);
        assert_eq!(to_canonical_mass(10.0, "items").expect("items"), 7.5);
    }

    #[test]
    fn unknown_unit_is_rejected() {
        let error = to_canonical_mass(1.0, "pallets").expect_err("pallets unsupported");
        assert!(matches!(error, DomainError::UnsupportedUnit(ref unit) if unit == "pallets"));
    }

    #[test]
    fn monotonic_in_quantity() {
        let amounts = [0.0, 0.25, 1.0, 3.5, 10.0, 250.0, 10_000.0];
        for unit in UNITS {
            let masses: Vec<f64> = amounts
                .iter()
                .map(|amount| canonical_mass(Quantity { amount: *amount, unit }))
                .collect();
            assert!(masses.windows(2).all(|pair| pair[0] < pair[1]), "{unit:?}: {masses:?}");
        }
    }

    #[test]
    fn independent_of_call_order() {
        let inputs = [
            Quantity { amount: 4.0, unit: QuantityUnit::Items },
            Quantity { amount: 2.0, unit: QuantityUnit::Kilograms },
            Quantity { amount: 9.0, unit: QuantityUnit::Servings },
        ];
        let forward: Vec<f64> = inputs.iter().copied().map(canonical_mass).collect();
        let mut backward: Vec<f64> = inputs.iter().rev().copied().map(canonical_mass).collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }
}
