//! Fixed-point money arithmetic. All amounts are `Decimal`, two places,
//! banker's rounding.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{Tax, TaxComputation};

/// Round to cents (half-to-even) and normalize the scale to exactly 2.
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(2);
    rounded
}

/// Exclusive upper bound for stored amounts, 10^12 (`NUMERIC(14, 2)`).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Exclusive upper bound for quantities, 10^10 (`NUMERIC(14, 4)`).
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(0x540B_E400, 0x2, 0, false, 0);

/// Exclusive upper bound for tax rates, 10^8 (`NUMERIC(12, 4)`).
pub const MAX_TAX_RATE: Decimal = Decimal::from_parts(0x05F5_E100, 0, 0, false, 0);

fn storable(value: Decimal) -> Option<Decimal> {
    let rounded = round2(value);
    (rounded.abs() < MAX_AMOUNT).then_some(rounded)
}

/// `quantity × unit_price`, rounded. `None` when the product overflows or
/// does not fit an amount column.
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Option<Decimal> {
    quantity.checked_mul(unit_price).and_then(storable)
}

/// Tax owed on a line. Percentage taxes apply to the rounded line total,
/// fixed taxes are charged per unit.
pub fn line_tax(tax: &Tax, quantity: Decimal, line_total: Decimal) -> Option<Decimal> {
    let raw = match tax.computation {
        TaxComputation::Percentage => line_total
            .checked_mul(tax.rate)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED)),
        TaxComputation::Fixed => tax.rate.checked_mul(quantity),
    };
    raw.and_then(storable)
}

/// Sum of stored amounts. Report aggregation over bounded columns.
pub fn sum<I>(values: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    round2(values.into_iter().fold(Decimal::ZERO, |acc, v| acc + v))
}

/// Sum that must itself fit an amount column.
pub fn checked_sum<I>(values: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .and_then(storable)
}

/// Whether `value` is representable in cents without rounding.
pub fn has_at_most_two_places(value: &Decimal) -> bool {
    value.normalize().scale() <= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaxApplicability;
    use chrono::Utc;
    use std::str::FromStr;
    use uuid::Uuid;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn tax(computation: TaxComputation, rate: &str) -> Tax {
        Tax {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            name: "T".to_string(),
            computation,
            rate: d(rate),
            applicability: TaxApplicability::Sales,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn totals_match_reference_example() {
        let lines = [
            line_total(d("2"), d("99.99")).unwrap(),
            line_total(d("1"), d("50.00")).unwrap(),
        ];
        let total = sum(lines);
        assert_eq!(total, d("249.98"));
        assert_eq!(total.to_string(), "249.98");
    }

    #[test]
    fn rounding_is_half_even() {
        assert_eq!(round2(d("0.125")), d("0.12"));
        assert_eq!(round2(d("0.135")), d("0.14"));
        assert_eq!(round2(d("7")).to_string(), "7.00");
    }

    #[test]
    fn fractional_quantities_round_per_line() {
        // 0.333 × 3.00 = 0.999
        assert_eq!(line_total(d("0.333"), d("3.00")), Some(d("1.00")));
    }

    #[test]
    fn percentage_and_fixed_taxes() {
        let vat = tax(TaxComputation::Percentage, "18");
        assert_eq!(line_tax(&vat, d("2"), d("199.98")), Some(d("36.00")));

        let levy = tax(TaxComputation::Fixed, "0.50");
        assert_eq!(line_tax(&levy, d("3"), d("30.00")), Some(d("1.50")));
    }

    #[test]
    fn limits_match_column_precision() {
        assert_eq!(MAX_AMOUNT, d("1000000000000"));
        assert_eq!(MAX_QUANTITY, d("10000000000"));
        assert_eq!(MAX_TAX_RATE, d("100000000"));
    }

    #[test]
    fn oversized_products_are_rejected_instead_of_panicking() {
        // Overflows the 96-bit mantissa outright.
        assert_eq!(line_total(d("100000000000000"), d("100000000000000000.00")), None);
        // Fits a Decimal but not an amount column.
        assert_eq!(line_total(d("9999999999"), d("999.99")), None);
        assert_eq!(line_total(d("9999"), d("99999999.99")), Some(d("999899999900.01")));

        let levy = tax(TaxComputation::Fixed, "99999999.9999");
        assert_eq!(line_tax(&levy, d("9999999999"), d("1.00")), None);
    }

    #[test]
    fn checked_sum_stops_at_the_column_limit() {
        assert_eq!(checked_sum([d("1.10"), d("2.20")]), Some(d("3.30")));
        assert_eq!(checked_sum([d("999999999999.99"), d("0.01")]), None);
        assert_eq!(checked_sum([Decimal::MAX, Decimal::MAX]), None);
    }

    #[test]
    fn cents_precision_check() {
        assert!(has_at_most_two_places(&d("12.50")));
        assert!(has_at_most_two_places(&d("12.500")));
        assert!(!has_at_most_two_places(&d("12.505")));
    }
}
