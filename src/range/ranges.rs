//! Canonical range expansion (§4.G) — Component G.
//!
//! Every operator expands into one or two [`Interval`]s over
//! `Value ∪ {±∞}`. This expansion is the only semantic that ever decides a
//! blocking or intersection question past this point; operators themselves
//! are opaque once expanded (§3 "Value range").

use crate::range::Operator;
use crate::value::{Endpoint, Interval, Scalar};

/// Expand `operator` applied to `values` into its canonical range(s), per
/// the §4.G table.
///
/// `values` holds one value for every operator except `Between`, which
/// holds two already-ordered values. Callers are expected to have validated
/// arity already (`RangeToken` does this at construction); this function
/// panics on a length mismatch because it is never reachable from outside
/// the crate with an un-validated slice.
pub(crate) fn expand<V: Scalar>(operator: Operator, values: &[Endpoint<V>]) -> Vec<Interval<V>> {
    match operator {
        Operator::Regex | Operator::NotRegex => {}
        _ => assert_eq!(values.len(), operator.arity(), "value count does not match operator arity"),
    }
    match operator {
        Operator::Equals => vec![Interval::point(values[0].clone())],
        Operator::NotEquals => vec![
            Interval {
                lo: Endpoint::NegativeInfinity,
                lo_inclusive: true,
                hi: values[0].clone(),
                hi_inclusive: false,
            },
            Interval {
                lo: values[0].clone(),
                lo_inclusive: false,
                hi: Endpoint::PositiveInfinity,
                hi_inclusive: true,
            },
        ],
        Operator::GreaterThan => vec![Interval {
            lo: values[0].clone(),
            lo_inclusive: false,
            hi: Endpoint::PositiveInfinity,
            hi_inclusive: true,
        }],
        Operator::GreaterThanOrEquals => vec![Interval {
            lo: values[0].clone(),
            lo_inclusive: true,
            hi: Endpoint::PositiveInfinity,
            hi_inclusive: true,
        }],
        Operator::LessThan => vec![Interval {
            lo: Endpoint::NegativeInfinity,
            lo_inclusive: true,
            hi: values[0].clone(),
            hi_inclusive: false,
        }],
        Operator::LessThanOrEquals => vec![Interval {
            lo: Endpoint::NegativeInfinity,
            lo_inclusive: true,
            hi: values[0].clone(),
            hi_inclusive: true,
        }],
        Operator::Between => vec![Interval {
            lo: values[0].clone(),
            lo_inclusive: true,
            hi: values[1].clone(),
            hi_inclusive: false,
        }],
        Operator::Regex | Operator::NotRegex => vec![Interval {
            lo: Endpoint::NegativeInfinity,
            lo_inclusive: true,
            hi: Endpoint::PositiveInfinity,
            hi_inclusive: true,
        }],
    }
}

/// Whether any interval of `a` overlaps any interval of `b`. This single
/// function, applied to the canonical expansion of each side, reproduces
/// the full §4.A intersection matrix (including the `NOT_EQUALS` vs
/// same-point `EQUALS` exclusion and the conservative `BETWEEN` vs
/// `NOT_EQUALS` always-true case) without any operator-pair special-casing.
#[must_use]
pub(crate) fn any_overlap<V: Scalar>(a: &[Interval<V>], b: &[Interval<V>]) -> bool {
    a.iter().any(|ia| b.iter().any(|ib| ia.overlaps(ib)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: i64) -> Endpoint<i64> {
        Endpoint::Value(n)
    }

    #[test]
    fn not_equals_excludes_only_its_own_point() {
        let ranges = expand(Operator::NotEquals, &[v(6)]);
        let same_point = expand(Operator::Equals, &[v(6)]);
        let other_point = expand(Operator::Equals, &[v(7)]);
        assert!(!any_overlap(&ranges, &same_point));
        assert!(any_overlap(&ranges, &other_point));
    }

    #[test]
    fn between_vs_not_equals_always_overlaps() {
        // Conservative per the documented intersection matrix: BETWEEN vs
        // NOT_EQUALS behaves like BETWEEN vs anything.
        let between = expand(Operator::Between, &[v(3), v(8)]);
        let not_equals = expand(Operator::NotEquals, &[v(5)]);
        assert!(any_overlap(&between, &not_equals));
    }

    #[test]
    fn greater_than_excludes_the_boundary() {
        let gt = expand(Operator::GreaterThan, &[v(5)]);
        assert!(!any_overlap(&gt, &expand(Operator::Equals, &[v(5)])));
        assert!(any_overlap(&gt, &expand(Operator::Equals, &[v(6)])));
    }

    #[test]
    fn less_than_against_write_ten_does_not_block() {
        // S2: readLock(k, LESS_THAN, 5) vs writeLock(k, 10).
        let lt = expand(Operator::LessThan, &[v(5)]);
        let write = expand(Operator::Equals, &[v(10)]);
        assert!(!any_overlap(&lt, &write));
    }

    #[test]
    fn between_vs_its_open_upper_bound() {
        // S3: BETWEEN(3, 8) blocks write(5), admits write(8).
        let between = expand(Operator::Between, &[v(3), v(8)]);
        assert!(any_overlap(&between, &expand(Operator::Equals, &[v(5)])));
        assert!(!any_overlap(&between, &expand(Operator::Equals, &[v(8)])));
    }

    #[test]
    fn regex_intersects_everything() {
        let regex = expand(Operator::Regex, &[v(0)]);
        assert!(any_overlap(&regex, &expand(Operator::Equals, &[v(123_456)])));
        let not_regex = expand(Operator::NotRegex, &[v(0)]);
        assert!(any_overlap(&not_regex, &expand(Operator::NotEquals, &[v(0)])));
    }
}
