//! The totally ordered value domain (§3 "Value range") that keys and range
//! tokens are built from.
//!
//! The engine-supplied value type itself — its primitive encoding, its
//! `Text`/`Value` variants — is out of scope (§1): this module only states
//! the contract (§6) the core requires of it, `Scalar`, and the
//! `Value ∪ {±∞}` domain every range expansion in §4.G operates over,
//! `Endpoint`.

use std::cmp::Ordering;

/// The contract the surrounding storage engine's value type must satisfy for
/// this crate to index it: a total order and a stable byte serialization
/// (§6 "Value contract"). Implementations are expected to be cheap to clone,
/// the way the teacher's own `storage::types::Value` uses `Arc` internally
/// for its `Text`/`Binary` variants.
pub trait Scalar: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Three-way comparison within the domain's total order.
    fn compare(&self, other: &Self) -> Ordering;

    /// Stable bytes for this value, used both to build the digest behind
    /// [`crate::range::RangeToken`] equality/hashing and for its wire
    /// format (§3).
    fn to_bytes(&self) -> Vec<u8>;

    /// Parse a value back out of bytes produced by [`Scalar::to_bytes`].
    /// Returns `None` on malformed input.
    fn from_bytes(bytes: &[u8]) -> Option<Self>
    where
        Self: Sized;
}

impl Scalar for i64 {
    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self::from_be_bytes(bytes.try_into().ok()?))
    }
}

impl Scalar for String {
    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok().map(ToOwned::to_owned)
    }
}

/// A single point in `Value ∪ {−∞, +∞}` (§3). Range tokens store arrays of
/// these, not bare `V`s, because the canonical expansion of `GT`/`GTE`/
/// `LT`/`LTE` (§4.G) widens a single supplied value into a `(value, ±∞)`
/// pair, and `REGEX`/`NOT_REGEX` replace their values outright with
/// `{−∞, +∞}`.
#[derive(Debug, Clone)]
pub enum Endpoint<V: Scalar> {
    /// The domain's least element, below every `V`.
    NegativeInfinity,
    /// A concrete engine value.
    Value(V),
    /// The domain's greatest element, above every `V`.
    PositiveInfinity,
}

impl<V: Scalar> Endpoint<V> {
    /// Three-way comparison within `Value ∪ {±∞}`.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::NegativeInfinity, Self::NegativeInfinity)
            | (Self::PositiveInfinity, Self::PositiveInfinity) => Ordering::Equal,
            (Self::NegativeInfinity, _) | (_, Self::PositiveInfinity) => Ordering::Less,
            (_, Self::NegativeInfinity) | (Self::PositiveInfinity, _) => Ordering::Greater,
            (Self::Value(a), Self::Value(b)) => a.compare(b),
        }
    }

    /// Stable bytes, used to build a [`crate::range::RangeToken`]'s digest.
    /// A one-byte discriminant precedes the value's own bytes so that, e.g.,
    /// the sentinel and an engine value whose bytes happen to be empty
    /// never collide.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::NegativeInfinity => vec![0],
            Self::Value(v) => {
                let mut bytes = vec![1];
                bytes.extend(v.to_bytes());
                bytes
            }
            Self::PositiveInfinity => vec![2],
        }
    }

    /// Parse an endpoint back out of bytes produced by
    /// [`Endpoint::to_bytes`].
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.split_first()? {
            (0, []) => Some(Self::NegativeInfinity),
            (1, rest) => Some(Self::Value(V::from_bytes(rest)?)),
            (2, []) => Some(Self::PositiveInfinity),
            _ => None,
        }
    }

    /// The concrete value, or `None` for either sentinel.
    pub fn as_value(&self) -> Option<&V> {
        match self {
            Self::Value(v) => Some(v),
            Self::NegativeInfinity | Self::PositiveInfinity => None,
        }
    }
}

impl<V: Scalar> PartialEq for Endpoint<V> {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl<V: Scalar> Eq for Endpoint<V> {}

impl<V: Scalar> PartialOrd for Endpoint<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl<V: Scalar> Ord for Endpoint<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

/// A half-open (or fully closed/open at the sentinels) interval over
/// `Value ∪ {±∞}`, the shape every row of the §4.G table expands into.
#[derive(Debug, Clone)]
pub struct Interval<V: Scalar> {
    /// Lower bound.
    pub lo: Endpoint<V>,
    /// Whether `lo` itself is part of the interval.
    pub lo_inclusive: bool,
    /// Upper bound.
    pub hi: Endpoint<V>,
    /// Whether `hi` itself is part of the interval.
    pub hi_inclusive: bool,
}

impl<V: Scalar> PartialEq for Interval<V> {
    fn eq(&self, other: &Self) -> bool {
        self.lo == other.lo
            && self.lo_inclusive == other.lo_inclusive
            && self.hi == other.hi
            && self.hi_inclusive == other.hi_inclusive
    }
}

impl<V: Scalar> Eq for Interval<V> {}

impl<V: Scalar> Interval<V> {
    /// A degenerate, single-point interval `[v, v]` — the expansion of
    /// `EQUALS` and of a write's implicit null operator (§4.G).
    #[must_use]
    pub fn point(v: Endpoint<V>) -> Self {
        Self {
            lo: v.clone(),
            lo_inclusive: true,
            hi: v,
            hi_inclusive: true,
        }
    }

    /// Whether `self` and `other` share at least one point of the domain
    /// (§4.A "share at least one Value in the total order").
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !Self::strictly_before(&self.hi, self.hi_inclusive, &other.lo, other.lo_inclusive)
            && !Self::strictly_before(&other.hi, other.hi_inclusive, &self.lo, self.lo_inclusive)
    }

    /// Whether the point `v` falls within this interval.
    #[must_use]
    pub fn contains_point(&self, v: &Endpoint<V>) -> bool {
        let above_lo = match self.lo.compare(v) {
            Ordering::Less => true,
            Ordering::Equal => self.lo_inclusive,
            Ordering::Greater => false,
        };
        let below_hi = match self.hi.compare(v) {
            Ordering::Greater => true,
            Ordering::Equal => self.hi_inclusive,
            Ordering::Less => false,
        };
        above_lo && below_hi
    }

    /// `true` iff the region ending at `(hi, hi_inclusive)` lies entirely
    /// before the region starting at `(lo, lo_inclusive)`, i.e. they cannot
    /// share a point.
    fn strictly_before(hi: &Endpoint<V>, hi_inclusive: bool, lo: &Endpoint<V>, lo_inclusive: bool) -> bool {
        match hi.compare(lo) {
            Ordering::Less => true,
            Ordering::Equal => !(hi_inclusive && lo_inclusive),
            Ordering::Greater => false,
        }
    }
}
