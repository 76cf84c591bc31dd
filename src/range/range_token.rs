//! `RangeToken` (§3, §4.A) — Component A's range-scoped half.

use crate::error::{LockError, LockResult};
use crate::range::ranges;
use crate::range::Operator;
use crate::value::{Endpoint, Scalar};

const NULL_OPERATOR_BYTE: u8 = 0xFF;

/// Identity for a single range-scoped lock handed out by
/// [`crate::services::RangeLockService`] (§3).
///
/// Carries a `key`, an optional operator (`None` for a write), and one or
/// more values. Equality and hashing are entirely over the §3 wire format —
/// two tokens with the same key/operator/values are interchangeable no
/// matter how they were constructed.
#[derive(Debug, Clone)]
pub struct RangeToken<V: Scalar> {
    key: Vec<u8>,
    operator: Option<Operator>,
    values: Vec<Endpoint<V>>,
    wire_bytes: Vec<u8>,
}

impl<V: Scalar> RangeToken<V> {
    /// Build a read-side token. Validates arity for `operator`; widens
    /// `REGEX`/`NOT_REGEX` to the full value range (§3) since those
    /// operators carry no usable algebraic order.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidTokenShape`] if `values` does not match
    /// `operator`'s required arity (2 for `BETWEEN`, 1 otherwise), or if a
    /// `BETWEEN` pair is not strictly ordered `lo < hi`.
    pub fn for_read(key: impl Into<Vec<u8>>, operator: Operator, values: Vec<V>) -> LockResult<Self> {
        let key = key.into();
        let endpoints = match operator {
            Operator::Regex | Operator::NotRegex => {
                require_arity(operator, &values, 1)?;
                vec![Endpoint::NegativeInfinity, Endpoint::PositiveInfinity]
            }
            Operator::Between => {
                require_arity(operator, &values, 2)?;
                if values[0].compare(&values[1]) != std::cmp::Ordering::Less {
                    return Err(LockError::InvalidTokenShape(
                        "BETWEEN requires its two values ordered lo < hi".to_owned(),
                    ));
                }
                values.into_iter().map(Endpoint::Value).collect()
            }
            _ => {
                require_arity(operator, &values, 1)?;
                values.into_iter().map(Endpoint::Value).collect()
            }
        };
        Ok(Self::assemble(key, Some(operator), endpoints))
    }

    /// Build a write-side token: operator is always `null`, exactly one
    /// value (§3).
    #[must_use]
    pub fn for_write(key: impl Into<Vec<u8>>, value: V) -> Self {
        Self::assemble(key.into(), None, vec![Endpoint::Value(value)])
    }

    fn assemble(key: Vec<u8>, operator: Option<Operator>, values: Vec<Endpoint<V>>) -> Self {
        let wire_bytes = encode(&key, operator, &values);
        Self {
            key,
            operator,
            values,
            wire_bytes,
        }
    }

    /// The opaque key this token's range is scoped to.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The stored operator, or `None` for a write.
    #[must_use]
    pub const fn operator(&self) -> Option<Operator> {
        self.operator
    }

    /// The token's operator with `null` (write) treated as `EQUALS`, per
    /// §4.A "both sides convert null operator to EQUALS".
    #[must_use]
    pub fn effective_operator(&self) -> Operator {
        self.operator.unwrap_or(Operator::Equals)
    }

    /// The stored value endpoints.
    #[must_use]
    pub fn values(&self) -> &[Endpoint<V>] {
        &self.values
    }

    /// The single point a write-side token (or any single-value read-side
    /// token) carries.
    #[must_use]
    pub fn point(&self) -> Option<&Endpoint<V>> {
        match self.values.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// §3/§4.A wire-format bytes: `[operator_byte | 0xFF][len(key)][key]
    /// ([len(value)][value])+`. Stable across releases — other parts of
    /// the engine persist range tokens inside on-disk structures.
    #[must_use]
    pub fn to_bytes(&self) -> &[u8] {
        &self.wire_bytes
    }

    /// Parse a `RangeToken` back out of bytes produced by
    /// [`RangeToken::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidTokenShape`] if `bytes` is truncated or
    /// otherwise malformed, or [`LockError::InvalidOperator`] if the leading
    /// operator byte does not match any known [`Operator`].
    pub fn from_bytes(bytes: &[u8]) -> LockResult<Self> {
        let mut cursor = bytes;
        let op_byte = take_byte(&mut cursor)?;
        let operator = if op_byte == NULL_OPERATOR_BYTE {
            None
        } else {
            Some(
                Operator::from_wire_byte(op_byte)
                    .ok_or_else(|| LockError::InvalidOperator(format!("unknown operator byte {op_byte}")))?,
            )
        };
        let key = take_length_prefixed(&mut cursor)?;
        let mut values = Vec::new();
        while !cursor.is_empty() {
            let raw = take_length_prefixed(&mut cursor)?;
            let endpoint = Endpoint::from_bytes(&raw)
                .ok_or_else(|| LockError::InvalidTokenShape("malformed value bytes".to_owned()))?;
            values.push(endpoint);
        }
        if values.is_empty() {
            return Err(LockError::InvalidTokenShape("range token carries no values".to_owned()));
        }
        Ok(Self::assemble(key, operator, values))
    }

    /// Whether `self` and `other` share at least one `Value` in the total
    /// order once both are expanded to their canonical ranges (§4.A, §4.G).
    /// Symmetric and reflexive by construction.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        let self_ranges = ranges::expand(self.effective_operator(), &self.values);
        let other_ranges = ranges::expand(other.effective_operator(), &other.values);
        ranges::any_overlap(&self_ranges, &other_ranges)
    }
}

impl<V: Scalar> PartialEq for RangeToken<V> {
    fn eq(&self, other: &Self) -> bool {
        self.wire_bytes == other.wire_bytes
    }
}

impl<V: Scalar> Eq for RangeToken<V> {}

impl<V: Scalar> std::hash::Hash for RangeToken<V> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.wire_bytes.hash(state);
    }
}

fn require_arity<V>(operator: Operator, values: &[V], expected: usize) -> LockResult<()> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(LockError::InvalidTokenShape(format!(
            "{operator:?} requires {expected} value(s), got {}",
            values.len()
        )))
    }
}

fn encode<V: Scalar>(key: &[u8], operator: Option<Operator>, values: &[Endpoint<V>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(operator.map_or(NULL_OPERATOR_BYTE, Operator::wire_byte));
    push_length_prefixed(&mut out, key);
    for value in values {
        push_length_prefixed(&mut out, &value.to_bytes());
    }
    out
}

fn push_length_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    #[allow(clippy::cast_possible_truncation)]
    out.extend((bytes.len() as u32).to_be_bytes());
    out.extend(bytes);
}

fn take_byte(cursor: &mut &[u8]) -> LockResult<u8> {
    let (first, rest) = cursor
        .split_first()
        .ok_or_else(|| LockError::InvalidTokenShape("truncated range token bytes".to_owned()))?;
    *cursor = rest;
    Ok(*first)
}

fn take_length_prefixed(cursor: &mut &[u8]) -> LockResult<Vec<u8>> {
    if cursor.len() < 4 {
        return Err(LockError::InvalidTokenShape("truncated length prefix".to_owned()));
    }
    let (len_bytes, rest) = cursor.split_at(4);
    let len = u32::from_be_bytes(len_bytes.try_into().expect("split_at(4) yields 4 bytes")) as usize;
    if rest.len() < len {
        return Err(LockError::InvalidTokenShape("truncated field bytes".to_owned()));
    }
    let (field, rest) = rest.split_at(len);
    *cursor = rest;
    Ok(field.to_vec())
}
