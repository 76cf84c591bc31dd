//! Opaque, reentrant lock tokens (§2).
//!
//! A [`Token`] identifies what is being locked without the lock service ever
//! inspecting the caller's domain model: it is built once, up front, from an
//! ordered list of textual components plus a cardinality, and from then on
//! is compared purely by digest.

use md5::{Digest, Md5};

/// Identity for a single lock held by [`crate::services::TokenLockService`]
/// (§2).
///
/// Two tokens built from the same ordered components and the same
/// cardinality are `==` and hash identically, regardless of how many times
/// each was constructed — the digest, not the components, is the identity
/// (§2 "Token equality/hash is digest-only").
#[derive(Debug, Clone)]
pub struct Token {
    digest: [u8; 16],
    cardinality: u32,
}

impl Token {
    /// Build a token from its ordered textual components and a cardinality.
    ///
    /// `cardinality` is the number of concurrent holders the token type
    /// supports: `1` for the common reentrant-exclusive case, `>=2` for a
    /// token type that permits several simultaneous writers (§2 "Token
    /// cardinality"). Components are hashed in the order given — callers
    /// are responsible for a stable ordering (e.g. table name before row
    /// id), since swapping two components' order changes the digest.
    ///
    /// # Panics
    ///
    /// Panics if `cardinality` is zero; a token with no permitted holders
    /// is not a meaningful shape.
    #[must_use]
    pub fn new<I, S>(components: I, cardinality: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        assert!(cardinality > 0, "token cardinality must be at least 1");
        let mut hasher = Md5::new();
        for component in components {
            hasher.update(component.as_ref().as_bytes());
            // 0x00 can never appear in a well-formed UTF-8 component body by
            // itself without also terminating the string, so it is a safe
            // separator that keeps ("ab", "c") distinct from ("a", "bc").
            hasher.update([0u8]);
        }
        let digest: [u8; 16] = hasher.finalize().into();
        Self { digest, cardinality }
    }

    /// This token's cardinality, i.e. how many concurrent writers it
    /// permits.
    #[must_use]
    pub const fn cardinality(&self) -> u32 {
        self.cardinality
    }

    /// Whether this token uses the shared-read/XOR-shared-write lock
    /// (cardinality `>= 2`) rather than the plain reentrant exclusive lock
    /// (cardinality `1`) (§2).
    #[must_use]
    pub const fn allows_concurrent_writers(&self) -> bool {
        self.cardinality >= 2
    }

    /// The raw 16-byte MD5 digest underlying this token's identity.
    #[must_use]
    pub const fn digest(&self) -> [u8; 16] {
        self.digest
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for Token {}

impl std::hash::Hash for Token {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_components_and_cardinality_are_equal() {
        let a = Token::new(["orders", "row-42"], 1);
        let b = Token::new(["orders", "row-42"], 1);
        assert_eq!(a, b);
    }

    #[test]
    fn component_order_changes_identity() {
        let a = Token::new(["orders", "row-42"], 1);
        let b = Token::new(["row-42", "orders"], 1);
        assert_ne!(a, b);
    }

    #[test]
    fn component_boundary_is_not_ambiguous() {
        let a = Token::new(["ab", "c"], 1);
        let b = Token::new(["a", "bc"], 1);
        assert_ne!(a, b);
    }

    #[test]
    fn identity_is_digest_only_and_ignores_cardinality() {
        let a = Token::new(["orders"], 1);
        let b = Token::new(["orders"], 2);
        assert_eq!(a, b, "equality is digest-based only (§2); cardinality is not part of identity");
        assert!(!a.allows_concurrent_writers());
        assert!(b.allows_concurrent_writers());
    }

    #[test]
    fn different_components_are_not_equal() {
        let a = Token::new(["orders"], 1);
        let b = Token::new(["invoices"], 1);
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic(expected = "cardinality")]
    fn zero_cardinality_panics() {
        let _ = Token::new(["orders"], 0);
    }

    proptest::proptest! {
        #[test]
        fn same_components_always_hash_and_compare_equal(
            components in proptest::collection::vec("[a-z0-9]{1,8}", 1..6),
            cardinality in 1u32..4,
        ) {
            let a = Token::new(components.clone(), cardinality);
            let b = Token::new(components, cardinality);
            proptest::prop_assert_eq!(a, b);
        }

        #[test]
        fn distinct_component_lists_practically_never_collide(
            a_components in proptest::collection::vec("[a-z0-9]{1,8}", 1..6),
            b_components in proptest::collection::vec("[a-z0-9]{1,8}", 1..6),
        ) {
            proptest::prop_assume!(a_components != b_components);
            let a = Token::new(a_components, 1);
            let b = Token::new(b_components, 1);
            proptest::prop_assert_ne!(a, b);
        }
    }
}
