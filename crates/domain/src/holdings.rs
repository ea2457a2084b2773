//! Core holdings and delta traits.

use serde::{Serialize, de::DeserializeOwned};

/// A signed change to an entity's holdings.
///
/// Deltas travel between entities and are stored in durable records, so they
/// must be serializable.
pub trait Delta: Serialize + DeserializeOwned + Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Returns the delta that undoes this one.
    fn inverse(&self) -> Self;
}

/// The balance-like state an account owns.
///
/// Implementations track one or more quantities that must never go
/// negative. Validation and application are a single step: either the whole
/// delta is applied or nothing changes.
pub trait Holdings:
    Serialize + DeserializeOwned + Default + Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    /// The type of delta these holdings accept.
    type Delta: Delta;

    /// Applies `delta` if no tracked quantity would go negative.
    ///
    /// Returns false and leaves the holdings untouched otherwise.
    fn validate_and_apply(&mut self, delta: &Self::Delta) -> bool;

    /// Unconditionally undoes a previously applied `delta`.
    ///
    /// Never fails: the inverse of an applied delta is always arithmetically
    /// valid.
    fn reverse(&mut self, delta: &Self::Delta);
}
