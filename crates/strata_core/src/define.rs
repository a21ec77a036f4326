//! Keyed fetch-or-create primitive.
//!
//! # Responsibility
//! - Provide one compare-and-define shape for documents, nodes, taxa and units.
//!
//! # Invariants
//! - `create` runs only when `lookup` found nothing.
//! - Existing values always go through `reconcile`, which may reject them.

/// Outcome of a keyed define call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Defined<T> {
    /// The value did not exist and was created by this call.
    Created(T),
    /// The value already existed and was reconciled.
    Existing(T),
}

impl<T> Defined<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Self::Created(value) | Self::Existing(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Created(value) | Self::Existing(value) => value,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Defined<U> {
        match self {
            Self::Created(value) => Defined::Created(f(value)),
            Self::Existing(value) => Defined::Existing(f(value)),
        }
    }
}

/// Looks a value up by key, reconciling it when present and creating it otherwise.
///
/// Callers run this inside whatever lock or transaction guards the key, so
/// lookup and create observe the same state.
pub fn define_keyed<T, E>(
    lookup: impl FnOnce() -> Result<Option<T>, E>,
    reconcile: impl FnOnce(T) -> Result<T, E>,
    create: impl FnOnce() -> Result<T, E>,
) -> Result<Defined<T>, E> {
    match lookup()? {
        Some(existing) => reconcile(existing).map(Defined::Existing),
        None => create().map(Defined::Created),
    }
}

#[cfg(test)]
mod tests {
    use super::{define_keyed, Defined};
    use std::cell::Cell;

    #[test]
    fn creates_only_when_lookup_misses() {
        let created = Cell::new(0);
        let outcome: Result<_, ()> = define_keyed(
            || Ok(None),
            |value: u32| Ok(value),
            || {
                created.set(created.get() + 1);
                Ok(7)
            },
        );
        assert_eq!(outcome, Ok(Defined::Created(7)));
        assert_eq!(created.get(), 1);
    }

    #[test]
    fn existing_values_are_reconciled() {
        let outcome: Result<Defined<u32>, &str> =
            define_keyed(|| Ok(Some(3)), |_| Err("conflict"), || Ok(0));
        assert_eq!(outcome, Err("conflict"));

        let outcome: Result<Defined<u32>, &str> =
            define_keyed(|| Ok(Some(3)), |value| Ok(value + 1), || Ok(0));
        assert_eq!(outcome.map(Defined::into_inner), Ok(4));
    }
}
