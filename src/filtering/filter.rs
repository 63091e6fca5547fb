//! Filtering traits.

/// immutable, pure filter (2 successive equal inputs -> 2 equal outputs).
/// `true` keeps the item.
pub trait Filter<T>: Default {
    fn detect(&self, item: T) -> bool;
}
