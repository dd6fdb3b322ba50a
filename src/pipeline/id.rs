//! Identity types for the pipeline system.
//!
//! `ComponentId` and `LinkId` are newtypes over `u32` that serve as direct
//! array indices into the chain's storage vectors. `Iteration` numbers one
//! execution pass of a chain.

use std::fmt;

/// Identifier of one media-producing endpoint multiplexed through a component.
pub type SourceId = u64;

/// One execution pass of a chain. Non-decreasing from a component's point of view.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Iteration(pub u64);

impl Iteration {
    pub const FIRST: Iteration = Iteration(1);

    #[inline]
    pub fn next(self) -> Iteration {
        Iteration(self.0 + 1)
    }

    /// Number of iterations between `earlier` and `self` (0 when not later).
    #[inline]
    pub fn distance_from(self, earlier: Iteration) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Debug for Iteration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iteration({})", self.0)
    }
}

impl fmt::Display for Iteration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into `Chain::components`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentId(pub u32);

impl ComponentId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into `Chain::links`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u32);

impl LinkId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkId({})", self.0)
    }
}

/// Identifies one consumer-side view registered with a video output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ViewId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id() {
        let id = ComponentId(42);
        assert_eq!(id.index(), 42);
        assert_eq!(format!("{}", id), "ComponentId(42)");
    }

    #[test]
    fn test_iteration_ordering() {
        let a = Iteration::FIRST;
        let b = a.next();
        assert!(b > a);
        assert_eq!(b.distance_from(a), 1);
        assert_eq!(a.distance_from(b), 0);
        assert_eq!(format!("{}", Iteration(7)), "7");
        assert_eq!(format!("{:?}", Iteration(7)), "Iteration(7)");
    }
}
