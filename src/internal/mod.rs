//! Internal implementation details.

pub(crate) mod circular;
pub(crate) mod dispose_bag;

pub(crate) use circular::{ResolutionChain, MAX_DEPTH};
pub(crate) use dispose_bag::{release_one, release_reverse, DisposeBag, TeardownEntry};
