//! Quotient-filter approximate-membership set.
//!
//! [`QuotientFilter`] is the engine: a linear-probing table of bit-packed
//! remainders plus three per-slot metadata flags that keep colliding
//! fingerprints grouped into sorted runs, supporting insertion, lookup,
//! deletion and ascending-order iteration with zero false negatives.
//! [`QuotientSet`] wraps one engine with a hash function and a
//! max-load-factor policy to form a set over arbitrary `Hash` keys that
//! re-tiles itself as it grows.

pub mod error;
pub mod hash;
pub mod log;
pub mod quotient_filter;
pub mod quotient_set;

pub use error::FilterError;
pub use hash::Murmur3BuildHasher;
pub use quotient_filter::QuotientFilter;
pub use quotient_set::QuotientSet;
