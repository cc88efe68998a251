//! URL handling module for Krill
//!
//! Canonicalization turns any HTTP(S) URL into the string used as its key in
//! the store; the link filter decides which discovered links belong to the
//! crawl at all.

mod filter;
mod normalize;

pub use filter::normalize_and_filter;
pub use normalize::canonicalize;
