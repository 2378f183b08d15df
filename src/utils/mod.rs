//! Internal utility helpers for cache paths and query escaping.

pub(crate) mod cache;
pub(crate) mod query;
