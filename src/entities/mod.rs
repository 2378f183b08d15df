//! Entity-level retrieval workflows used by the CLI.

pub(crate) mod label;
