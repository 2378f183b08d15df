//! Transform adapters from upstream API shapes into CLI-facing records.

pub(crate) mod fields;
pub(crate) mod label;
pub(crate) mod question;
