//! Output rendering: markdown and JSON reports, and the generation prompt.

pub(crate) mod json;
pub(crate) mod markdown;
pub(crate) mod prompt;
