use serde::Serialize;

use crate::error::LabelQaError;

pub fn to_pretty<T: Serialize>(value: &T) -> Result<String, LabelQaError> {
    Ok(serde_json::to_string_pretty(value)?)
}
