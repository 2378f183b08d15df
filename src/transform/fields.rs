//! Declarative field extraction over loosely-shaped JSON records.
//!
//! A [`FieldSpec`] is an ordered table of `(field name, access path)` pairs.
//! [`extract`] walks every path against a record and always yields one value per
//! declared field: either the resolved scalar or [`NOT_AVAILABLE`].

use std::borrow::Cow;

use serde::ser::{Serialize, Serializer};
use serde_json::Value;

/// In-band marker for a field the record does not provide.
pub const NOT_AVAILABLE: &str = "Not available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub path: &'static [&'static str],
}

impl FieldDef {
    pub const fn new(name: &'static str, path: &'static [&'static str]) -> Self {
        Self { name, path }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    fields: Cow<'static, [FieldDef]>,
}

impl FieldSpec {
    pub const fn from_static(fields: &'static [FieldDef]) -> Self {
        Self {
            fields: Cow::Borrowed(fields),
        }
    }

    pub fn from_defs(fields: Vec<FieldDef>) -> Self {
        Self {
            fields: Cow::Owned(fields),
        }
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    /// Case-insensitive lookup, for matching user-typed field names.
    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Present(String),
    Absent,
}

impl FieldValue {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Present(value) => value.as_str(),
            Self::Absent => NOT_AVAILABLE,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn present(&self) -> Option<&str> {
        match self {
            Self::Present(value) => Some(value.as_str()),
            Self::Absent => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Flat, declaration-ordered result of [`extract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRecord {
    entries: Vec<(&'static str, FieldValue)>,
}

impl FlatRecord {
    /// Exact-name lookup; names are the declared `&'static str` constants.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    /// Value text for `name`, with the sentinel standing in for absent or undeclared fields.
    pub fn text(&self, name: &str) -> &str {
        self.get(name)
            .map(FieldValue::as_str)
            .unwrap_or(NOT_AVAILABLE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> + '_ {
        self.entries.iter().map(|(name, value)| (*name, value))
    }

    #[cfg(test)]
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    pub fn missing(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(_, value)| !value.is_present())
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Serialize for FlatRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(name, value)| (*name, value)))
    }
}

fn descend<'a>(record: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(record, |cursor, step| match cursor {
        Value::Object(map) => map.get(*step),
        Value::Array(items) => step.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

// Null, blank strings and nested containers all count as "not provided".
// Strings are trimmed, so surrounding whitespace never reaches the output.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

/// Resolves a single access path. Sequences collapse to their first element.
pub fn resolve(record: &Value, path: &[&str]) -> FieldValue {
    let value = match descend(record, path) {
        Some(Value::Array(items)) => items.first(),
        other => other,
    };
    value
        .and_then(scalar_text)
        .map_or(FieldValue::Absent, FieldValue::Present)
}

/// Extracts every field in `spec` from `record`.
///
/// Never fails: unreachable paths, empty sequences and `null` values resolve to
/// [`FieldValue::Absent`]. Pass `&Value::Null` when no record is available.
pub fn extract(record: &Value, spec: &FieldSpec) -> FlatRecord {
    FlatRecord {
        entries: spec
            .fields()
            .iter()
            .map(|field| (field.name, resolve(record, field.path)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static AB_SPEC: FieldSpec = FieldSpec::from_static(&[FieldDef::new("AB", &["a", "b"])]);

    static SCENARIO_SPEC: FieldSpec = FieldSpec::from_static(&[
        FieldDef::new("Brand Name", &["openfda", "brand_name"]),
        FieldDef::new("Dosage", &["dosage_and_administration"]),
    ]);

    #[test]
    fn extract_unwraps_first_sequence_element() {
        let record = json!({"a": {"b": ["x", "y"]}});
        let out = extract(&record, &AB_SPEC);
        assert_eq!(out.get("AB"), Some(&FieldValue::Present("x".into())));
    }

    #[test]
    fn extract_uses_sentinel_for_empty_sequence() {
        let record = json!({"a": {"b": []}});
        let out = extract(&record, &AB_SPEC);
        assert_eq!(out.get("AB"), Some(&FieldValue::Absent));
        assert_eq!(out.text("AB"), NOT_AVAILABLE);
    }

    #[test]
    fn extract_maps_brand_name_and_flags_missing_dosage() {
        let record = json!({"openfda": {"brand_name": ["Aspirin"]}});
        let out = extract(&record, &SCENARIO_SPEC);
        assert_eq!(out.text("Brand Name"), "Aspirin");
        assert_eq!(out.text("Dosage"), NOT_AVAILABLE);
        assert_eq!(out.missing(), vec!["Dosage"]);
    }

    #[test]
    fn extract_is_total_over_empty_and_null_records() {
        for record in [json!({}), Value::Null, json!([]), json!("text")] {
            let out = extract(&record, &SCENARIO_SPEC);
            assert_eq!(
                out.names().collect::<Vec<_>>(),
                SCENARIO_SPEC.names().collect::<Vec<_>>()
            );
            assert!(out.iter().all(|(_, v)| *v == FieldValue::Absent));
        }
    }

    #[test]
    fn extract_treats_null_and_blank_values_as_absent() {
        let record = json!({
            "openfda": {"brand_name": [null]},
            "dosage_and_administration": ["   "]
        });
        let out = extract(&record, &SCENARIO_SPEC);
        assert_eq!(out.missing(), vec!["Brand Name", "Dosage"]);

        let record = json!({"openfda": {"brand_name": null}});
        assert_eq!(
            extract(&record, &SCENARIO_SPEC).get("Brand Name"),
            Some(&FieldValue::Absent)
        );
    }

    #[test]
    fn extract_treats_indexing_into_scalar_as_missing() {
        let record = json!({"a": "flat", "openfda": 3});
        assert_eq!(extract(&record, &AB_SPEC).text("AB"), NOT_AVAILABLE);
        assert_eq!(extract(&record, &SCENARIO_SPEC).text("Brand Name"), NOT_AVAILABLE);
    }

    #[test]
    fn resolve_accepts_scalars_and_numeric_sequence_steps() {
        let record = json!({
            "results": [{"set_id": "abc", "version": 7, "openfda": {"brand_name": ["Advil"]}}]
        });
        assert_eq!(
            resolve(&record, &["results", "0", "set_id"]),
            FieldValue::Present("abc".into())
        );
        assert_eq!(
            resolve(&record, &["results", "0", "version"]),
            FieldValue::Present("7".into())
        );
        assert_eq!(
            resolve(&record, &["results", "0", "openfda", "brand_name"]),
            FieldValue::Present("Advil".into())
        );
        assert_eq!(resolve(&record, &["results", "1", "set_id"]), FieldValue::Absent);
        assert_eq!(resolve(&record, &["results", "first"]), FieldValue::Absent);
    }

    #[test]
    fn extract_resolves_fields_independently_of_order() {
        static REVERSED: FieldSpec = FieldSpec::from_static(&[
            FieldDef::new("Dosage", &["dosage_and_administration"]),
            FieldDef::new("Brand Name", &["openfda", "brand_name"]),
        ]);
        let record = json!({
            "openfda": {"brand_name": ["Tylenol"]},
            "dosage_and_administration": ["Take 1 tablet"]
        });
        let forward = extract(&record, &SCENARIO_SPEC);
        let backward = extract(&record, &REVERSED);
        for name in SCENARIO_SPEC.names() {
            assert_eq!(forward.get(name), backward.get(name));
        }
    }

    #[test]
    fn extract_is_idempotent() {
        let record = json!({"openfda": {"brand_name": ["Aspirin", "Bayer"]}});
        assert_eq!(
            extract(&record, &SCENARIO_SPEC),
            extract(&record, &SCENARIO_SPEC)
        );
    }

    #[test]
    fn flat_record_serializes_in_declaration_order_with_sentinel() {
        let record = json!({"openfda": {"brand_name": ["Aspirin"]}});
        let json = serde_json::to_string(&extract(&record, &SCENARIO_SPEC)).expect("json");
        assert_eq!(
            json,
            r#"{"Brand Name":"Aspirin","Dosage":"Not available"}"#
        );
    }

    #[test]
    fn flat_record_lookup_distinguishes_names_by_case() {
        static CASED_SPEC: FieldSpec = FieldSpec::from_static(&[
            FieldDef::new("X", &["upper"]),
            FieldDef::new("x", &["lower"]),
        ]);
        let out = extract(&json!({"upper": "U", "lower": "l"}), &CASED_SPEC);
        assert_eq!(out.text("X"), "U");
        assert_eq!(out.text("x"), "l");
        assert_eq!(out.text("brand name"), NOT_AVAILABLE);
    }

    #[test]
    fn extract_trims_surrounding_whitespace_from_strings() {
        let out = extract(&json!({"a": {"b": ["  Aspirin \n"]}}), &AB_SPEC);
        assert_eq!(out.text("AB"), "Aspirin");
    }
}
