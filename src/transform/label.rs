use serde_json::Value;

use crate::error::LabelQaError;
use crate::transform::fields::{FieldDef, FieldSpec, FieldValue, resolve};

/// Field table for a single OpenFDA `drug/label` result.
///
/// Names are the caller-facing vocabulary; paths follow the OpenFDA label schema.
pub static LABEL_FIELDS: FieldSpec = FieldSpec::from_static(&[
    FieldDef::new("Brand Name", &["openfda", "brand_name"]),
    FieldDef::new("Generic Name", &["openfda", "generic_name"]),
    FieldDef::new("Indications", &["indications_and_usage"]),
    FieldDef::new("Warnings", &["boxed_warning"]),
    FieldDef::new("Dosage", &["dosage_and_administration"]),
    FieldDef::new("Forms and strength", &["dosage_forms_and_strengths"]),
    FieldDef::new("Contraindications", &["contraindications"]),
    FieldDef::new("Precautions", &["warnings_and_cautions"]),
    FieldDef::new("Adverse Reactions", &["adverse_reactions"]),
    FieldDef::new("Drug Interactions", &["drug_interactions"]),
    FieldDef::new("Pregnancy", &["pregnancy"]),
    FieldDef::new("Pediatric use", &["pediatric_use"]),
    FieldDef::new("Geriatric use", &["geriatric_use"]),
    FieldDef::new("Overdose", &["overdosage"]),
    FieldDef::new("Mechanism of action", &["mechanism_of_action"]),
    FieldDef::new("Pharmacodynamics", &["pharmacodynamics"]),
    FieldDef::new("Pharmacokinetics", &["pharmacokinetics"]),
    FieldDef::new("Clinical Studies", &["clinical_studies"]),
    FieldDef::new("How supplied", &["how_supplied"]),
    FieldDef::new("Instructions for use", &["instructions_for_use"]),
    FieldDef::new("NDC", &["openfda", "package_ndc"]),
]);

pub const BRAND_NAME: &str = "Brand Name";
pub const GENERIC_NAME: &str = "Generic Name";
pub const INDICATIONS: &str = "Indications";
pub const DOSAGE: &str = "Dosage";

pub fn label_fields() -> &'static FieldSpec {
    &LABEL_FIELDS
}

/// Restricts the label table to `names`, keeping declaration order.
///
/// An empty selection means the full table.
pub fn select_fields(names: &[String]) -> Result<FieldSpec, LabelQaError> {
    let requested: Vec<&str> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();
    if requested.is_empty() {
        return Ok(LABEL_FIELDS.clone());
    }

    if let Some(unknown) = requested.iter().find(|n| LABEL_FIELDS.get(n).is_none()) {
        return Err(LabelQaError::InvalidArgument(format!(
            "Unknown field \"{unknown}\". Available: {}",
            LABEL_FIELDS.names().collect::<Vec<_>>().join(", ")
        )));
    }

    let selected = LABEL_FIELDS
        .fields()
        .iter()
        .filter(|f| requested.iter().any(|n| f.name.eq_ignore_ascii_case(n)))
        .copied()
        .collect();
    Ok(FieldSpec::from_defs(selected))
}

/// First label in an OpenFDA search envelope (`{"meta": .., "results": [..]}`).
pub fn first_label(response: &Value) -> Option<&Value> {
    response
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMetadata {
    pub set_id: Option<String>,
    pub effective_time: Option<String>,
}

fn normalize_yyyymmdd(value: &str) -> Option<String> {
    let v = value.trim();
    if v.len() != 8 || !v.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}-{}-{}", &v[0..4], &v[4..6], &v[6..8]))
}

fn present(label: &Value, path: &[&str]) -> Option<String> {
    match resolve(label, path) {
        FieldValue::Present(v) => Some(v),
        FieldValue::Absent => None,
    }
}

pub fn label_metadata(label: &Value) -> LabelMetadata {
    LabelMetadata {
        set_id: present(label, &["set_id"]),
        effective_time: present(label, &["effective_time"])
            .and_then(|v| normalize_yyyymmdd(&v)),
    }
}
