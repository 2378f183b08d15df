use minijinja::context;

use crate::entities::label::DEFAULT_TONE;
use crate::error::LabelQaError;
use crate::transform::fields::{FlatRecord, NOT_AVAILABLE};
use crate::transform::label::{BRAND_NAME, DOSAGE, GENERIC_NAME, INDICATIONS};

/// Label fields quoted into the answer prompt, in prompt order.
const PROMPT_FIELDS: [&str; 4] = [BRAND_NAME, GENERIC_NAME, INDICATIONS, DOSAGE];

#[derive(serde::Serialize)]
struct PromptRow<'a> {
    name: &'a str,
    value: &'a str,
}

/// Formats the clinician prompt sent to the answer generator.
///
/// Fields absent from `record` appear as the "Not available" sentinel so the
/// model sees the gap instead of a silently shorter prompt.
pub fn clinical_prompt(
    drug: &str,
    question: &str,
    record: &FlatRecord,
    tone: &str,
) -> Result<String, LabelQaError> {
    let tone = match tone.trim() {
        "" => DEFAULT_TONE,
        tone => tone,
    };
    let rows: Vec<PromptRow<'_>> = PROMPT_FIELDS
        .iter()
        .map(|&name| PromptRow {
            name,
            value: record.text(name),
        })
        .collect();

    let tmpl = crate::render::markdown::env()?.get_template("prompt.j2")?;
    Ok(tmpl.render(context! {
        drug => drug,
        question => question.trim(),
        rows => rows,
        tone => tone,
        not_available => NOT_AVAILABLE,
    })?)
}
