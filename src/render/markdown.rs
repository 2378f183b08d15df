use std::sync::OnceLock;

use minijinja::{Environment, context};

use crate::entities::label::DrugLabelReport;
use crate::error::LabelQaError;
use crate::transform::fields::{FieldSpec, FlatRecord, NOT_AVAILABLE};

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

/// Default per-cell limit for markdown tables; `--full` lifts it.
pub const CELL_MAX_CHARS: usize = 600;

#[derive(serde::Serialize)]
pub(crate) struct FieldRow<'a> {
    pub name: &'a str,
    pub value: &'a str,
    pub available: bool,
}

pub(crate) fn field_rows(record: &FlatRecord) -> Vec<FieldRow<'_>> {
    record
        .iter()
        .map(|(name, value)| FieldRow {
            name,
            value: value.as_str(),
            available: value.is_present(),
        })
        .collect()
}

#[derive(serde::Serialize)]
struct PathRow {
    name: &'static str,
    path: String,
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars == 0 {
        return "…".to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}

fn table_cell(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

pub(crate) fn env() -> Result<&'static Environment<'static>, LabelQaError> {
    if let Some(env) = ENV.get() {
        return Ok(env);
    }

    let mut env = Environment::new();
    env.add_filter(
        "truncate",
        |s: String, max_chars: Option<usize>| -> String {
            match max_chars {
                Some(max) => truncate_chars(&s, max),
                None => s,
            }
        },
    );
    env.add_filter("cell", |s: String| -> String { table_cell(&s) });
    env.add_template("label.md.j2", include_str!("../../templates/label.md.j2"))?;
    env.add_template("fields.md.j2", include_str!("../../templates/fields.md.j2"))?;
    env.add_template("prompt.j2", include_str!("../../templates/prompt.j2"))?;

    let _ = ENV.set(env);
    ENV.get().ok_or_else(|| LabelQaError::Api {
        api: "templates".into(),
        message: "Template environment initialization failed".into(),
    })
}

fn report_title(report: &DrugLabelReport) -> String {
    let brand = report
        .fields
        .get(crate::transform::label::BRAND_NAME)
        .and_then(|v| v.present());
    match brand {
        Some(brand) if !brand.eq_ignore_ascii_case(&report.drug) => {
            format!("Drug Label: {} ({brand})", report.drug)
        }
        _ => format!("Drug Label: {}", report.drug),
    }
}

pub fn label_markdown(report: &DrugLabelReport, full: bool) -> Result<String, LabelQaError> {
    let tmpl = env()?.get_template("label.md.j2")?;
    let max_chars = (!full).then_some(CELL_MAX_CHARS);
    Ok(tmpl.render(context! {
        title => report_title(report),
        question => &report.question,
        rows => field_rows(&report.fields),
        missing_count => report.missing.len(),
        total => report.fields.len(),
        answer => &report.answer,
        set_id => &report.set_id,
        effective_time => &report.effective_time,
        max_chars => max_chars,
        not_available => NOT_AVAILABLE,
    })?)
}

pub fn fields_markdown(spec: &FieldSpec) -> Result<String, LabelQaError> {
    let tmpl = env()?.get_template("fields.md.j2")?;
    let rows: Vec<PathRow> = spec
        .fields()
        .iter()
        .map(|f| PathRow {
            name: f.name,
            path: f.path.join("."),
        })
        .collect();
    Ok(tmpl.render(context! { rows => rows })?)
}
