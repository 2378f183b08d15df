use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use crate::error::LabelQaError;
use crate::sources::openfda::OpenFdaClient;
use crate::transform;
use crate::transform::fields::{FieldSpec, FlatRecord};

pub const DEFAULT_TONE: &str = "professional";

/// Text-generation collaborator: formatted prompt in, prose answer out.
#[async_trait::async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LabelQaError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct DrugLabelReport {
    pub drug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<String>,
    pub fields: FlatRecord,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AskOptions {
    /// Overrides the drug name taken from the question.
    pub drug: Option<String>,
    pub fields: Vec<String>,
    pub tone: String,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            drug: None,
            fields: Vec::new(),
            tone: DEFAULT_TONE.to_string(),
        }
    }
}

fn now_rfc3339() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}

fn not_found(drug: &str) -> LabelQaError {
    LabelQaError::NotFound {
        entity: "drug label".into(),
        id: drug.to_string(),
        suggestion: format!(
            "No OpenFDA label matched \"{drug}\" by brand or generic name. Check the spelling or try: labelqa label <brand-name>"
        ),
    }
}

/// Builds a report from an OpenFDA search envelope.
///
/// A missing envelope or an empty `results` list is `NotFound`; missing fields
/// inside the label are not errors.
pub fn report_from_response(
    drug: &str,
    response: Option<&Value>,
    spec: &FieldSpec,
) -> Result<DrugLabelReport, LabelQaError> {
    let label = response
        .and_then(transform::label::first_label)
        .ok_or_else(|| not_found(drug))?;

    let fields = transform::fields::extract(label, spec);
    let missing = fields.missing();
    if !missing.is_empty() {
        warn!(
            drug,
            missing = missing.len(),
            fields = %missing.join(", "),
            "Some label fields are missing"
        );
    }

    let meta = transform::label::label_metadata(label);
    Ok(DrugLabelReport {
        drug: drug.to_string(),
        question: None,
        set_id: meta.set_id,
        effective_time: meta.effective_time,
        retrieved_at: now_rfc3339(),
        fields,
        missing,
        answer: None,
    })
}

async fn fetch_label(
    client: &OpenFdaClient,
    drug: &str,
    spec: &FieldSpec,
) -> Result<(DrugLabelReport, FlatRecord), LabelQaError> {
    let response = client.label_search(drug).await?;
    let report = report_from_response(drug, response.as_ref(), spec)?;
    // The prompt always draws from the full table, independent of the displayed selection.
    let label = response
        .as_ref()
        .and_then(transform::label::first_label)
        .unwrap_or(&Value::Null);
    let full = transform::fields::extract(label, transform::label::label_fields());
    Ok((report, full))
}

/// Looks up a drug label and normalizes it into the requested fields.
pub async fn get(drug: &str, fields: &[String]) -> Result<DrugLabelReport, LabelQaError> {
    let spec = transform::label::select_fields(fields)?;
    let client = OpenFdaClient::new()?;
    let (report, _) = fetch_label(&client, drug.trim(), &spec).await?;
    Ok(report)
}

/// Answers a clinician's question from the drug's label.
///
/// With no `generator` the report carries the label fields only.
pub async fn ask(
    question: &str,
    options: &AskOptions,
    generator: Option<&dyn AnswerGenerator>,
) -> Result<DrugLabelReport, LabelQaError> {
    let client = OpenFdaClient::new()?;
    ask_with_client(&client, question, options, generator).await
}

async fn ask_with_client(
    client: &OpenFdaClient,
    question: &str,
    options: &AskOptions,
    generator: Option<&dyn AnswerGenerator>,
) -> Result<DrugLabelReport, LabelQaError> {
    let question = transform::question::validate_question(question)?;
    let drug = match options
        .drug
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        Some(drug) => drug.to_string(),
        None => transform::question::drug_name_from_question(question)?,
    };
    let spec = transform::label::select_fields(&options.fields)?;

    let (mut report, full) = fetch_label(client, &drug, &spec).await?;
    report.question = Some(question.to_string());

    if let Some(generator) = generator {
        let prompt = crate::render::prompt::clinical_prompt(&drug, question, &full, &options.tone)?;
        info!(drug = %drug, "Generating answer");
        report.answer = Some(generator.generate(&prompt).await?);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::transform::fields::NOT_AVAILABLE;
    use crate::transform::label::{BRAND_NAME, DOSAGE, LABEL_FIELDS};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
        reply: Result<String, String>,
    }

    impl RecordingGenerator {
        fn replying(reply: &str) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply: Ok(reply.to_string()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply: Err(message.to_string()),
            }
        }
    }

    #[async_trait::async_trait]
    impl AnswerGenerator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, LabelQaError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|message| LabelQaError::Api {
                api: "openai".into(),
                message,
            })
        }
    }

    fn envelope(label: Value) -> Value {
        json!({
            "meta": {"results": {"skip": 0, "limit": 1, "total": 1}},
            "results": [label]
        })
    }

    async fn mount_label(server: &MockServer, brand: &str, label: Value) {
        Mock::given(method("GET"))
            .and(path("/drug/label.json"))
            .and(query_param("search", format!("openfda.brand_name:\"{brand}\"")))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(label)))
            .mount(server)
            .await;
    }

    #[test]
    fn report_from_response_keeps_every_declared_field() {
        let response = envelope(json!({
            "effective_time": "20240102",
            "openfda": {"brand_name": ["Aspirin"]}
        }));
        let report = report_from_response("Aspirin", Some(&response), &LABEL_FIELDS).unwrap();
        assert_eq!(report.fields.len(), LABEL_FIELDS.len());
        assert_eq!(report.fields.text(BRAND_NAME), "Aspirin");
        assert_eq!(report.fields.text(DOSAGE), NOT_AVAILABLE);
        assert_eq!(report.missing.len(), LABEL_FIELDS.len() - 1);
        assert_eq!(report.effective_time.as_deref(), Some("2024-01-02"));
    }

    #[test]
    fn report_from_response_without_results_is_not_found() {
        let err = report_from_response("Nope", Some(&json!({"results": []})), &LABEL_FIELDS)
            .unwrap_err();
        assert!(matches!(err, LabelQaError::NotFound { .. }));

        let err = report_from_response("Nope", None, &LABEL_FIELDS).unwrap_err();
        assert!(err.to_string().contains("drug label 'Nope' not found"));
    }

    #[test]
    fn report_serializes_fields_with_sentinel() {
        let response = envelope(json!({"openfda": {"brand_name": ["Aspirin"]}}));
        let spec = transform::label::select_fields(&["Brand Name".into(), "Dosage".into()]).unwrap();
        let report = report_from_response("Aspirin", Some(&response), &spec).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fields"]["Brand Name"], "Aspirin");
        assert_eq!(json["fields"]["Dosage"], NOT_AVAILABLE);
        assert_eq!(json["missing"], json!(["Dosage"]));
        assert!(json.get("answer").is_none());
    }

    #[tokio::test]
    async fn ask_extracts_drug_and_feeds_label_into_prompt() {
        let server = MockServer::start().await;
        mount_label(
            &server,
            "Metformin",
            json!({
                "openfda": {"brand_name": ["Glucophage"], "generic_name": ["METFORMIN HYDROCHLORIDE"]},
                "indications_and_usage": ["Adjunct to diet and exercise in type 2 diabetes"],
                "dosage_and_administration": ["Start 500 mg twice daily"]
            }),
        )
        .await;

        let client = OpenFdaClient::new_for_test(server.uri(), None).unwrap();
        let generator = RecordingGenerator::replying("Titrate slowly.");
        let report = ask_with_client(
            &client,
            "Metformin: max dose in CKD stage 3?",
            &AskOptions::default(),
            Some(&generator),
        )
        .await
        .unwrap();

        assert_eq!(report.drug, "Metformin");
        assert_eq!(report.answer.as_deref(), Some("Titrate slowly."));
        assert_eq!(
            report.question.as_deref(),
            Some("Metformin: max dose in CKD stage 3?")
        );

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.contains("Brand Name: Glucophage"));
        assert!(prompt.contains("Generic Name: METFORMIN HYDROCHLORIDE"));
        assert!(prompt.contains("Dosage: Start 500 mg twice daily"));
        assert!(prompt.contains("Question: Metformin: max dose in CKD stage 3?"));
        assert!(prompt.contains("professional"));
    }

    #[tokio::test]
    async fn ask_prompt_uses_full_table_even_with_field_selection() {
        let server = MockServer::start().await;
        mount_label(
            &server,
            "Zestril",
            json!({
                "openfda": {"brand_name": ["Zestril"]},
                "dosage_and_administration": ["10 mg once daily"]
            }),
        )
        .await;

        let client = OpenFdaClient::new_for_test(server.uri(), None).unwrap();
        let generator = RecordingGenerator::replying("ok");
        let options = AskOptions {
            drug: Some("Zestril".into()),
            fields: vec!["NDC".into()],
            tone: "concise".into(),
        };
        let report = ask_with_client(&client, "dose?", &options, Some(&generator))
            .await
            .unwrap();

        assert_eq!(report.fields.names().collect::<Vec<_>>(), vec!["NDC"]);
        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Dosage: 10 mg once daily"));
        assert!(prompts[0].contains("Indications: Not available"));
        assert!(prompts[0].contains("concise"));
    }

    #[tokio::test]
    async fn ask_without_generator_returns_fields_only() {
        let server = MockServer::start().await;
        mount_label(&server, "Advil", json!({"openfda": {"brand_name": ["Advil"]}})).await;

        let client = OpenFdaClient::new_for_test(server.uri(), None).unwrap();
        let report = ask_with_client(&client, "Advil with lisinopril?", &AskOptions::default(), None)
            .await
            .unwrap();
        assert!(report.answer.is_none());
        assert_eq!(report.fields.text(BRAND_NAME), "Advil");
    }

    #[tokio::test]
    async fn ask_propagates_generator_failure() {
        let server = MockServer::start().await;
        mount_label(&server, "Advil", json!({"openfda": {"brand_name": ["Advil"]}})).await;

        let client = OpenFdaClient::new_for_test(server.uri(), None).unwrap();
        let generator = RecordingGenerator::failing("HTTP 503");
        let err = ask_with_client(&client, "Advil dosing", &AskOptions::default(), Some(&generator))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn ask_rejects_unknown_field_before_fetching() {
        let client = OpenFdaClient::new_for_test("http://127.0.0.1:9".into(), None).unwrap();
        let options = AskOptions {
            fields: vec!["Colour".into()],
            ..AskOptions::default()
        };
        let err = ask_with_client(&client, "Advil dosing", &options, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LabelQaError::InvalidArgument(_)));
    }
}
