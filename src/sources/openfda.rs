use std::borrow::Cow;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::LabelQaError;

pub(crate) const OPENFDA_BASE: &str = "https://api.fda.gov";
pub(crate) const OPENFDA_BASE_ENV: &str = "LABELQA_OPENFDA_BASE";
const OPENFDA_API: &str = "openfda";
const OPENFDA_API_KEY_ENV: &str = "OPENFDA_API_KEY";
const DRUG_NAME_MAX_BYTES: usize = 256;

/// Name fields tried in order when looking up a label.
const LABEL_NAME_FIELDS: [&str; 2] = ["openfda.brand_name", "openfda.generic_name"];

pub struct OpenFdaClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    api_key: Option<String>,
}

impl OpenFdaClient {
    pub fn new() -> Result<Self, LabelQaError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(OPENFDA_BASE, OPENFDA_BASE_ENV),
            api_key: crate::sources::env_secret(OPENFDA_API_KEY_ENV),
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base: String, api_key: Option<String>) -> Result<Self, LabelQaError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            api_key: api_key
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.as_ref().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn escape_query_value(value: &str) -> String {
        crate::utils::query::escape_lucene_value(value)
    }

    async fn get_json_optional<T: DeserializeOwned>(
        &self,
        req: reqwest_middleware::RequestBuilder,
    ) -> Result<Option<T>, LabelQaError> {
        let resp = crate::sources::fetch(req, OPENFDA_API, self.api_key.is_some()).await?;
        // OpenFDA reports "no matches" as 404 with an error body.
        if resp.status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status.is_success() {
            return Err(resp.status_error(OPENFDA_API, &resp.excerpt()));
        }
        resp.json(OPENFDA_API).map(Some)
    }

    async fn label_search_field(
        &self,
        field: &str,
        escaped: &str,
    ) -> Result<Option<serde_json::Value>, LabelQaError> {
        let q = format!("{field}:\"{escaped}\"");
        let url = self.endpoint("drug/label.json");
        let mut req = self
            .client
            .get(&url)
            .query(&[("search", q.as_str()), ("limit", "1")]);
        if let Some(key) = self.api_key.as_deref() {
            req = req.query(&[("api_key", key)]);
        }
        self.get_json_optional(req).await
    }

    /// Searches `drug/label.json` by brand name, then by generic name.
    ///
    /// Returns the raw search envelope, or `None` when neither lookup matches.
    pub async fn label_search(
        &self,
        drug_name: &str,
    ) -> Result<Option<serde_json::Value>, LabelQaError> {
        let drug_name = drug_name.trim();
        if drug_name.is_empty() {
            return Err(LabelQaError::InvalidArgument(
                "Drug name is required. Example: labelqa label aspirin".into(),
            ));
        }
        if drug_name.len() > DRUG_NAME_MAX_BYTES {
            return Err(LabelQaError::InvalidArgument(
                "Drug name is too long.".into(),
            ));
        }

        let escaped = Self::escape_query_value(drug_name);
        for field in LABEL_NAME_FIELDS {
            let resp = self.label_search_field(field, &escaped).await?;
            let has_results = resp
                .as_ref()
                .and_then(|v| v.get("results"))
                .and_then(serde_json::Value::as_array)
                .is_some_and(|results| !results.is_empty());
            if has_results {
                return Ok(resp);
            }
            debug!(drug = drug_name, field, "No OpenFDA label match");
        }
        Ok(None)
    }
}
