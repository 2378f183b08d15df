use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::error::LabelQaError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthRow {
    pub api: String,
    pub status: String,
    pub latency: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub healthy: usize,
    pub total: usize,
    pub rows: Vec<HealthRow>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.healthy == self.total
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# labelqa Health Check\n\n");
        out.push_str("| API | Status | Latency |\n");
        out.push_str("|-----|--------|---------|\n");
        for row in &self.rows {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                row.api, row.status, row.latency
            ));
        }
        out.push_str(&format!(
            "\nStatus: {}/{} APIs healthy\n",
            self.healthy, self.total
        ));
        out
    }
}

async fn check_one(client: reqwest::Client, api: &str, url: &str) -> HealthRow {
    let req = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json");
    probe(req, api).await
}

async fn check_authed(client: reqwest::Client, api: &str, url: &str, token: &str) -> HealthRow {
    let req = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .bearer_auth(token);
    probe(req, api).await
}

async fn probe(req: reqwest::RequestBuilder, api: &str) -> HealthRow {
    let start = Instant::now();
    match req.send().await {
        Ok(resp) => {
            let status = resp.status();
            let elapsed = start.elapsed().as_millis();
            if status.is_success() {
                HealthRow {
                    api: api.to_string(),
                    status: "ok".into(),
                    latency: format!("{elapsed}ms"),
                }
            } else {
                HealthRow {
                    api: api.to_string(),
                    status: "error".into(),
                    latency: format!("{elapsed}ms (HTTP {})", status.as_u16()),
                }
            }
        }
        Err(err) => {
            let reason = if err.is_timeout() {
                "timeout"
            } else if err.is_connect() {
                "connect"
            } else {
                "error"
            };
            HealthRow {
                api: api.to_string(),
                status: "error".into(),
                latency: reason.into(),
            }
        }
    }
}

fn health_http_client() -> Result<reqwest::Client, LabelQaError> {
    static HEALTH_HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

    if let Some(client) = HEALTH_HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("labelqa-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(LabelQaError::HttpClientInit)?;

    match HEALTH_HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HEALTH_HTTP_CLIENT
            .get()
            .cloned()
            .ok_or_else(|| LabelQaError::Api {
                api: "health".into(),
                message: "Health HTTP client initialization race".into(),
            }),
    }
}

async fn check_cache_dir() -> HealthRow {
    let start = Instant::now();
    let dir = crate::utils::cache::labelqa_cache_dir();
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let probe = dir.join(format!(".labelqa-healthcheck-{suffix}.tmp"));

    let result = async {
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&probe, b"ok").await?;
        match tokio::fs::remove_file(&probe).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
    .await;

    match result {
        Ok(()) => HealthRow {
            api: format!("Cache dir ({})", dir.display()),
            status: "ok".into(),
            latency: format!("{}ms", start.elapsed().as_millis()),
        },
        Err(err) => HealthRow {
            api: format!("Cache dir ({})", dir.display()),
            status: "error".into(),
            latency: format!("{:?}", err.kind()),
        },
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

async fn check_openai(client: reqwest::Client, base: &str, api_key: Option<String>) -> HealthRow {
    match api_key {
        Some(key) => check_authed(client, "OpenAI", &endpoint(base, "v1/models"), &key).await,
        None => HealthRow {
            api: "OpenAI".into(),
            status: "unconfigured".into(),
            latency: "OPENAI_API_KEY not set".into(),
        },
    }
}

/// Runs connectivity checks for OpenFDA, the answer endpoint and the local cache directory.
///
/// A missing `OPENAI_API_KEY` is reported as a row, not an error.
///
/// # Errors
///
/// Returns an error when the health HTTP client cannot be created.
pub async fn check(apis_only: bool) -> Result<HealthReport, LabelQaError> {
    use crate::sources::openai::{OPENAI_BASE, OPENAI_BASE_ENV};
    use crate::sources::openfda::{OPENFDA_BASE, OPENFDA_BASE_ENV};

    let client = health_http_client()?;
    let openfda_base = crate::sources::env_base(OPENFDA_BASE, OPENFDA_BASE_ENV);
    let openai_base = crate::sources::env_base(OPENAI_BASE, OPENAI_BASE_ENV);

    let openfda_url = endpoint(&openfda_base, "drug/label.json?limit=1");
    let openfda = check_one(client.clone(), "OpenFDA", &openfda_url);
    let openai = check_openai(
        client.clone(),
        &openai_base,
        crate::sources::env_secret("OPENAI_API_KEY"),
    );
    let (openfda, openai) = tokio::join!(openfda, openai);

    let mut rows = vec![openfda, openai];
    if !apis_only {
        rows.push(check_cache_dir().await);
    }
    let healthy = rows.iter().filter(|r| r.status == "ok").count();
    Ok(HealthReport {
        healthy,
        total: rows.len(),
        rows,
    })
}
