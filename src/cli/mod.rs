use clap::{Parser, Subcommand};

use crate::entities::label::{AnswerGenerator, AskOptions, DEFAULT_TONE};
use crate::error::LabelQaError;
use crate::sources::openai::{GenerationOptions, OpenAiClient};

pub mod health;

#[derive(Parser, Debug)]
#[command(
    name = "labelqa",
    version,
    about = "Answer clinical questions from FDA drug labels",
    after_help = "Examples:\n  labelqa ask \"Metformin dosing in renal impairment?\"\n  labelqa ask --drug lisinopril \"Can it be used in pregnancy?\"\n  labelqa label Advil --field Dosage --field Warnings\n  labelqa --json label aspirin"
)]
pub struct Cli {
    /// Emit JSON instead of markdown
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Bypass the HTTP cache for this invocation
    #[arg(long, global = true)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question about a drug; the first word names the drug unless --drug is given
    Ask {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        question: Vec<String>,
        /// Drug to look up instead of the question's first word
        #[arg(long)]
        drug: Option<String>,
        /// Show the label fields without calling the answer model
        #[arg(long)]
        no_answer: bool,
        /// Chat model (default: $LABELQA_MODEL or gpt-3.5-turbo)
        #[arg(long)]
        model: Option<String>,
        /// Tone requested from the model
        #[arg(long, default_value = DEFAULT_TONE)]
        tone: String,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f32>,
        /// Restrict displayed fields (repeatable; see `labelqa fields`)
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,
        /// Do not truncate long label sections
        #[arg(long)]
        full: bool,
    },
    /// Show the normalized label fields for a drug
    Label {
        name: String,
        /// Restrict displayed fields (repeatable; see `labelqa fields`)
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,
        /// Do not truncate long label sections
        #[arg(long)]
        full: bool,
    },
    /// List the label fields and the OpenFDA paths they are read from
    Fields,
    /// Check connectivity to OpenFDA, the answer endpoint and the cache directory
    Health {
        #[arg(long)]
        apis_only: bool,
    },
    /// Print version
    Version,
}

#[derive(serde::Serialize)]
struct FieldInfo {
    name: &'static str,
    path: String,
}

fn generator_options(
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
) -> GenerationOptions {
    let mut options = GenerationOptions::from_env();
    if let Some(model) = model {
        options.model = model;
    }
    if let Some(max_tokens) = max_tokens {
        options.max_tokens = max_tokens;
    }
    if let Some(temperature) = temperature {
        options.temperature = temperature;
    }
    options
}

fn render_fields(json: bool) -> Result<String, LabelQaError> {
    let spec = crate::transform::label::label_fields();
    if json {
        let rows: Vec<FieldInfo> = spec
            .fields()
            .iter()
            .map(|f| FieldInfo {
                name: f.name,
                path: f.path.join("."),
            })
            .collect();
        return crate::render::json::to_pretty(&rows);
    }
    crate::render::markdown::fields_markdown(spec)
}

async fn run_command(json: bool, command: Commands) -> anyhow::Result<String> {
    match command {
        Commands::Ask {
            question,
            drug,
            no_answer,
            model,
            tone,
            max_tokens,
            temperature,
            fields,
            full,
        } => {
            let question = question.join(" ");
            let generator = if no_answer {
                None
            } else {
                Some(OpenAiClient::new(generator_options(
                    model,
                    max_tokens,
                    temperature,
                ))?)
            };
            let options = AskOptions {
                drug,
                fields,
                tone,
            };
            let report = crate::entities::label::ask(
                &question,
                &options,
                generator.as_ref().map(|g| g as &dyn AnswerGenerator),
            )
            .await?;
            if json {
                Ok(crate::render::json::to_pretty(&report)?)
            } else {
                Ok(crate::render::markdown::label_markdown(&report, full)?)
            }
        }
        Commands::Label { name, fields, full } => {
            let report = crate::entities::label::get(&name, &fields).await?;
            if json {
                Ok(crate::render::json::to_pretty(&report)?)
            } else {
                Ok(crate::render::markdown::label_markdown(&report, full)?)
            }
        }
        Commands::Fields => Ok(render_fields(json)?),
        Commands::Health { apis_only } => {
            let report = health::check(apis_only).await?;
            if json {
                Ok(crate::render::json::to_pretty(&report)?)
            } else {
                Ok(report.to_markdown())
            }
        }
        Commands::Version => Ok(format!("labelqa {}", env!("CARGO_PKG_VERSION"))),
    }
}

/// Executes a parsed command and returns its rendered output.
///
/// # Errors
///
/// Returns the underlying [`LabelQaError`] (wrapped in `anyhow`) when input
/// validation, an upstream request, or rendering fails.
pub async fn run(cli: Cli) -> anyhow::Result<String> {
    let Cli {
        json,
        no_cache,
        command,
    } = cli;
    crate::sources::with_no_cache(no_cache, run_command(json, command)).await
}
