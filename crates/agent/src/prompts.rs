use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tera::{Context, Tera};
use thiserror::Error;

/// Schema description handed to the query steps. Descriptive input for the
/// model, not enforced anywhere.
pub const VEHICLE_SCHEMA: &str = "\
Table: vehicles
Columns:
- id INTEGER PRIMARY KEY
- brand TEXT (for example 'Toyota', 'BMW', 'Tesla')
- model TEXT (for example 'Corolla', 'X5', 'Model 3')
- year INTEGER (2015-2025)
- engine_type TEXT (one of 'inline_4', 'inline_6', 'v6', 'v8', 'electric', 'hybrid')
- fuel_type TEXT (one of 'gasoline', 'diesel', 'electric', 'hybrid')
- color TEXT (for example 'White', 'Black', 'Silver')
- mileage REAL (kilometers, 0-150000)
- number_of_doors INTEGER (2, 4, or 5)
- transmission TEXT (one of 'manual', 'automatic', 'cvt', 'dual_clutch')
- price REAL (US dollars, may be NULL when unlisted)";

const GENERAL_ASSIST: &str = include_str!("../../../templates/prompts/general_assist.tera");
const JUDGE_EXTRACT: &str = include_str!("../../../templates/prompts/judge_extract.tera");
const JUDGE_VALIDATE: &str = include_str!("../../../templates/prompts/judge_validate.tera");
const SQL_GENERATE: &str = include_str!("../../../templates/prompts/sql_generate.tera");
const SQL_REFINE: &str = include_str!("../../../templates/prompts/sql_refine.tera");
const SYNTHESIZE: &str = include_str!("../../../templates/prompts/synthesize.tera");

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("template rendering failed: {0}")]
    Render(#[from] tera::Error),
    #[error("generation reply was not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("generation reply contained no JSON object")]
    MissingJson,
}

/// One rendered-instruction source per generation step. Templates are
/// compiled in at build time; prompt text is configuration data, not code.
pub struct PromptCatalog {
    tera: Tera,
}

impl PromptCatalog {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("general_assist", GENERAL_ASSIST),
            ("judge_extract", JUDGE_EXTRACT),
            ("judge_validate", JUDGE_VALIDATE),
            ("sql_generate", SQL_GENERATE),
            ("sql_refine", SQL_REFINE),
            ("synthesize", SYNTHESIZE),
        ])?;
        Ok(Self { tera })
    }

    pub fn general_assist(
        &self,
        conversation: &str,
        user_message: &str,
    ) -> Result<String, PromptError> {
        let mut context = base_context();
        context.insert("conversation", conversation);
        context.insert("user_message", user_message);
        Ok(self.tera.render("general_assist", &context)?)
    }

    pub fn judge_extract(&self, conversation: &str) -> Result<String, PromptError> {
        let mut context = base_context();
        context.insert("conversation", conversation);
        Ok(self.tera.render("judge_extract", &context)?)
    }

    pub fn judge_validate(&self, conversation: &str) -> Result<String, PromptError> {
        let mut context = base_context();
        context.insert("conversation", conversation);
        Ok(self.tera.render("judge_validate", &context)?)
    }

    /// Fresh mode when `previous` is `None`; fix mode carries the rejected
    /// query and the database's error text back into the instructions.
    pub fn sql_generate(
        &self,
        summary: &str,
        previous: Option<(&str, &str)>,
    ) -> Result<String, PromptError> {
        let mut context = base_context();
        context.insert("schema", VEHICLE_SCHEMA);
        context.insert("summary", summary);
        if let Some((previous_query, previous_error)) = previous {
            context.insert("previous_query", previous_query);
            context.insert("previous_error", previous_error);
        }
        Ok(self.tera.render("sql_generate", &context)?)
    }

    pub fn sql_refine(
        &self,
        candidate_query: &str,
        summary: &str,
        previous: Option<(&str, &str)>,
    ) -> Result<String, PromptError> {
        let mut context = base_context();
        context.insert("schema", VEHICLE_SCHEMA);
        context.insert("summary", summary);
        context.insert("candidate_query", candidate_query);
        if let Some((previous_query, previous_error)) = previous {
            context.insert("previous_query", previous_query);
            context.insert("previous_error", previous_error);
        }
        Ok(self.tera.render("sql_refine", &context)?)
    }

    pub fn synthesize(&self, results_json: &str) -> Result<String, PromptError> {
        let mut context = base_context();
        context.insert("results", results_json);
        Ok(self.tera.render("synthesize", &context)?)
    }
}

fn base_context() -> Context {
    let mut context = Context::new();
    context.insert("now", &Utc::now().to_rfc3339());
    context
}

/// Intent classifier output (§ general_assist template contract).
#[derive(Debug, Deserialize)]
pub struct AssistReply {
    pub extracted_info: String,
    #[serde(default)]
    pub confidence: String,
}

/// Judging output, shared by the extraction and validation template variants.
#[derive(Debug, Deserialize)]
pub struct JudgeReply {
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub validation_question: String,
    #[serde(default)]
    pub issues_detected: String,
    #[serde(default)]
    pub confidence: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SqlReply {
    #[serde(default)]
    pub rationale: String,
    pub query_text: String,
    #[serde(default)]
    pub confidence: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RefineReply {
    #[serde(default)]
    pub feedback: String,
    pub refined_query: String,
    #[serde(default)]
    pub confidence: String,
}

/// Decodes a step reply, tolerating Markdown fences and prose around the
/// JSON object. Models do not always follow the no-markdown instruction.
pub fn parse_step_reply<T: DeserializeOwned>(raw: &str) -> Result<T, PromptError> {
    let text = raw.trim();
    let start = text.find('{').ok_or(PromptError::MissingJson)?;
    let end = text.rfind('}').ok_or(PromptError::MissingJson)?;
    if end < start {
        return Err(PromptError::MissingJson);
    }
    Ok(serde_json::from_str(&text[start..=end])?)
}
