//! Rewrites extracted resume text for a target job with a generative model.

pub mod client;
pub mod error;
pub mod prompts;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::schema::AiConfig;
use crate::error::{ConfigError, Result};
use crate::job::Job;
use crate::secrets::resolve_secret;

pub use client::{ChatCompletionClient, ChatSettings, CompletionClient};
pub use error::{CompletionError, TailorError};

/// Optional description of the position a resume is tailored for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobContext {
    job_title: Option<String>,
    company_name: Option<String>,
    job_description: Option<String>,
}

impl JobContext {
    pub fn new(
        job_title: Option<String>,
        company_name: Option<String>,
        job_description: Option<String>,
    ) -> Self {
        Self {
            job_title: non_blank(job_title),
            company_name: non_blank(company_name),
            job_description: non_blank(job_description),
        }
    }

    pub fn from_job(job: &Job) -> Self {
        Self::new(
            job.job_title.clone(),
            job.company_name.clone(),
            job.job_description.clone(),
        )
    }

    pub fn job_title(&self) -> Option<&str> {
        self.job_title.as_deref()
    }

    pub fn company_name(&self) -> Option<&str> {
        self.company_name.as_deref()
    }

    pub fn job_description(&self) -> Option<&str> {
        self.job_description.as_deref()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Produces the tailored resume with exactly one completion call.
#[derive(Clone)]
pub struct TailoringEngine {
    client: Arc<dyn CompletionClient>,
}

impl TailoringEngine {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub fn from_config(config: &AiConfig, request_timeout: Duration) -> Result<Self> {
        let api_key = resolve_secret(
            config.api_key.as_deref(),
            config.api_key_file.as_deref(),
            config.api_key_env.as_deref(),
        )
        .map_err(|source| ConfigError::Secret {
            field: "ai.api_key",
            source,
        })?;

        let settings = ChatSettings {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            request_timeout,
        };
        let client = ChatCompletionClient::new(settings, api_key).map_err(TailorError::from)?;

        Ok(Self::new(Arc::new(client)))
    }

    pub async fn tailor(
        &self,
        resume_text: &str,
        context: &JobContext,
    ) -> std::result::Result<String, TailorError> {
        if resume_text.trim().is_empty() {
            return Err(TailorError::EmptyResume);
        }

        let user_prompt = prompts::build_user_prompt(resume_text, context);
        let completion = self
            .client
            .complete(prompts::SYSTEM_PROMPT, &user_prompt)
            .await?;

        let tailored = strip_code_fences(&completion);
        if tailored.is_empty() {
            return Err(CompletionError::EmptyCompletion.into());
        }

        debug!(chars = tailored.chars().count(), "Tailored resume generated");
        Ok(tailored.to_string())
    }
}

/// Strips a markdown code fence wrapping the whole completion.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. ```markdown) up to the first newline.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.trim_end()
        .strip_suffix("```")
        .map(str::trim)
        .unwrap_or_else(|| body.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    struct RecordingClient {
        reply: std::result::Result<String, u16>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CompletionClient for RecordingClient {
        async fn complete(
            &self,
            system_prompt: &str,
            user_prompt: &str,
        ) -> std::result::Result<String, CompletionError> {
            self.prompts
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_prompt.to_string()));
            self.reply.clone().map_err(|status| CompletionError::Api {
                status,
                message: "unavailable".to_string(),
            })
        }
    }

    fn engine(reply: std::result::Result<&str, u16>) -> (TailoringEngine, Arc<RecordingClient>) {
        let client = Arc::new(RecordingClient {
            reply: reply.map(str::to_string),
            prompts: Mutex::new(Vec::new()),
        });
        (TailoringEngine::new(client.clone()), client)
    }

    #[tokio::test]
    async fn test_tailor_sends_both_prompts() {
        let (engine, client) = engine(Ok("Jane Doe\nProfile Summary: ..."));
        let context = JobContext::new(Some("SRE".to_string()), None, None);

        let result = engine.tailor("Jane Doe resume", &context).await.unwrap();
        assert!(result.starts_with("Jane Doe"));

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].0, prompts::SYSTEM_PROMPT);
        assert!(prompts[0].1.contains("Job title: SRE"));
    }

    #[tokio::test]
    async fn test_tailor_propagates_api_error() {
        let (engine, _) = engine(Err(503));
        let result = engine.tailor("Jane Doe", &JobContext::default()).await;
        assert!(matches!(
            result,
            Err(TailorError::Completion(CompletionError::Api { status: 503, .. }))
        ));
    }

    #[tokio::test]
    async fn test_fenced_empty_completion_is_error() {
        let (engine, _) = engine(Ok("```\n```"));
        let result = engine.tailor("Jane Doe", &JobContext::default()).await;
        assert!(matches!(
            result,
            Err(TailorError::Completion(CompletionError::EmptyCompletion))
        ));
    }

    #[tokio::test]
    async fn test_empty_resume_rejected_without_call() {
        let (engine, client) = engine(Ok("anything"));
        let result = engine.tailor("   ", &JobContext::default()).await;
        assert!(matches!(result, Err(TailorError::EmptyResume)));
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```markdown\nJane Doe\n```"), "Jane Doe");
        assert_eq!(strip_code_fences("```\nJane Doe\n```"), "Jane Doe");
        assert_eq!(strip_code_fences("  Jane Doe  "), "Jane Doe");
        assert_eq!(strip_code_fences("```\nunterminated"), "unterminated");
    }

    #[test]
    fn test_job_context_blank_fields() {
        let context = JobContext::new(Some(" ".to_string()), Some(" Acme ".to_string()), None);
        assert_eq!(context.job_title(), None);
        assert_eq!(context.company_name(), Some("Acme"));
    }
}
