//! Anthropic (Claude) letter generator

use super::client::{AnthropicClient, AnthropicConfig, PROVIDER};
use super::types::{Message, MessageRequest, MessageResponse};
use crate::LetterGenerator;
use async_trait::async_trait;
use futureself_core::{
    GeneratedLetter, GenerationFailure, LetterError, LetterRequest, LetterResult, Simulation,
    TokenUsage, Variant,
};

/// Letter generator backed by the Messages API.
pub struct AnthropicLetterGenerator {
    client: AnthropicClient,
    model: String,
    max_tokens: i32,
}

impl AnthropicLetterGenerator {
    pub fn new(config: &AnthropicConfig) -> LetterResult<Self> {
        config.validate()?;
        Ok(Self {
            client: AnthropicClient::new(config)?,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn from_env() -> LetterResult<Self> {
        Self::new(&AnthropicConfig::from_env()?)
    }

    fn system_prompt(variant: &Variant) -> String {
        let tone = match variant.as_str() {
            "direct" => "Be frank and concrete about what the current habits cost.",
            _ => "Be warm and encouraging about what is already going well.",
        };
        format!(
            "You write a short letter from the reader's future self, ten years \
             from now, about their finances. Never promise returns or give \
             investment advice. {tone}"
        )
    }

    fn user_prompt(simulation: &Simulation) -> String {
        format!(
            "Horizon: {} years.\n\
             Current path median: {:.0} (p10 {:.0}, p90 {:.0}).\n\
             Improved path median: {:.0} (p10 {:.0}, p90 {:.0}).\n\
             Write the letter.",
            simulation.horizon_years,
            simulation.current_path.median,
            simulation.current_path.p10,
            simulation.current_path.p90,
            simulation.improved_path.median,
            simulation.improved_path.p10,
            simulation.improved_path.p90,
        )
    }

    fn build_request(&self, request: &LetterRequest) -> MessageRequest {
        MessageRequest {
            model: self.model.clone(),
            system: Some(Self::system_prompt(&request.variant)),
            messages: vec![Message {
                role: "user".to_string(),
                content: Self::user_prompt(&request.simulation),
            }],
            max_tokens: self.max_tokens,
            temperature: Some(0.7),
        }
    }

    fn into_letter(response: MessageResponse) -> LetterResult<GeneratedLetter> {
        if response.was_refused() {
            return Err(LetterError::Generation(GenerationFailure::SafetyRejected {
                reason: format!("model refused ({})", response.id),
            }));
        }
        let content = response.text();
        if content.trim().is_empty() {
            return Err(LetterError::Generation(GenerationFailure::EmptyContent));
        }
        Ok(GeneratedLetter {
            content,
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
            model: response.model,
        })
    }
}

#[async_trait]
impl LetterGenerator for AnthropicLetterGenerator {
    fn provider_name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: &LetterRequest) -> LetterResult<GeneratedLetter> {
        let body = self.build_request(request);
        let response: MessageResponse = self.client.request("messages", &body).await?;
        tracing::debug!(
            subject_id = %request.subject_id,
            variant = %request.variant,
            output_tokens = response.usage.output_tokens,
            "Letter generated"
        );
        Self::into_letter(response)
    }
}

impl std::fmt::Debug for AnthropicLetterGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicLetterGenerator")
            .field("model", &self.model)
            .field("client", &self.client)
            .finish()
    }
}
