//! # LLM Helpers
//!
//! Provider dispatch for stage workers: builds the radkit client named by a
//! [`ModelConfig`](crate::models::ModelConfig) and runs a structured-output
//! `LlmFunction` against it.

/// Run an `LlmFunction` producing `$output_type` with whichever provider
/// `$config` selects. Expands to an `anyhow::Result<$output_type>`; provider
/// construction errors are propagated with `?` from the enclosing function.
#[macro_export]
macro_rules! run_llm_function {
    ($config:expr, $output_type:ty, $system_prompt:expr, $input:expr) => {{
        use radkit::agent::LlmFunction;
        use radkit::models::providers::{
            AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
        };
        use $crate::models::LlmProvider;

        let config: &$crate::models::ModelConfig = $config;
        let result: anyhow::Result<$output_type> = match config.provider {
            LlmProvider::Anthropic => {
                let llm = AnthropicLlm::from_env(&config.model)?;
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::OpenAI => {
                let mut llm = OpenAILlm::from_env(&config.model)?;
                if let Some(base_url) = &config.base_url {
                    llm = llm.with_base_url(base_url);
                }
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::Gemini => {
                let llm = GeminiLlm::from_env(&config.model)?;
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::OpenRouter => {
                let llm = OpenRouterLlm::from_env(&config.model)?;
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::Grok => {
                let llm = GrokLlm::from_env(&config.model)?;
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::DeepSeek => {
                let llm = DeepSeekLlm::from_env(&config.model)?;
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
        };
        result
    }};
}

/// Drop blank entries and trim the rest
pub(crate) fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Clamp a model-reported score into `[0, max]`. NaN passes through so the
/// patch check rejects it.
pub(crate) fn clamp_score(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        value
    } else {
        value.clamp(0.0, max)
    }
}

/// Render a bulleted block for a prompt, or a placeholder when empty
pub(crate) fn bullet_block(heading: &str, items: &[String]) -> String {
    if items.is_empty() {
        return format!("{}: (none)\n", heading);
    }
    let mut out = format!("{}:\n", heading);
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
    out
}
