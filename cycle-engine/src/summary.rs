use crate::config::GenerationConfig;
use crate::pricing::{PriceLookup, PricingTable};
use crate::types::{EngineError, GenerationRequest, Result, Summary, TextGenerator};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

const SYSTEM_PROMPT: &str = "You are an expert content summarization assistant. Your task is to analyze and summarize content from various sources (social media, news, videos, etc.) in a clear, concise, and insightful manner.

Guidelines:
1. Identify and highlight key themes, trends, and insights
2. Organize information logically by topic or theme
3. Use clear, professional language
4. Include relevant quotes or data points when significant
5. Provide context for technical or domain-specific content
6. Note any emerging patterns or anomalies
7. Keep the summary focused on actionable insights

Format your summary with:
- Executive Summary (2-3 sentences)
- Key Themes (bulleted list with details)
- Notable Items (specific posts/videos/articles worth highlighting)
- Trends & Insights (patterns observed across sources)
";

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Token estimate at 0.75 words per token, i.e. `floor(words / 0.75)`.
pub fn estimate_tokens(words: usize) -> u64 {
    (words as u64 * 4) / 3
}

pub fn build_user_prompt(aggregated: &str, custom_prompt: Option<&str>) -> String {
    match custom_prompt.filter(|c| !c.trim().is_empty()) {
        Some(custom) => format!("{}\n\nAdditional Instructions:\n{}", aggregated, custom),
        None => aggregated.to_string(),
    }
}

/// Drives one generation call over an aggregated document and accounts for it.
pub struct SummaryGenerator {
    generator: Arc<dyn TextGenerator>,
    model: String,
    pricing: Arc<PricingTable>,
    config: GenerationConfig,
}

impl SummaryGenerator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        model: impl Into<String>,
        pricing: Arc<PricingTable>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            generator,
            model: model.into(),
            pricing,
            config,
        }
    }

    pub async fn summarize(&self, aggregated: &str, custom_prompt: Option<&str>) -> Result<Summary> {
        let start_time = Instant::now();
        let user_prompt = build_user_prompt(aggregated, custom_prompt);

        let request = GenerationRequest {
            model: self.model.clone(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        info!("Generating summary with {}...", self.model);
        let text = self.generator.generate(&request).await.map_err(|e| {
            error!("Summary generation failed: {:#}", e);
            EngineError::Summarization(e.to_string())
        })?;
        let generation_time_ms = start_time.elapsed().as_millis() as u64;

        let words = word_count(&text);
        let input_tokens = estimate_tokens(word_count(&request.user_prompt));
        let output_tokens = estimate_tokens(words);
        let cost_usd = self.pricing.cost(&self.model, input_tokens, output_tokens);
        let pricing_warning = match self.pricing.lookup(&self.model) {
            PriceLookup::Known(_) => None,
            PriceLookup::Unknown => {
                warn!("Summary cost for {} is unpriced and recorded as 0", self.model);
                Some(format!("Pricing not available for model {}", self.model))
            }
        };

        info!(
            "Summary generated: {} words, {} input tokens, {} output tokens, ${:.4}, {}ms",
            words, input_tokens, output_tokens, cost_usd, generation_time_ms
        );

        Ok(Summary {
            text,
            word_count: words,
            input_tokens,
            output_tokens,
            cost_usd,
            generation_time_ms,
            provider: self.generator.provider_name(),
            model: self.model.clone(),
            pricing_warning,
        })
    }
}
