//! Published list prices, USD per million tokens.
//!
//! Lookup is by longest matching model-id prefix so dated snapshots
//! (`gpt-4o-2024-08-06`) resolve to their family. Local backends and unknown
//! models cost nothing.

use crate::types::Usage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub prefix: &'static str,
    pub input_per_million: f64,
    pub output_per_million: f64,
}

const fn price(prefix: &'static str, input: f64, output: f64) -> ModelPrice {
    ModelPrice {
        prefix,
        input_per_million: input,
        output_per_million: output,
    }
}

const OPENAI: &[ModelPrice] = &[
    price("gpt-4o-mini", 0.15, 0.60),
    price("gpt-4o", 2.50, 10.00),
    price("gpt-4.1-nano", 0.10, 0.40),
    price("gpt-4.1-mini", 0.40, 1.60),
    price("gpt-4.1", 2.00, 8.00),
    price("gpt-4-turbo", 10.00, 30.00),
    price("gpt-3.5-turbo", 0.50, 1.50),
    price("o1-mini", 1.10, 4.40),
    price("o1", 15.00, 60.00),
    price("o3-mini", 1.10, 4.40),
];

const DEEPSEEK: &[ModelPrice] = &[
    price("deepseek-chat", 0.27, 1.10),
    price("deepseek-reasoner", 0.55, 2.19),
];

const ANTHROPIC: &[ModelPrice] = &[
    price("claude-3-haiku", 0.25, 1.25),
    price("claude-3-5-haiku", 0.80, 4.00),
    price("claude-3-5-sonnet", 3.00, 15.00),
    price("claude-3-7-sonnet", 3.00, 15.00),
    price("claude-sonnet-4", 3.00, 15.00),
    price("claude-3-opus", 15.00, 75.00),
    price("claude-opus-4", 15.00, 75.00),
];

const GEMINI: &[ModelPrice] = &[
    price("gemini-1.5-flash", 0.075, 0.30),
    price("gemini-1.5-pro", 1.25, 5.00),
    price("gemini-2.0-flash-lite", 0.075, 0.30),
    price("gemini-2.0-flash", 0.10, 0.40),
    price("gemini-2.5-flash", 0.30, 2.50),
    price("gemini-2.5-pro", 1.25, 10.00),
];

fn table(provider: &str) -> &'static [ModelPrice] {
    match provider {
        "openai" => OPENAI,
        "deepseek" => DEEPSEEK,
        "anthropic" => ANTHROPIC,
        "gemini" => GEMINI,
        _ => &[],
    }
}

pub fn price_for(provider: &str, model: &str) -> Option<&'static ModelPrice> {
    let model = model.strip_prefix("models/").unwrap_or(model);
    table(provider)
        .iter()
        .filter(|p| model.starts_with(p.prefix))
        .max_by_key(|p| p.prefix.len())
}

pub fn cost_for(provider: &str, model: &str, usage: &Usage) -> f64 {
    price_for(provider, model).map_or(0.0, |p| {
        (usage.prompt_tokens as f64 * p.input_per_million
            + usage.completion_tokens as f64 * p.output_per_million)
            / 1_000_000.0
    })
}
