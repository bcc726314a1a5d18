//! Uniform query surface over the generation backends.

mod hf;
mod llama;

pub use hf::{AgentModel, QueryHfModel, WorldModel};
pub use llama::QueryLlama;

use crate::error::Result;
use crate::prompting::GenerationOptions;

/// The two operations a planner asks of a language model.
pub trait QueryLm {
    /// Generated texts for `prompt`, in request order.
    fn query_lm(&mut self, prompt: &str, options: &GenerationOptions) -> Result<Vec<String>>;

    /// Next-token probabilities over the adapter's fixed target ids.
    /// Adapters without raw logits access return `UnsupportedOperation`.
    fn query_next_token(&mut self, prompt: &str) -> Result<NextTokenDistribution>;
}

/// Softmax over the ids of "Yes" and "No", in that order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextTokenDistribution {
    token_ids: [u32; 2],
    probs: [f32; 2],
}

impl NextTokenDistribution {
    pub(crate) fn new(token_ids: [u32; 2], probs: [f32; 2]) -> Self {
        Self { token_ids, probs }
    }

    pub fn token_ids(&self) -> [u32; 2] {
        self.token_ids
    }

    pub fn probs(&self) -> [f32; 2] {
        self.probs
    }

    pub fn yes(&self) -> f32 {
        self.probs[0]
    }

    pub fn no(&self) -> f32 {
        self.probs[1]
    }
}
