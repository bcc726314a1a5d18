use candle_core::Device;
use tracing::debug;

use crate::backend::{BatchedGenerator, TensorTokenizer, TextGenerationModel};
use crate::error::{QueryError, Result};
use crate::inference;
use crate::prompting::GenerationOptions;

use super::{NextTokenDistribution, QueryLm};

/// Adapter over a generic transformer backend. Generation only.
pub struct QueryHfModel<M, T> {
    model: M,
    tokenizer: T,
    device: Device,
    max_response_length: usize,
}

/// A `QueryHfModel` in the world-simulator role.
pub type WorldModel<M, T> = QueryHfModel<M, T>;

/// A `QueryHfModel` in the agent-policy role.
pub type AgentModel<M, T> = QueryHfModel<M, T>;

impl<M, T> QueryHfModel<M, T>
where
    M: TextGenerationModel,
    T: TensorTokenizer,
{
    pub fn new(model: M, tokenizer: T, device: Device, max_response_length: usize) -> Self {
        Self {
            model,
            tokenizer,
            device,
            max_response_length,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn max_response_length(&self) -> usize {
        self.max_response_length
    }
}

impl<B> QueryHfModel<B, B::Tokenizer>
where
    B: BatchedGenerator + TextGenerationModel,
    B::Tokenizer: TensorTokenizer + Clone,
{
    /// Wraps an engine that serves both backend shapes, sharing its tokenizer
    /// and the device its weights live on.
    pub fn from_engine(engine: B, max_response_length: usize) -> Self {
        let tokenizer = engine.tokenizer().clone();
        let device = engine.device().clone();
        Self::new(engine, tokenizer, device, max_response_length)
    }
}

impl<M, T> QueryLm for QueryHfModel<M, T>
where
    M: TextGenerationModel,
    T: TensorTokenizer,
{
    fn query_lm(&mut self, prompt: &str, options: &GenerationOptions) -> Result<Vec<String>> {
        let input_ids = self.tokenizer.encode_tensor(prompt, &self.device)?;
        debug!(input_len = input_ids.dims().last().copied().unwrap_or(0), "hf generate");

        let max_new_tokens = self.max_response_length;
        let sequences = inference::no_grad("query_hf", || {
            self.model.generate(&input_ids, max_new_tokens, options)
        })?;

        Ok(self.tokenizer.batch_decode(&sequences, true, true)?)
    }

    fn query_next_token(&mut self, _prompt: &str) -> Result<NextTokenDistribution> {
        Err(QueryError::UnsupportedOperation(
            "query_next_token is not available on generic transformer backends",
        ))
    }
}
