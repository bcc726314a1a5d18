use std::path::PathBuf;

use candle_core::{DType, Tensor, D};
use tracing::debug;

use crate::backend::{BatchedGenerator, PieceTokenizer};
use crate::error::{QueryError, Result};
use crate::generation_log::GenerationLog;
use crate::inference;
use crate::prompting::{batch_ranges, GenerationOptions, YES_NO_TARGETS};

use super::{NextTokenDistribution, QueryLm};

/// Adapter over a batched LLaMA-style backend.
///
/// `query_lm` replicates the prompt and feeds it to the backend in chunks of at
/// most `max_batch_size`. `query_next_token` scores the ids of "Yes" and "No".
pub struct QueryLlama<B: BatchedGenerator> {
    backend: B,
    max_response_length: usize,
    log: Option<GenerationLog>,
    max_batch_size: usize,
    yes_no: [u32; 2],
}

impl<B: BatchedGenerator> QueryLlama<B> {
    pub fn new(backend: B, max_response_length: usize, log_file: Option<PathBuf>) -> Result<Self> {
        let max_batch_size = backend.max_batch_size();
        if max_batch_size == 0 {
            return Err(QueryError::InvalidBatchSize);
        }

        let ids = backend.tokenizer().encode(YES_NO_TARGETS, false, false)?;
        let yes_no = <[u32; 2]>::try_from(ids.as_slice()).map_err(|_| QueryError::TargetTokens {
            text: YES_NO_TARGETS,
            ids: ids.clone(),
        })?;

        Ok(Self {
            backend,
            max_response_length,
            log: log_file.map(GenerationLog::new),
            max_batch_size,
            yes_no,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn target_token_ids(&self) -> [u32; 2] {
        self.yes_no
    }

    pub fn log(&self) -> Option<&GenerationLog> {
        self.log.as_ref()
    }
}

impl<B: BatchedGenerator> QueryLm for QueryLlama<B> {
    fn query_lm(&mut self, prompt: &str, options: &GenerationOptions) -> Result<Vec<String>> {
        let temperature = options.effective_temperature();
        let total = options.num_return_sequences;

        let mut all_results = Vec::with_capacity(total);
        for chunk in batch_ranges(total, self.max_batch_size) {
            debug!(start = chunk.start, end = chunk.end, temperature, "generation chunk");
            let prompts = vec![prompt.to_string(); chunk.len()];
            let results = self.backend.generate(
                &prompts,
                self.max_response_length,
                temperature,
                options.eos_token_id,
            )?;
            all_results.extend(results);
        }

        if let Some(log) = &self.log {
            log.append(prompt, &all_results)?;
        }

        Ok(all_results)
    }

    fn query_next_token(&mut self, prompt: &str) -> Result<NextTokenDistribution> {
        let device = self.backend.device().clone();
        let tokenizer = self.backend.tokenizer();
        let input = tokenizer.encode(prompt, true, false)?;
        if input.is_empty() {
            return Err(QueryError::Backend(anyhow::anyhow!("empty prompt")));
        }

        let mut row = vec![tokenizer.pad_id(); input.len()];
        row[..input.len()].copy_from_slice(&input);
        let tokens = Tensor::new(row.as_slice(), &device)?.unsqueeze(0)?;

        let logits = inference::no_grad("query_next_token", || self.backend.forward(&tokens, 0))?;
        let last = inference::final_position_logits(&logits)?;

        let target = Tensor::new(self.yes_no.as_slice(), &device)?;
        let picked = last.index_select(&target, 0)?.to_dtype(DType::F32)?;
        let probs = candle_nn::ops::softmax(&picked, D::Minus1)?.to_vec1::<f32>()?;
        let probs = <[f32; 2]>::try_from(probs.as_slice()).map_err(|_| {
            QueryError::Backend(anyhow::anyhow!("expected 2 probabilities, got {}", probs.len()))
        })?;

        Ok(NextTokenDistribution::new(self.yes_no, probs))
    }
}
