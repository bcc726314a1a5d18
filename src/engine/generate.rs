use anyhow::{Error as E, Result};
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use tracing::debug;

use crate::backend::{BatchedGenerator, LogitsSource, PieceTokenizer, TextGenerationModel};
use crate::prompting::GenerationOptions;

use super::{CandleLlama, TextTokenizer};

/// An explicit seed is used as given. Without one, the configured seed is
/// offset by the call counter so repeated calls draw different samples.
fn sampling_seed(explicit: Option<u64>, default_seed: u64, calls: u64) -> u64 {
    match explicit {
        Some(seed) => seed,
        None => default_seed.wrapping_add(calls),
    }
}

/// Temperatures at or below zero select argmax decoding.
fn build_logits_processor(temperature: f64, top_p: f64, seed: u64) -> LogitsProcessor {
    let temperature = (temperature > 0.0).then_some(temperature);
    LogitsProcessor::new(seed, temperature, Some(top_p))
}

fn check_batch_capacity(prompts: usize, max_batch_size: usize) -> Result<()> {
    if prompts > max_batch_size {
        return Err(E::msg(format!(
            "batch of {} prompts exceeds max_batch_size {}",
            prompts, max_batch_size
        )));
    }
    Ok(())
}

/// Autoregressive decode of one sequence. Returns prompt ids followed by the
/// generated ids; the stop token itself is not kept. Generation also ends once
/// the sequence fills the model's context window.
fn decode_sequence<M: LogitsSource>(
    model: &mut M,
    device: &Device,
    prompt_ids: &[u32],
    max_new_tokens: usize,
    sampler: &mut LogitsProcessor,
    eos_token_id: Option<u32>,
    tokenizer_eos: u32,
) -> Result<Vec<u32>> {
    if prompt_ids.is_empty() {
        return Err(E::msg("empty prompt"));
    }
    let context_length = model.context_length();
    if prompt_ids.len() > context_length {
        return Err(E::msg(format!(
            "prompt of {} tokens exceeds context length {}",
            prompt_ids.len(),
            context_length
        )));
    }
    let budget = max_new_tokens.min(context_length - prompt_ids.len());

    let mut tokens = prompt_ids.to_vec();
    let mut index_pos = 0;

    for _ in 0..budget {
        let context_size = if index_pos == 0 { tokens.len() } else { 1 };
        let start_pos = tokens.len().saturating_sub(context_size);

        let input_tokens = &tokens[start_pos..];
        let input_len = input_tokens.len();
        let input = Tensor::new(input_tokens, device)?.unsqueeze(0)?;

        let logits = model.next_logits(&input, index_pos)?;
        let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
        let next_token = sampler.sample(&logits)?;
        index_pos += input_len;

        if Some(next_token) == eos_token_id || next_token == tokenizer_eos {
            break;
        }
        tokens.push(next_token);
    }

    Ok(tokens)
}

impl CandleLlama {
    fn logits_processor(&mut self, temperature: f64, top_p: Option<f64>, seed: Option<u64>) -> LogitsProcessor {
        let seed = sampling_seed(seed, self.generation.seed, self.sampling_calls);
        self.sampling_calls += 1;
        build_logits_processor(temperature, top_p.unwrap_or(self.generation.top_p), seed)
    }
}

impl BatchedGenerator for CandleLlama {
    type Tokenizer = TextTokenizer;

    fn tokenizer(&self) -> &TextTokenizer {
        &self.tokenizer
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn generate(
        &mut self,
        prompts: &[String],
        max_gen_len: usize,
        temperature: f64,
        eos_token_id: Option<u32>,
    ) -> Result<Vec<String>> {
        check_batch_capacity(prompts.len(), self.max_batch_size)?;

        let mut sampler = self.logits_processor(temperature, None, None);
        let tokenizer_eos = self.tokenizer.eos_id();
        let mut decoded = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let prompt_ids = self.tokenizer.encode(prompt, true, false)?;
            let tokens = decode_sequence(
                &mut self.model,
                &self.device,
                &prompt_ids,
                max_gen_len,
                &mut sampler,
                eos_token_id,
                tokenizer_eos,
            )?;
            debug!(
                prompt_tokens = prompt_ids.len(),
                generated = tokens.len() - prompt_ids.len(),
                "sequence decoded"
            );
            decoded.push(self.tokenizer.decode(&tokens)?);
        }
        Ok(decoded)
    }

    fn forward(&mut self, tokens: &Tensor, start_pos: usize) -> Result<Tensor> {
        debug!(shape = ?tokens.dims(), start_pos, "forward pass");
        let logits = self.model.forward(tokens, start_pos)?;
        Ok(logits.to_dtype(DType::F32)?)
    }
}

impl TextGenerationModel for CandleLlama {
    fn generate(
        &mut self,
        input_ids: &Tensor,
        max_new_tokens: usize,
        options: &GenerationOptions,
    ) -> Result<Vec<Vec<u32>>> {
        let prompt_ids = input_ids.get(0)?.to_vec1::<u32>()?;
        let mut sampler = self.logits_processor(options.effective_temperature(), options.top_p, options.seed);
        let tokenizer_eos = self.tokenizer.eos_id();

        let mut sequences = Vec::with_capacity(options.num_return_sequences);
        for _ in 0..options.num_return_sequences {
            let tokens = decode_sequence(
                &mut self.model,
                &self.device,
                &prompt_ids,
                max_new_tokens,
                &mut sampler,
                options.eos_token_id,
                tokenizer_eos,
            )?;
            sequences.push(tokens);
        }
        Ok(sequences)
    }
}
