mod generate;
mod lifecycle;
mod tokenizer;

use candle_core::Device;

use crate::backend::RuntimeModel;
use crate::prompting::GenerationConfig;

pub use tokenizer::{SpecialTokens, TextTokenizer};

/// Quantized GGUF model run with candle. Serves both backend shapes:
/// [`crate::backend::BatchedGenerator`] and [`crate::backend::TextGenerationModel`].
pub struct CandleLlama {
    pub(super) model: RuntimeModel,
    pub(super) tokenizer: TextTokenizer,
    pub(super) device: Device,
    pub(super) generation: GenerationConfig,
    pub(super) max_batch_size: usize,
    pub(super) sampling_calls: u64,
}
