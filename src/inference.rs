//! Inference-mode scoping.
//!
//! candle only records an autograd graph for tensors derived from a `Var`. The
//! scope below marks a section as inference-only, and outputs leaving it are
//! detached so no graph outlives the call.

use std::time::Instant;

use candle_core::Tensor;
use tracing::{debug, span::EnteredSpan};

pub struct InferenceScope {
    label: &'static str,
    started: Instant,
    _span: EnteredSpan,
}

impl InferenceScope {
    pub fn enter(label: &'static str) -> Self {
        let span = tracing::debug_span!("inference", label).entered();
        Self {
            label,
            started: Instant::now(),
            _span: span,
        }
    }
}

impl Drop for InferenceScope {
    fn drop(&mut self) {
        debug!(
            label = self.label,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "inference scope closed"
        );
    }
}

/// Runs `f` inside an [`InferenceScope`]. The scope closes when `f` returns,
/// whether it succeeded or not.
pub fn no_grad<R>(label: &'static str, f: impl FnOnce() -> R) -> R {
    let _scope = InferenceScope::enter(label);
    f()
}

/// Picks the final-position row out of backend logits.
///
/// Accepts `(batch, vocab)` as returned by the LLaMA-style forward pass, or
/// `(batch, seq, vocab)` from backends that keep every position. Row 0 is used.
pub fn final_position_logits(logits: &Tensor) -> candle_core::Result<Tensor> {
    let logits = logits.detach();
    match logits.rank() {
        1 => Ok(logits),
        2 => logits.get(0),
        3 => {
            let seq_len = logits.dim(1)?;
            logits.get(0)?.get(seq_len.saturating_sub(1))
        }
        rank => Err(candle_core::Error::Msg(format!(
            "unexpected logits rank {} (shape {:?})",
            rank,
            logits.dims()
        ))),
    }
}
