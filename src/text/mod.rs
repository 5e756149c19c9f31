// Text handling for streamed inference output

mod accumulator;
mod postprocess;

pub use accumulator::{MergeAction, StreamTextAccumulator};
pub use postprocess::{
    dedupe_repeated_phrases, effectively_unchanged, finalize_output, normalized_for_comparison,
    NormalizationRule,
};
