use crate::engine::inference_engine::{OnnxSession, SessionConfig};
use crate::error::SamResult;
use crate::inference::sam::variant::ModelVariant;
use image::GrayImage;
use log::info;
use ndarray::{Array2, ArrayD};
use parking_lot::Mutex;
use std::path::Path;

pub mod auto_segment;
pub mod image_inference;
pub mod mask_inference;
pub mod variant;

/// One loaded encoder/decoder pair plus the cached embedding for the
/// current image.
///
/// All mutable state sits behind a single mutex, so image loads and mask
/// queries share one exclusion domain; callers may use a `Sam` from many
/// threads and every mask-producing call is fully serialized.
pub struct Sam {
    variant: ModelVariant,
    input_width: u32,
    input_height: u32,
    state: Mutex<SamState>,
}

pub(crate) struct SamState {
    pub(crate) encoder: OnnxSession,
    pub(crate) decoder: OnnxSession,
    /// Encoder output for the current image, batch x channels x H x W.
    /// Overwritten wholesale on every image load, reused in place when the
    /// shape is unchanged.
    pub(crate) embedding: Option<ArrayD<f32>>,
    /// 5-D intermediate embeddings, present for the high-quality variant only.
    pub(crate) interm_embedding: Option<ArrayD<f32>>,
}

/// A binary mask at the model's input resolution (255 = foreground) and
/// the decoder's confidence score for it.
pub struct MaskResult {
    pub mask: GrayImage,
    pub score: f32,
}

/// Label image produced by auto-segmentation. Zero means unassigned;
/// label `k` belongs to the instance with area `areas[k - 1]`.
pub struct InstanceMap {
    pub labels: Array2<f64>,
    pub areas: Vec<f64>,
}

impl InstanceMap {
    pub fn instance_count(&self) -> usize {
        self.areas.len()
    }
}

impl Sam {
    /// Loads the encoder and decoder models and detects the variant from
    /// their tensor signatures. Any signature mismatch fails here; a `Sam`
    /// that exists is always usable.
    pub fn new(
        encoder_path: impl AsRef<Path>,
        decoder_path: impl AsRef<Path>,
        config: &SessionConfig,
    ) -> SamResult<Self> {
        let encoder = OnnxSession::new(encoder_path, config)?;
        let decoder = OnnxSession::new(decoder_path, config)?;

        let signature = variant::detect(&encoder, &decoder)?;
        info!(
            "SAM session created: variant {:?}, input {}x{}",
            signature.variant, signature.input_width, signature.input_height
        );

        Ok(Sam {
            variant: signature.variant,
            input_width: signature.input_width,
            input_height: signature.input_height,
            state: Mutex::new(SamState {
                encoder,
                decoder,
                embedding: None,
                interm_embedding: None,
            }),
        })
    }

    /// The (width, height) every input image must match exactly.
    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }
}
