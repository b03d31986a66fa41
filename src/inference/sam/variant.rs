use crate::error::{SamError, SamResult};
use ort::session::Session;
use ort::value::ValueType;

/// The three supported model families. Detected once at load time by
/// counting session inputs and outputs; model files carry no metadata that
/// names the variant, so detection must be structural.
///
/// The variant fixes the tensor name tables, the decoder arity, whether an
/// intermediate-embeddings tensor exists, whether pixels are fed as [0,1]
/// floats, and which decoder output holds the mask versus the score.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModelVariant {
    Standard,
    HighQuality,
    Edge,
}

const DECODER_INPUTS: [&str; 6] = [
    "image_embeddings",
    "point_coords",
    "point_labels",
    "mask_input",
    "has_mask_input",
    "orig_im_size",
];
const DECODER_INPUTS_HQ: [&str; 7] = [
    "image_embeddings",
    "interm_embeddings",
    "point_coords",
    "point_labels",
    "mask_input",
    "has_mask_input",
    "orig_im_size",
];
const DECODER_INPUTS_EDGE: [&str; 3] = ["image_embeddings", "point_coords", "point_labels"];

const DECODER_OUTPUTS: [&str; 3] = ["masks", "iou_predictions", "low_res_masks"];
const DECODER_OUTPUTS_EDGE: [&str; 2] = ["scores", "masks"];

const ENCODER_OUTPUTS: [&str; 2] = ["output", "interm_embeddings"];
const ENCODER_OUTPUTS_EDGE: [&str; 1] = ["image_embeddings"];

impl ModelVariant {
    /// Classifies a session pair from its input/output counts alone.
    /// Two encoder outputs mean high quality, two decoder outputs mean the
    /// edge variant; anything that does not then match the variant's
    /// expected decoder arity is a fatal load error.
    pub(crate) fn from_signature(
        encoder_inputs: usize,
        encoder_outputs: usize,
        decoder_inputs: usize,
        decoder_outputs: usize,
    ) -> SamResult<ModelVariant> {
        if encoder_inputs != 1 {
            return Err(SamError::Load(format!(
                "encoder must have exactly 1 input, found {encoder_inputs}"
            )));
        }

        let high_quality = encoder_outputs == 2;
        if !high_quality && encoder_outputs != 1 {
            return Err(SamError::Load(format!(
                "encoder must have 1 or 2 outputs, found {encoder_outputs}"
            )));
        }

        let edge = decoder_outputs == 2;
        if high_quality && edge {
            return Err(SamError::Load(
                "ambiguous signature: 2 encoder outputs with 2 decoder outputs".into(),
            ));
        }

        let variant = if edge {
            ModelVariant::Edge
        } else if high_quality {
            ModelVariant::HighQuality
        } else {
            ModelVariant::Standard
        };

        let expected_inputs = variant.decoder_input_names().len();
        if decoder_inputs != expected_inputs {
            return Err(SamError::Load(format!(
                "decoder must have {expected_inputs} inputs for the {variant:?} variant, found {decoder_inputs}"
            )));
        }
        if !edge && decoder_outputs != 3 {
            return Err(SamError::Load(format!(
                "decoder must have 3 outputs, found {decoder_outputs}"
            )));
        }

        Ok(variant)
    }

    pub fn encoder_input_name(self) -> &'static str {
        match self {
            ModelVariant::Edge => "image",
            _ => "input",
        }
    }

    pub fn encoder_output_names(self) -> &'static [&'static str] {
        match self {
            ModelVariant::Edge => &ENCODER_OUTPUTS_EDGE,
            _ => &ENCODER_OUTPUTS,
        }
    }

    pub fn decoder_input_names(self) -> &'static [&'static str] {
        match self {
            ModelVariant::Standard => &DECODER_INPUTS,
            ModelVariant::HighQuality => &DECODER_INPUTS_HQ,
            ModelVariant::Edge => &DECODER_INPUTS_EDGE,
        }
    }

    pub fn decoder_output_names(self) -> &'static [&'static str] {
        match self {
            ModelVariant::Edge => &DECODER_OUTPUTS_EDGE,
            _ => &DECODER_OUTPUTS,
        }
    }

    /// The edge decoder emits (scores, masks); the others emit
    /// (masks, iou_predictions, ..).
    pub fn mask_output_index(self) -> usize {
        match self {
            ModelVariant::Edge => 1,
            _ => 0,
        }
    }

    pub fn score_output_index(self) -> usize {
        match self {
            ModelVariant::Edge => 0,
            _ => 1,
        }
    }

    /// Edge models take [0,1] floats; the others take raw bytes.
    pub fn normalizes_pixels(self) -> bool {
        self == ModelVariant::Edge
    }

    /// Whether the decoder expects the mask-hint, has-mask and
    /// original-size tensors.
    pub fn uses_mask_hint(self) -> bool {
        self != ModelVariant::Edge
    }
}

pub(crate) struct ModelSignature {
    pub variant: ModelVariant,
    pub input_width: u32,
    pub input_height: u32,
}

/// Validates both sessions against the detected variant and pins the
/// encoder's static input resolution.
pub(crate) fn detect(encoder: &Session, decoder: &Session) -> SamResult<ModelSignature> {
    let variant = ModelVariant::from_signature(
        encoder.inputs.len(),
        encoder.outputs.len(),
        decoder.inputs.len(),
        decoder.outputs.len(),
    )?;

    let input_shape = tensor_dimensions(&encoder.inputs[0].input_type)
        .ok_or_else(|| SamError::Load("encoder input is not a tensor".into()))?;
    let output_shape = tensor_dimensions(&encoder.outputs[0].output_type)
        .ok_or_else(|| SamError::Load("encoder output is not a tensor".into()))?;
    if input_shape.len() != 4 || output_shape.len() != 4 {
        return Err(SamError::Load(format!(
            "encoder input/output must be rank 4, found rank {}/{}",
            input_shape.len(),
            output_shape.len()
        )));
    }

    if variant == ModelVariant::HighQuality {
        let interm_shape = tensor_dimensions(&decoder.inputs[1].input_type)
            .ok_or_else(|| SamError::Load("intermediate embeddings input is not a tensor".into()))?;
        if interm_shape.len() != 5 {
            return Err(SamError::Load(format!(
                "intermediate embeddings must be rank 5, found rank {}",
                interm_shape.len()
            )));
        }
    }

    let (height, width) = (input_shape[2], input_shape[3]);
    if height <= 0 || width <= 0 {
        return Err(SamError::Load(
            "encoder input height/width must be static".into(),
        ));
    }

    Ok(ModelSignature {
        variant,
        input_width: width as u32,
        input_height: height as u32,
    })
}

fn tensor_dimensions(value_type: &ValueType) -> Option<Vec<i64>> {
    match value_type {
        ValueType::Tensor { shape, .. } => Some(shape.to_vec()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_signature() {
        let variant = ModelVariant::from_signature(1, 1, 6, 3).unwrap();
        assert_eq!(variant, ModelVariant::Standard);
        assert_eq!(variant.decoder_input_names().len(), 6);
        assert_eq!(variant.mask_output_index(), 0);
        assert_eq!(variant.score_output_index(), 1);
        assert!(!variant.normalizes_pixels());
        assert!(variant.uses_mask_hint());
    }

    #[test]
    fn two_encoder_outputs_select_high_quality() {
        let variant = ModelVariant::from_signature(1, 2, 7, 3).unwrap();
        assert_eq!(variant, ModelVariant::HighQuality);
        assert_eq!(variant.decoder_input_names()[1], "interm_embeddings");
        assert_eq!(variant.decoder_output_names()[0], "masks");
    }

    #[test]
    fn two_decoder_outputs_select_edge_and_swap_indices() {
        let variant = ModelVariant::from_signature(1, 1, 3, 2).unwrap();
        assert_eq!(variant, ModelVariant::Edge);
        assert_eq!(variant.decoder_output_names()[variant.mask_output_index()], "masks");
        assert_eq!(variant.decoder_output_names()[variant.score_output_index()], "scores");
        assert!(variant.normalizes_pixels());
        assert!(!variant.uses_mask_hint());
    }

    #[test]
    fn arity_mismatches_are_load_errors() {
        assert!(matches!(
            ModelVariant::from_signature(2, 1, 6, 3),
            Err(SamError::Load(_))
        ));
        assert!(matches!(
            ModelVariant::from_signature(1, 1, 7, 3),
            Err(SamError::Load(_))
        ));
        assert!(matches!(
            ModelVariant::from_signature(1, 2, 6, 3),
            Err(SamError::Load(_))
        ));
        assert!(matches!(
            ModelVariant::from_signature(1, 1, 6, 4),
            Err(SamError::Load(_))
        ));
        assert!(matches!(
            ModelVariant::from_signature(1, 2, 3, 2),
            Err(SamError::Load(_))
        ));
    }
}
