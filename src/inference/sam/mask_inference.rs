use crate::error::{SamError, SamResult};
use crate::inference::sam::variant::ModelVariant;
use crate::inference::sam::{MaskResult, Sam, SamState};
use crate::utils::graph::{Box, Point};
use crate::utils::tensor::linear_interpolate;
use image::GrayImage;
use log::{error, warn};
use ndarray::prelude::*;
use ort::session::SessionInputValue;
use ort::value::{DynValue, Tensor, TensorRef};
use std::collections::HashMap;

/// Decoder-ready point/label tensors: coordinates as (1, N, 2), labels as
/// (1, N). Labels follow the decoder's training convention: 1 positive,
/// 0 negative, 2/3 box corners.
pub(crate) struct PromptTensors {
    pub coords: Array3<f32>,
    pub labels: Array2<f32>,
}

/// Validates a prompt against the image bounds and flattens it into the
/// decoder's tensor layout. Points must lie strictly inside
/// (0, width) x (0, height); a box must have positive extent with both
/// corners strictly inside. Any violation aborts the whole query.
pub(crate) fn encode_prompt(
    positive: &[Point<f32>],
    negative: &[Point<f32>],
    bbox: Option<Box<f32>>,
    width: u32,
    height: u32,
) -> SamResult<PromptTensors> {
    let (image_width, image_height) = (width as f32, height as f32);
    let inside =
        |p: &Point<f32>| p.x > 0. && p.x < image_width && p.y > 0. && p.y < image_height;

    for point in positive.iter().chain(negative.iter()) {
        if !inside(point) {
            return Err(SamError::InvalidInput(format!(
                "point ({}, {}) is outside the open image bounds (0, {image_width}) x (0, {image_height})",
                point.x, point.y
            )));
        }
    }
    if let Some(b) = &bbox {
        let top_left = Point::new(b.x, b.y);
        let bottom_right = Point::new(b.x + b.width, b.y + b.height);
        if b.width <= 0. || b.height <= 0. || !inside(&top_left) || !inside(&bottom_right) {
            return Err(SamError::InvalidInput(format!(
                "degenerate or out-of-bounds box ({}, {}, {}, {})",
                b.x, b.y, b.width, b.height
            )));
        }
    }

    let mut coords = Vec::with_capacity((positive.len() + negative.len() + 2) * 2);
    let mut labels = Vec::with_capacity(positive.len() + negative.len() + 2);
    for point in positive {
        coords.extend([point.x, point.y]);
        labels.push(1.);
    }
    for point in negative {
        coords.extend([point.x, point.y]);
        labels.push(0.);
    }
    if let Some(b) = bbox {
        coords.extend([b.x, b.y]);
        labels.push(2.);
        coords.extend([b.x + b.width, b.y + b.height]);
        labels.push(3.);
    }

    let count = labels.len();
    Ok(PromptTensors {
        coords: Array3::from_shape_vec((1, count, 2), coords)
            .map_err(|e| SamError::Inference(e.to_string()))?,
        labels: Array2::from_shape_vec((1, count), labels)
            .map_err(|e| SamError::Inference(e.to_string()))?,
    })
}

impl Sam {
    /// Produces a binary mask for the given prompt on the currently loaded
    /// image. Serialized against all other mask queries and image loads.
    ///
    /// Calling this twice with identical prompts on the same image returns
    /// bit-identical masks and scores.
    pub fn get_mask(
        &self,
        positive: &[Point<f32>],
        negative: &[Point<f32>],
        bbox: Option<Box<f32>>,
    ) -> SamResult<MaskResult> {
        let prompt = encode_prompt(positive, negative, bbox, self.input_width, self.input_height)?;
        let mut state = self.state.lock();
        decode_mask(
            &mut state,
            self.variant,
            prompt,
            self.input_width,
            self.input_height,
        )
    }
}

/// Runs the decoder with the variant's input name table and extracts the
/// mask and score through the variant's output indices.
pub(crate) fn decode_mask(
    state: &mut SamState,
    variant: ModelVariant,
    prompt: PromptTensors,
    width: u32,
    height: u32,
) -> SamResult<MaskResult> {
    let SamState {
        decoder,
        embedding,
        interm_embedding,
        ..
    } = state;

    let embedding = embedding.as_ref().ok_or_else(|| {
        SamError::InvalidInput("no image loaded; call load_image first".into())
    })?;

    let names = variant.decoder_input_names();
    let mut inputs: Vec<(&str, SessionInputValue)> = Vec::with_capacity(names.len());
    inputs.push((
        names[0],
        SessionInputValue::from(TensorRef::from_array_view(embedding.view())?),
    ));

    let mut next = 1;
    if variant == ModelVariant::HighQuality {
        let interm = interm_embedding.as_ref().ok_or_else(|| {
            SamError::Inference("intermediate embeddings missing for high-quality model".into())
        })?;
        inputs.push((
            names[next],
            SessionInputValue::from(TensorRef::from_array_view(interm.view())?),
        ));
        next += 1;
    }

    inputs.push((
        names[next],
        SessionInputValue::from(Tensor::from_array(prompt.coords)?),
    ));
    inputs.push((
        names[next + 1],
        SessionInputValue::from(Tensor::from_array(prompt.labels)?),
    ));

    if variant.uses_mask_hint() {
        // Zero-filled hint: "no prior mask".
        let mask_hint = Array4::<f32>::zeros((1, 1, 256, 256));
        inputs.push((
            names[next + 2],
            SessionInputValue::from(Tensor::from_array(mask_hint)?),
        ));
        inputs.push((
            names[next + 3],
            SessionInputValue::from(Tensor::from_array(array![0f32])?),
        ));
        inputs.push((
            names[next + 4],
            SessionInputValue::from(Tensor::from_array(array![height as f32, width as f32])?),
        ));
    }

    let outputs = decoder.run(inputs).map_err(|e| {
        error!("decoder run failed: {e}");
        SamError::Runtime(e)
    })?;
    let outputs = outputs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect::<HashMap<String, DynValue>>();

    if outputs.len() < 2 {
        return Err(SamError::Inference(format!(
            "decoder returned {} outputs, expected at least 2",
            outputs.len()
        )));
    }

    let output_names = variant.decoder_output_names();
    let mask_name = output_names[variant.mask_output_index()];
    let logits = outputs
        .get(mask_name)
        .ok_or_else(|| SamError::Inference(format!("decoder output {mask_name} missing")))?
        .try_extract_array::<f32>()
        .map_err(|_| SamError::Inference(format!("decoder output {mask_name} is not a float tensor")))?;

    let shape = logits.shape();
    if shape.len() < 2 {
        return Err(SamError::Inference(format!(
            "mask output has rank {}, expected at least 2",
            shape.len()
        )));
    }
    let (mask_height, mask_width) = (shape[shape.len() - 2], shape[shape.len() - 1]);
    let flat = logits
        .to_shape(logits.len())
        .map_err(|e| SamError::Inference(e.to_string()))?;
    let flat = flat
        .as_slice()
        .ok_or_else(|| SamError::Inference("mask output is not contiguous".into()))?;
    if flat.len() < mask_height * mask_width {
        return Err(SamError::Inference("mask output smaller than its shape".into()));
    }
    let logits = ArrayView2::from_shape((mask_height, mask_width), &flat[..mask_height * mask_width])
        .map_err(|e| SamError::Inference(e.to_string()))?;

    // Binarize the logits at zero, resampling first when the decoder's
    // native mask resolution differs from the input resolution.
    let (out_width, out_height) = (width as usize, height as usize);
    let mask = if (mask_height, mask_width) != (out_height, out_width) {
        binarize(linear_interpolate(logits, (out_height, out_width)).view(), width, height)
    } else {
        binarize(logits, width, height)
    };

    let score_name = output_names[variant.score_output_index()];
    let score = match outputs.get(score_name) {
        Some(value) => match value.try_extract_array::<f32>() {
            Ok(scores) if !scores.is_empty() => scores.iter().next().copied().unwrap_or(0.0),
            _ => {
                warn!("score tensor {score_name} missing or empty, defaulting to 0.0");
                0.0
            }
        },
        None => {
            warn!("score tensor {score_name} missing, defaulting to 0.0");
            0.0
        }
    };

    Ok(MaskResult { mask, score })
}

fn binarize(logits: ArrayView2<f32>, width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for (pixel, &logit) in mask.pixels_mut().zip(logits.iter()) {
        pixel.0[0] = if logit > 0. { 255 } else { 0 };
    }
    mask
}
