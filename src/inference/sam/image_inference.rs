use crate::error::{SamError, SamResult};
use crate::inference::sam::variant::ModelVariant;
use crate::inference::sam::{Sam, SamState};
use crate::utils::tensor::{interleaved_to_planar, interleaved_to_planar_normalized};
use image::RgbImage;
use log::error;
use ndarray::prelude::*;
use ort::session::SessionInputValue;
use ort::value::{DynValue, Tensor};
use std::collections::HashMap;

impl Sam {
    /// Runs the encoder on `image` and replaces the cached embedding.
    ///
    /// The image must match the encoder's input size exactly; no resizing
    /// happens here. Blocks until the encoder finishes and holds the state
    /// lock throughout, so concurrent mask queries never observe a
    /// half-written embedding.
    pub fn load_image(&self, image: &RgbImage) -> SamResult<()> {
        if image.dimensions() != (self.input_width, self.input_height) {
            return Err(SamError::InvalidInput(format!(
                "image size {}x{} does not match model input {}x{}",
                image.width(),
                image.height(),
                self.input_width,
                self.input_height
            )));
        }

        let (width, height) = (self.input_width as usize, self.input_height as usize);
        let pixels = width * height;

        let mut state = self.state.lock();
        let SamState {
            encoder,
            embedding,
            interm_embedding,
            ..
        } = &mut *state;

        let input_name = self.variant.encoder_input_name();
        let outputs = if self.variant.normalizes_pixels() {
            let planar = interleaved_to_planar_normalized(image.as_raw(), pixels);
            let tensor = Array4::from_shape_vec((1, 3, height, width), planar)
                .map_err(|e| SamError::Inference(e.to_string()))?;
            encoder.run(vec![(
                input_name,
                SessionInputValue::from(Tensor::from_array(tensor)?),
            )])
        } else {
            let planar = interleaved_to_planar(image.as_raw(), pixels);
            let tensor = Array4::from_shape_vec((1, 3, height, width), planar)
                .map_err(|e| SamError::Inference(e.to_string()))?;
            encoder.run(vec![(
                input_name,
                SessionInputValue::from(Tensor::from_array(tensor)?),
            )])
        }
        .map_err(|e| {
            error!("encoder run failed: {e}");
            SamError::Runtime(e)
        })?;

        let outputs = outputs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<HashMap<String, DynValue>>();

        let output_names = self.variant.encoder_output_names();
        store_embedding(embedding, &outputs, output_names[0])?;
        if self.variant == ModelVariant::HighQuality {
            store_embedding(interm_embedding, &outputs, output_names[1])?;
        } else {
            *interm_embedding = None;
        }

        Ok(())
    }
}

fn store_embedding(
    slot: &mut Option<ArrayD<f32>>,
    outputs: &HashMap<String, DynValue>,
    name: &str,
) -> SamResult<()> {
    let value = outputs
        .get(name)
        .ok_or_else(|| SamError::Inference(format!("encoder output {name} missing")))?
        .try_extract_array::<f32>()
        .map_err(|_| SamError::Inference(format!("encoder output {name} is not a float tensor")))?;

    match slot {
        Some(buffer) if buffer.shape() == value.shape() => buffer.assign(&value),
        _ => *slot = Some(value.to_owned()),
    }
    Ok(())
}
