use crate::config::ModelConfig;
use image::imageops::FilterType;
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use thiserror::Error;

const TARGET_SIZE: u32 = 128;

// Training used Keras caffe-style preprocessing: channels reordered RGB -> BGR,
// then per-channel ImageNet mean subtraction, no scaling.
const BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Maps raw uploaded image bytes to the model's score vector.
pub trait Classifier: Send + Sync + 'static {
    fn scores(&self, image_data: &[u8]) -> Result<Vec<f32>, ClassifierError>;
}

fn preprocess(image_data: &[u8]) -> Result<Array<f32, Ix4>, ClassifierError> {
    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| ClassifierError::Decode(e.to_string()))?;

    let original_img = image_reader
        .decode()
        .map_err(|e| ClassifierError::Decode(e.to_string()))?;

    let img = original_img.resize_exact(TARGET_SIZE, TARGET_SIZE, FilterType::CatmullRom);

    let mut input = Array::zeros((1, TARGET_SIZE as usize, TARGET_SIZE as usize, 3));
    for (x, y, pixel) in img.to_rgb8().enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (x, y) = (x as usize, y as usize);
        input[[0, y, x, 0]] = b as f32 - BGR_MEAN[0];
        input[[0, y, x, 1]] = g as f32 - BGR_MEAN[1];
        input[[0, y, x, 2]] = r as f32 - BGR_MEAN[2];
    }

    Ok(input)
}

/// Runs the ONNX classification model through a pool of sessions picked
/// round-robin, so concurrent requests do not serialize on a single session
/// mutex.
pub struct OrtClassifier {
    sessions: Vec<Arc<Mutex<Session>>>,
    counter: AtomicUsize,
}

impl OrtClassifier {
    pub fn new(model_config: &ModelConfig) -> anyhow::Result<Self> {
        ort::init().commit()?;

        let num_instances = model_config.num_instances;
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_model_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!("Created {} ONNX sessions", num_instances);

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ClassifierError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| ClassifierError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("failed to extract tensor: {}", e)))?;

        Ok(data.to_vec())
    }
}

impl Classifier for OrtClassifier {
    fn scores(&self, image_data: &[u8]) -> Result<Vec<f32>, ClassifierError> {
        let input = preprocess(image_data)?;
        self.run_inference(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, color: Rgb<u8>) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, color);
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();
        image_data
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let image_data = png_bytes(100, 100, Rgb([255, 0, 0]));

        let input = preprocess(&image_data).unwrap();

        assert_eq!(input.shape(), &[1, 128, 128, 3]);
        // A solid red image stays solid red through the resize, so every
        // position holds (B, G, R) = (0, 0, 255) minus the channel means.
        assert!((input[[0, 64, 64, 0]] - (0.0 - BGR_MEAN[0])).abs() < 1e-4);
        assert!((input[[0, 64, 64, 1]] - (0.0 - BGR_MEAN[1])).abs() < 1e-4);
        assert!((input[[0, 64, 64, 2]] - (255.0 - BGR_MEAN[2])).abs() < 1e-4);
    }

    #[test]
    fn test_preprocess_resizes_any_input_dimensions() {
        let image_data = png_bytes(37, 211, Rgb([0, 128, 0]));

        let input = preprocess(&image_data).unwrap();

        assert_eq!(input.shape(), &[1, 128, 128, 3]);
    }

    #[test]
    fn test_preprocess_rejects_non_image_bytes() {
        let err = preprocess(b"definitely not an image").unwrap_err();

        assert!(matches!(err, ClassifierError::Decode(_)));
    }
}
