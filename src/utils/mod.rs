//! Tensor conversion helpers shared by the segmentation backends

pub mod postprocessing;
pub mod preprocessing;

pub use postprocessing::tensor_to_mask;
pub use preprocessing::ImagePreprocessor;
