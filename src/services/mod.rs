//! Services separating I/O concerns from the processing pipeline

pub mod io;

pub use io::{encode_png, ImageLoader, ImageSource};
