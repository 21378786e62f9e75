use thiserror::Error;

use crate::device::{DeviceId, Status};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid tensor info: height {height}, width {width}, channels {channels}")]
    InvalidTensorInfo {
        height: usize,
        width: usize,
        channels: usize,
    },

    #[error("Invalid pooling info: {0}")]
    InvalidPoolingInfo(String),

    #[error("Layout error: {0}")]
    Layout(String),

    #[error("Transfer error in {operation}: expected {}, got {status}", Status::Success)]
    Transfer {
        operation: &'static str,
        status: Status,
    },

    #[error("Failed to select device {device}: expected {}, got {status}", Status::Success)]
    DeviceContext { device: DeviceId, status: Status },

    #[error("Unsupported activation: {0}")]
    UnsupportedActivation(String),

    #[error("Unknown activation code: {0}")]
    UnknownActivationCode(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
