//! # Pocket NN
//!
//! The numeric core of a small feed-forward network library: a pooling layer
//! with forward and backward passes and a fixed binary layout, plus pitched
//! host/device transfer primitives for accelerated layers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pocket_nn::{Activation, Layer, PoolingInfo, PoolingLayer, TensorInfo};
//!
//! let layer = PoolingLayer::new(TensorInfo::new(28, 28, 8)?, PoolingInfo::max_2x2(), Activation::ReLU)?;
//! let out = layer.forward(&input)?;
//! let dx = layer.backward(&delta, &input, &|x| Activation::ReLU.derivative(x))?;
//! ```

pub mod activations;
pub mod device;
pub mod error;
pub mod layers;
pub mod stream;
pub mod tensor;
pub mod tensor_info;

pub use activations::Activation;
pub use device::{DeviceId, DeviceMemory2D, EmulatedRuntime, Gpu};
pub use error::{Error, Result};
pub use layers::{ForwardOutput, Layer, LayerKind, PoolingInfo, PoolingLayer, PoolingMode};
pub use tensor::Tensor;
pub use tensor_info::TensorInfo;
