pub mod pooling;

use std::io::{Read, Write};

use crate::{activations::Activation, stream, Result, Tensor, TensorInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Pooling,
}

/// Result of a forward pass: the pre-activation `z` and the activated `a`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardOutput {
    pub z: Tensor,
    pub a: Tensor,
}

pub trait Layer: std::fmt::Debug + Send + Sync {
    fn kind(&self) -> LayerKind;

    fn input_info(&self) -> TensorInfo;

    fn output_info(&self) -> TensorInfo;

    fn activation(&self) -> Activation;

    fn forward(&self, input: &Tensor) -> Result<ForwardOutput>;

    /// Propagates `delta` (shaped like this layer's output) back to the layer
    /// input. `x` is the tensor the matching forward call received, which in a
    /// network is the preceding layer's pre-activation output, and
    /// `activation_prime` is that layer's activation derivative.
    fn backward(
        &self,
        delta: &Tensor,
        x: &Tensor,
        activation_prime: &dyn Fn(f32) -> f32,
    ) -> Result<Tensor>;

    fn clone_layer(&self) -> Box<dyn Layer>;

    fn serialize(&self, sink: &mut dyn Write) -> Result<()>;
}

/// Records every layer kind writes first: input info, output info, activation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerHeader {
    pub input: TensorInfo,
    pub output: TensorInfo,
    pub activation: Activation,
}

impl LayerHeader {
    pub fn write_to(&self, sink: &mut dyn Write) -> Result<()> {
        self.input.write_to(sink)?;
        self.output.write_to(sink)?;
        stream::write_u32(sink, self.activation.code())?;
        Ok(())
    }

    pub fn try_read_from(source: &mut dyn Read) -> Option<Self> {
        let input = TensorInfo::try_read_from(source)?;
        let output = TensorInfo::try_read_from(source)?;
        let code = stream::try_read_u32(source)?;
        let activation = match Activation::from_code(code) {
            Ok(activation) => activation,
            Err(e) => {
                tracing::debug!(error = %e, "rejecting layer header");
                return None;
            }
        };
        Some(Self {
            input,
            output,
            activation,
        })
    }
}

pub use pooling::{PoolingInfo, PoolingLayer, PoolingMode};
