use std::io::{Read, Write};
use std::ops::Range;

use crate::{activations::Activation, stream, Error, Result, Tensor, TensorInfo};
use ndarray::{Array4, ArrayView2, ArrayView4, Axis, Ix3, Ix4};

use super::{ForwardOutput, Layer, LayerHeader, LayerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PoolingMode {
    #[default]
    Max,
    Average,
}

impl PoolingMode {
    pub fn code(self) -> u32 {
        match self {
            PoolingMode::Max => 0,
            PoolingMode::Average => 1,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(PoolingMode::Max),
            1 => Some(PoolingMode::Average),
            _ => None,
        }
    }
}

/// Window and stride of a pooling operation.
///
/// `PoolingInfo::default()` is the all-zero value. It never describes a real
/// operation and is what a zero-filled stream decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PoolingInfo {
    mode: PoolingMode,
    window_height: usize,
    window_width: usize,
    vertical_stride: usize,
    horizontal_stride: usize,
}

impl PoolingInfo {
    pub fn new(
        mode: PoolingMode,
        window_height: usize,
        window_width: usize,
        vertical_stride: usize,
        horizontal_stride: usize,
    ) -> Result<Self> {
        let info = Self {
            mode,
            window_height,
            window_width,
            vertical_stride,
            horizontal_stride,
        };
        if !info.is_valid() {
            return Err(Error::InvalidPoolingInfo(format!(
                "window {}x{} and stride {}x{} must be non-zero",
                window_height, window_width, vertical_stride, horizontal_stride
            )));
        }
        Ok(info)
    }

    /// 2x2 max pooling with a stride of 2.
    pub const fn max_2x2() -> Self {
        Self {
            mode: PoolingMode::Max,
            window_height: 2,
            window_width: 2,
            vertical_stride: 2,
            horizontal_stride: 2,
        }
    }

    pub fn mode(&self) -> PoolingMode {
        self.mode
    }

    pub fn window(&self) -> (usize, usize) {
        (self.window_height, self.window_width)
    }

    pub fn strides(&self) -> (usize, usize) {
        (self.vertical_stride, self.horizontal_stride)
    }

    pub fn is_valid(&self) -> bool {
        self.window_height > 0
            && self.window_width > 0
            && self.vertical_stride > 0
            && self.horizontal_stride > 0
    }

    /// Output shape for `input`. Partial windows at the bottom and right edges
    /// are kept and clipped, so 2x2/2 pooling yields `ceil(h / 2) x ceil(w / 2)`.
    /// A window that would start past the edge is dropped.
    pub fn output_info(&self, input: &TensorInfo) -> Result<TensorInfo> {
        if !self.is_valid() {
            return Err(Error::InvalidPoolingInfo(format!("{:?}", self)));
        }
        TensorInfo::new(
            pooled_len(input.height(), self.window_height, self.vertical_stride),
            pooled_len(input.width(), self.window_width, self.horizontal_stride),
            input.channels(),
        )
    }

    fn rows(&self, i: usize, height: usize) -> Range<usize> {
        let start = i * self.vertical_stride;
        start..(start + self.window_height).min(height)
    }

    fn cols(&self, j: usize, width: usize) -> Range<usize> {
        let start = j * self.horizontal_stride;
        start..(start + self.window_width).min(width)
    }

    fn write_to(&self, sink: &mut dyn Write) -> Result<()> {
        stream::write_u32(sink, self.mode.code())?;
        for value in [
            self.window_height,
            self.window_width,
            self.vertical_stride,
            self.horizontal_stride,
        ] {
            let value = u32::try_from(value).map_err(|_| {
                Error::InvalidPoolingInfo(format!("{} does not fit the wire format", value))
            })?;
            stream::write_u32(sink, value)?;
        }
        Ok(())
    }

    /// Decodes the raw record without validating it.
    fn try_read_from(source: &mut dyn Read) -> Option<Self> {
        let mode = PoolingMode::from_code(stream::try_read_u32(source)?)?;
        Some(Self {
            mode,
            window_height: stream::try_read_u32(source)? as usize,
            window_width: stream::try_read_u32(source)? as usize,
            vertical_stride: stream::try_read_u32(source)? as usize,
            horizontal_stride: stream::try_read_u32(source)? as usize,
        })
    }
}

/// Number of windows along one axis. Every window starts inside the input,
/// which matters when the stride is wider than the window.
fn pooled_len(len: usize, window: usize, stride: usize) -> usize {
    if len <= window {
        1
    } else {
        ((len - window).div_ceil(stride) + 1).min((len - 1) / stride + 1)
    }
}

/// Row-major position of the first maximum in a window.
fn argmax(plane: &ArrayView2<f32>, rows: Range<usize>, cols: Range<usize>) -> (usize, usize) {
    let mut best = (rows.start, cols.start);
    let mut best_value = plane[best];
    for r in rows {
        for c in cols.clone() {
            let value = plane[[r, c]];
            if value > best_value {
                best = (r, c);
                best_value = value;
            }
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolingLayer {
    input: TensorInfo,
    output: TensorInfo,
    operation: PoolingInfo,
    activation: Activation,
}

impl PoolingLayer {
    pub fn new(input: TensorInfo, operation: PoolingInfo, activation: Activation) -> Result<Self> {
        let output = operation.output_info(&input)?;
        Ok(Self {
            input,
            output,
            operation,
            activation,
        })
    }

    pub fn operation_info(&self) -> &PoolingInfo {
        &self.operation
    }

    /// Reads a layer written by [`Layer::serialize`].
    ///
    /// Returns `None` when the stream is truncated, when any record fails to
    /// decode, when the pooling record is the all-zero default, or when the
    /// stored output info disagrees with the one derived from the input and
    /// the operation. Callers can then try another layer decoder.
    pub fn deserialize(source: &mut dyn Read) -> Option<Self> {
        let Some(header) = LayerHeader::try_read_from(source) else {
            tracing::debug!("pooling layer header is truncated or invalid");
            return None;
        };
        let Some(operation) = PoolingInfo::try_read_from(source) else {
            tracing::debug!("pooling info record is truncated or invalid");
            return None;
        };
        if operation == PoolingInfo::default() {
            tracing::debug!("pooling info record holds the default value");
            return None;
        }

        let layer = match Self::new(header.input, operation, header.activation) {
            Ok(layer) => layer,
            Err(e) => {
                tracing::debug!(error = %e, "rejecting pooling layer");
                return None;
            }
        };
        if layer.output != header.output {
            tracing::debug!(
                stored = %header.output,
                derived = %layer.output,
                "stored output info does not match the pooling operation"
            );
            return None;
        }
        Some(layer)
    }

    fn batched<'a>(&self, tensor: &'a Tensor) -> Result<ArrayView4<'a, f32>> {
        let view = tensor.data().view();
        let batched = if view.ndim() == 3 {
            view.into_dimensionality::<Ix3>()
                .map(|v| v.insert_axis(Axis(0)))
        } else {
            view.into_dimensionality::<Ix4>()
        };
        batched.map_err(|e| Error::Layout(format!("Pooling input has wrong rank: {}", e)))
    }

    fn unbatch(values: Array4<f32>, rank: usize) -> Tensor {
        if rank == 3 {
            Tensor::new(values.index_axis_move(Axis(0), 0).into_dyn())
        } else {
            Tensor::new(values.into_dyn())
        }
    }
}

impl Layer for PoolingLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Pooling
    }

    fn input_info(&self) -> TensorInfo {
        self.input
    }

    fn output_info(&self) -> TensorInfo {
        self.output
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    fn forward(&self, input: &Tensor) -> Result<ForwardOutput> {
        let batch = self.input.batch_of(input.shape())?;
        let x = self.batched(input)?;
        let (height, width) = (self.input.height(), self.input.width());
        let (out_height, out_width) = (self.output.height(), self.output.width());

        let mut z = Array4::zeros((batch, self.input.channels(), out_height, out_width));
        for (n, sample) in x.outer_iter().enumerate() {
            for (c, plane) in sample.outer_iter().enumerate() {
                for i in 0..out_height {
                    for j in 0..out_width {
                        let rows = self.operation.rows(i, height);
                        let cols = self.operation.cols(j, width);
                        z[[n, c, i, j]] = match self.operation.mode {
                            PoolingMode::Max => plane[argmax(&plane, rows, cols)],
                            PoolingMode::Average => {
                                let count = (rows.len() * cols.len()) as f32;
                                plane.slice(ndarray::s![rows, cols]).sum() / count
                            }
                        };
                    }
                }
            }
        }

        let z = Self::unbatch(z, input.shape().len());
        let mut a = z.clone();
        self.activation.apply(&mut a);
        Ok(ForwardOutput { z, a })
    }

    fn backward(
        &self,
        delta: &Tensor,
        x: &Tensor,
        activation_prime: &dyn Fn(f32) -> f32,
    ) -> Result<Tensor> {
        let batch = self.input.batch_of(x.shape())?;
        let delta_batch = self.output.batch_of(delta.shape())?;
        if delta_batch != batch || delta.shape().len() != x.shape().len() {
            let mut expected = self.output.shape().to_vec();
            if x.shape().len() == 4 {
                expected.insert(0, batch);
            }
            return Err(Error::ShapeMismatch {
                expected,
                actual: delta.shape().to_vec(),
            });
        }

        let xs = self.batched(x)?;
        let deltas = self.batched(delta)?;
        let (height, width) = (self.input.height(), self.input.width());
        let (out_height, out_width) = (self.output.height(), self.output.width());

        let mut dx = Array4::zeros((batch, self.input.channels(), height, width));
        for (n, sample) in xs.outer_iter().enumerate() {
            for (c, plane) in sample.outer_iter().enumerate() {
                for i in 0..out_height {
                    for j in 0..out_width {
                        let g = deltas[[n, c, i, j]];
                        let rows = self.operation.rows(i, height);
                        let cols = self.operation.cols(j, width);
                        match self.operation.mode {
                            PoolingMode::Max => {
                                let (r, k) = argmax(&plane, rows, cols);
                                dx[[n, c, r, k]] += g * activation_prime(plane[[r, k]]);
                            }
                            PoolingMode::Average => {
                                let share = g / (rows.len() * cols.len()) as f32;
                                for r in rows {
                                    for k in cols.clone() {
                                        dx[[n, c, r, k]] += share * activation_prime(plane[[r, k]]);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(Self::unbatch(dx, x.shape().len()))
    }

    fn clone_layer(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }

    fn serialize(&self, sink: &mut dyn Write) -> Result<()> {
        LayerHeader {
            input: self.input,
            output: self.output,
            activation: self.activation,
        }
        .write_to(sink)?;
        self.operation.write_to(sink)
    }
}
