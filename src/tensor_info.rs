use std::fmt;
use std::io::{Read, Write};

use crate::stream;
use crate::{Error, Result};

/// Shape of a single sample: `channels` planes of `height` x `width` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorInfo {
    height: usize,
    width: usize,
    channels: usize,
}

impl TensorInfo {
    pub fn new(height: usize, width: usize, channels: usize) -> Result<Self> {
        if height == 0 || width == 0 || channels == 0 {
            return Err(Error::InvalidTensorInfo {
                height,
                width,
                channels,
            });
        }
        Ok(Self {
            height,
            width,
            channels,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Elements in one channel plane.
    pub fn slice_size(&self) -> usize {
        self.height * self.width
    }

    /// Elements in one sample.
    pub fn size(&self) -> usize {
        self.slice_size() * self.channels
    }

    /// Channel-planar shape `[channels, height, width]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    /// Validates a `[c, h, w]` or `[n, c, h, w]` shape and returns the batch size.
    pub fn batch_of(&self, shape: &[usize]) -> Result<usize> {
        let (batch, sample) = match shape.len() {
            3 => (1, shape),
            4 => (shape[0], &shape[1..]),
            _ => {
                return Err(Error::ShapeMismatch {
                    expected: self.shape().to_vec(),
                    actual: shape.to_vec(),
                })
            }
        };
        if sample != &self.shape()[..] {
            return Err(Error::ShapeMismatch {
                expected: self.shape().to_vec(),
                actual: shape.to_vec(),
            });
        }
        Ok(batch)
    }

    pub(crate) fn write_to(&self, sink: &mut dyn Write) -> Result<()> {
        stream::write_u32(sink, to_u32(self.height)?)?;
        stream::write_u32(sink, to_u32(self.width)?)?;
        stream::write_u32(sink, to_u32(self.channels)?)?;
        Ok(())
    }

    /// Reads a record written by `write_to`. `None` on a short read or a zero field.
    pub(crate) fn try_read_from(source: &mut dyn Read) -> Option<Self> {
        let height = stream::try_read_u32(source)? as usize;
        let width = stream::try_read_u32(source)? as usize;
        let channels = stream::try_read_u32(source)? as usize;
        Self::new(height, width, channels).ok()
    }
}

impl fmt::Display for TensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Layout(format!("Dimension {} does not fit the wire format", value)))
}
