use crate::{Error, Result, TensorInfo};
use ndarray::{Array, Array2, ArrayD, ArrayView2, IxDyn};

#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    pub fn from_vec(vec: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != vec.len() {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![vec.len()],
            });
        }
        let data = Array::from_shape_vec(IxDyn(shape), vec)
            .map_err(|e| Error::Layout(format!("Failed to build tensor: {}", e)))?;
        Ok(Self { data })
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn into_data(self) -> ArrayD<f32> {
        self.data
    }

    pub fn zeros(shape: &[usize]) -> Self {
        let data = ArrayD::zeros(IxDyn(shape));
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn reshape(&self, new_shape: &[usize]) -> Result<Self> {
        let total_elements: usize = new_shape.iter().product();
        if total_elements != self.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![total_elements],
                actual: vec![self.len()],
            });
        }

        let reshaped = self
            .data
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(new_shape))
            .map_err(|e| Error::Layout(format!("Reshape failed: {}", e)))?;
        Ok(Self { data: reshaped })
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Views the tensor as a rectangular host buffer, one sample per row.
    ///
    /// `[c, h, w]` becomes a single row, `[n, c, h, w]` becomes `n` rows and a
    /// 2D tensor is returned as is. Fails for tensors that are not in standard
    /// row-major layout.
    pub fn as_rows(&self) -> Result<ArrayView2<'_, f32>> {
        let shape = self.shape();
        let (rows, cols) = match shape.len() {
            0 | 1 => (1, self.len()),
            2 => (shape[0], shape[1]),
            3 => (1, self.len()),
            _ => (shape[0], shape[1..].iter().product()),
        };

        self.data
            .view()
            .into_shape_with_order((rows, cols))
            .map_err(|e| Error::Layout(format!("Tensor is not row-major contiguous: {}", e)))
    }

    /// Rebuilds a batched `[n, c, h, w]` tensor from rows produced by [`Tensor::as_rows`].
    pub fn from_rows(rows: Array2<f32>, info: TensorInfo) -> Result<Self> {
        let (n, cols) = rows.dim();
        if cols != info.size() {
            return Err(Error::ShapeMismatch {
                expected: vec![n, info.size()],
                actual: vec![n, cols],
            });
        }

        let mut shape = vec![n];
        shape.extend_from_slice(&info.shape());
        let data = rows
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(&shape))
            .map_err(|e| Error::Layout(format!("Reshape failed: {}", e)))?;
        Ok(Self { data })
    }
}

impl From<ArrayD<f32>> for Tensor {
    fn from(data: ArrayD<f32>) -> Self {
        Self::new(data)
    }
}

impl AsRef<ArrayD<f32>> for Tensor {
    fn as_ref(&self) -> &ArrayD<f32> {
        &self.data
    }
}
