use crate::{Error, Result, Tensor};
use ndarray::Zip;

const LEAKY_RELU_SLOPE: f32 = 0.01;
const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;

/// Element-wise activation applied after a layer's linear/pooling stage.
///
/// The discriminant order is the wire code written by layer serialization,
/// so new variants go at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activation {
    Identity,
    Sigmoid,
    Tanh,
    ReLU,
    LeakyReLU,
    ELU,
    SELU,
    Softplus,
}

impl Activation {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "identity" | "linear" | "none" => Ok(Activation::Identity),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::ReLU),
            "leaky_relu" | "leakyrelu" => Ok(Activation::LeakyReLU),
            "elu" => Ok(Activation::ELU),
            "selu" => Ok(Activation::SELU),
            "softplus" => Ok(Activation::Softplus),
            _ => Err(Error::UnsupportedActivation(s.to_string())),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Activation::Identity => 0,
            Activation::Sigmoid => 1,
            Activation::Tanh => 2,
            Activation::ReLU => 3,
            Activation::LeakyReLU => 4,
            Activation::ELU => 5,
            Activation::SELU => 6,
            Activation::Softplus => 7,
        }
    }

    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(Activation::Identity),
            1 => Ok(Activation::Sigmoid),
            2 => Ok(Activation::Tanh),
            3 => Ok(Activation::ReLU),
            4 => Ok(Activation::LeakyReLU),
            5 => Ok(Activation::ELU),
            6 => Ok(Activation::SELU),
            7 => Ok(Activation::Softplus),
            _ => Err(Error::UnknownActivationCode(code)),
        }
    }

    #[inline]
    pub fn activate(self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::ReLU => x.max(0.0),
            Activation::LeakyReLU => {
                if x > 0.0 {
                    x
                } else {
                    LEAKY_RELU_SLOPE * x
                }
            }
            Activation::ELU => {
                if x > 0.0 {
                    x
                } else {
                    x.exp() - 1.0
                }
            }
            Activation::SELU => {
                if x > 0.0 {
                    SELU_SCALE * x
                } else {
                    SELU_SCALE * SELU_ALPHA * (x.exp() - 1.0)
                }
            }
            Activation::Softplus => x.exp().ln_1p(),
        }
    }

    /// Derivative with respect to the pre-activation value `x`.
    #[inline]
    pub fn derivative(self, x: f32) -> f32 {
        match self {
            Activation::Identity => 1.0,
            Activation::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Activation::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Activation::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    LEAKY_RELU_SLOPE
                }
            }
            Activation::ELU => {
                if x > 0.0 {
                    1.0
                } else {
                    x.exp()
                }
            }
            Activation::SELU => {
                if x > 0.0 {
                    SELU_SCALE
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp()
                }
            }
            Activation::Softplus => sigmoid(x),
        }
    }

    pub fn apply(self, tensor: &mut Tensor) {
        if self == Activation::Identity {
            return;
        }
        Zip::from(tensor.data_mut()).for_each(|x| {
            *x = self.activate(*x);
        });
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
