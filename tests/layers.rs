use approx::assert_abs_diff_eq;
use pocket_nn::layers::{pooling::PoolingMode, Layer, LayerKind};
use pocket_nn::{Activation, Error, PoolingInfo, PoolingLayer, Tensor, TensorInfo};

fn max_pool(height: usize, width: usize, channels: usize, activation: Activation) -> PoolingLayer {
    PoolingLayer::new(
        TensorInfo::new(height, width, channels).unwrap(),
        PoolingInfo::max_2x2(),
        activation,
    )
    .unwrap()
}

fn scenario_input() -> Tensor {
    Tensor::from_vec(
        vec![
            1.0, 2.0, 5.0, 6.0, //
            3.0, 4.0, 7.0, 8.0, //
            9.0, 10.0, 13.0, 14.0, //
            11.0, 12.0, 15.0, 16.0,
        ],
        &[1, 4, 4],
    )
    .unwrap()
}

#[test]
fn test_maxpool_2x2_forward() {
    let layer = max_pool(4, 4, 1, Activation::Identity);

    let out = layer.forward(&scenario_input()).unwrap();

    assert_eq!(out.z.shape(), &[1, 2, 2]);
    assert_eq!(out.z.to_vec(), vec![4.0, 8.0, 12.0, 16.0]);
    assert_eq!(out.a, out.z);
}

#[test]
fn test_maxpool_2x2_backward_routes_to_argmax() {
    let layer = max_pool(4, 4, 1, Activation::Identity);
    let x = scenario_input();
    let delta = Tensor::from_vec(vec![1.0; 4], &[1, 2, 2]).unwrap();

    let dx = layer.backward(&delta, &x, &|_| 1.0).unwrap();

    assert_eq!(dx.shape(), &[1, 4, 4]);
    let expected = vec![
        0.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 1.0, //
        0.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 1.0,
    ];
    assert_eq!(dx.to_vec(), expected);
}

#[test]
fn test_backward_scales_by_activation_derivative() {
    let layer = max_pool(2, 2, 1, Activation::Identity);
    let x = Tensor::from_vec(vec![-1.0, 0.5, 0.25, -3.0], &[1, 2, 2]).unwrap();
    let delta = Tensor::from_vec(vec![2.0], &[1, 1, 1]).unwrap();

    let prime = |v: f32| Activation::Sigmoid.derivative(v);
    let dx = layer.backward(&delta, &x, &prime).unwrap().to_vec();

    assert_abs_diff_eq!(dx[1], 2.0 * Activation::Sigmoid.derivative(0.5), epsilon = 1e-6);
    assert_eq!(dx[0], 0.0);
    assert_eq!(dx[2], 0.0);
    assert_eq!(dx[3], 0.0);
}

#[test]
fn test_forward_applies_activation() {
    let layer = max_pool(2, 4, 1, Activation::ReLU);
    let x = Tensor::from_vec(vec![-4.0, -2.0, 1.0, 0.0, -3.0, -1.0, 2.0, 3.0], &[1, 2, 4]).unwrap();

    let out = layer.forward(&x).unwrap();

    assert_eq!(out.z.to_vec(), vec![-1.0, 3.0]);
    assert_eq!(out.a.to_vec(), vec![0.0, 3.0]);
}

#[test]
fn test_maxpool_multiple_channels() {
    let layer = max_pool(4, 4, 2, Activation::Identity);
    let input = Tensor::from_vec((0..32).map(|i| i as f32).collect(), &[2, 4, 4]).unwrap();

    let out = layer.forward(&input).unwrap();

    assert_eq!(out.z.shape(), &[2, 2, 2]);
    assert_eq!(out.z.to_vec(), vec![5.0, 7.0, 13.0, 15.0, 21.0, 23.0, 29.0, 31.0]);
}

#[test]
fn test_maxpool_batch() {
    let layer = max_pool(4, 4, 1, Activation::Identity);
    let input = Tensor::from_vec((0..32).map(|i| i as f32).collect(), &[2, 1, 4, 4]).unwrap();

    let out = layer.forward(&input).unwrap();
    assert_eq!(out.z.shape(), &[2, 1, 2, 2]);

    let delta = Tensor::from_vec(vec![1.0; 8], &[2, 1, 2, 2]).unwrap();
    let dx = layer.backward(&delta, &input, &|_| 1.0).unwrap();
    assert_eq!(dx.shape(), &[2, 1, 4, 4]);
    assert_eq!(dx.to_vec().iter().sum::<f32>(), 8.0);
}

#[test]
fn test_forward_shape_mismatch() {
    let layer = max_pool(4, 4, 1, Activation::Identity);
    let input = Tensor::zeros(&[4, 4, 1]);

    assert!(matches!(
        layer.forward(&input),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_backward_delta_shape_mismatch() {
    let layer = max_pool(4, 4, 1, Activation::Identity);
    let delta = Tensor::zeros(&[1, 4, 4]);

    assert!(matches!(
        layer.backward(&delta, &scenario_input(), &|_| 1.0),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_clone_is_independent_and_equivalent() {
    let layer = max_pool(4, 4, 1, Activation::Tanh);
    let cloned = layer.clone_layer();

    assert_eq!(cloned.kind(), LayerKind::Pooling);
    assert_eq!(cloned.input_info(), layer.input_info());
    assert_eq!(cloned.output_info(), layer.output_info());
    assert_eq!(cloned.activation(), Activation::Tanh);

    let input = scenario_input();
    assert_eq!(cloned.forward(&input).unwrap(), layer.forward(&input).unwrap());
}

#[test]
fn test_serialize_layout() {
    let layer = max_pool(4, 6, 3, Activation::ReLU);
    let mut bytes = Vec::new();
    layer.serialize(&mut bytes).unwrap();

    // input (3 x u32), output (3 x u32), activation (u32), pooling info (5 x u32)
    assert_eq!(bytes.len(), 4 * (3 + 3 + 1 + 5));
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(&words[..7], &[4, 6, 3, 2, 3, 3, Activation::ReLU.code()]);
    assert_eq!(&words[7..], &[PoolingMode::Max.code(), 2, 2, 2, 2]);
}

#[test]
fn test_deserialize_round_trip() {
    let info = PoolingInfo::new(PoolingMode::Average, 3, 2, 3, 2).unwrap();
    let layer = PoolingLayer::new(TensorInfo::new(9, 8, 2).unwrap(), info, Activation::ELU).unwrap();
    let mut bytes = Vec::new();
    layer.serialize(&mut bytes).unwrap();

    let restored = PoolingLayer::deserialize(&mut bytes.as_slice()).unwrap();

    assert_eq!(restored, layer);
    assert_eq!(restored.operation_info(), &info);
}

#[test]
fn test_deserialize_truncated_stream() {
    let layer = max_pool(4, 4, 1, Activation::Identity);
    let mut bytes = Vec::new();
    layer.serialize(&mut bytes).unwrap();

    for len in [0, 3, 11, 12, 27, 28, bytes.len() - 1] {
        assert!(
            PoolingLayer::deserialize(&mut &bytes[..len]).is_none(),
            "accepted a stream cut at {} bytes",
            len
        );
    }
}

#[test]
fn test_deserialize_rejects_default_pooling_info() {
    let layer = max_pool(4, 4, 1, Activation::Identity);
    let mut bytes = Vec::new();
    layer.serialize(&mut bytes).unwrap();
    let header_len = bytes.len() - 20;
    bytes[header_len..].fill(0);

    assert!(PoolingLayer::deserialize(&mut bytes.as_slice()).is_none());
}

#[test]
fn test_deserialize_rejects_inconsistent_output_info() {
    let layer = max_pool(4, 4, 1, Activation::Identity);
    let mut bytes = Vec::new();
    layer.serialize(&mut bytes).unwrap();
    // stored output height
    bytes[12..16].copy_from_slice(&3u32.to_le_bytes());

    assert!(PoolingLayer::deserialize(&mut bytes.as_slice()).is_none());
}

#[test]
fn test_deserialize_rejects_unknown_activation() {
    let layer = max_pool(4, 4, 1, Activation::Identity);
    let mut bytes = Vec::new();
    layer.serialize(&mut bytes).unwrap();
    bytes[24..28].copy_from_slice(&99u32.to_le_bytes());

    assert!(PoolingLayer::deserialize(&mut bytes.as_slice()).is_none());
}

#[test]
fn test_deserialize_leaves_trailing_bytes() {
    let first = max_pool(4, 4, 1, Activation::Identity);
    let second = max_pool(8, 8, 2, Activation::ReLU);
    let mut bytes = Vec::new();
    first.serialize(&mut bytes).unwrap();
    second.serialize(&mut bytes).unwrap();

    let mut stream = bytes.as_slice();
    assert_eq!(PoolingLayer::deserialize(&mut stream).unwrap(), first);
    assert_eq!(PoolingLayer::deserialize(&mut stream).unwrap(), second);
    assert!(stream.is_empty());
}
