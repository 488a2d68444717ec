use candle_core::{DType, Device, Tensor};
use patentdb_embed::pool::{cls_l2, masked_mean_l2};

#[test]
fn cls_l2_takes_first_token_state() {
    let dev = Device::Cpu;
    // Two tokens with hidden dim 4; CLS is token 0.
    let h = Tensor::from_slice(
        &[3.0f32, 0.0, 4.0, 0.0, 9.0, 9.0, 9.0, 9.0],
        (1, 2, 4),
        &dev,
    )
    .unwrap();
    let out = cls_l2(&h).unwrap();
    let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
    let v = &v[0];
    // [3,0,4,0] normalized by 5
    let expected = [0.6, 0.0, 0.8, 0.0];
    for (a, b) in v.iter().cloned().zip(expected) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
}

#[test]
fn masked_mean_l2_ignores_masked_tokens() {
    let dev = Device::Cpu;
    // Two tokens with hidden dim 4; second token is masked out.
    let h = Tensor::from_slice(
        &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        (1, 2, 4),
        &dev,
    )
    .unwrap();
    let mask = Tensor::from_slice(&[1i64, 0i64], (1, 2), &dev)
        .unwrap()
        .to_dtype(DType::F32)
        .unwrap();
    let out = masked_mean_l2(&h, &mask).unwrap();
    let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
    let v = &v[0];
    // Mean over unmasked tokens = first token [1,2,3,4], then L2 normalize
    let norm: f32 = (1.0f32 + 4.0 + 9.0 + 16.0).sqrt();
    let expected = [1.0 / norm, 2.0 / norm, 3.0 / norm, 4.0 / norm];
    for (a, b) in v.iter().cloned().zip(expected) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
}
