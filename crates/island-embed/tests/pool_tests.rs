use candle_core::{DType, Device, Tensor};
use island_embed::masked_mean_l2;

fn unit(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / norm).collect()
}

#[test]
fn pooling_averages_only_attended_tokens() {
    let dev = Device::Cpu;
    // batch of two sequences, three tokens each, hidden dim 2
    let hidden = Tensor::from_slice(
        &[3.0f32, 0.0, 1.0, 2.0, 9.0, 9.0, 0.0, 4.0, 8.0, 8.0, 8.0, 8.0],
        (2, 3, 2),
        &dev,
    )
    .unwrap();
    let mask = Tensor::from_slice(&[1u32, 1, 0, 1, 0, 0], (2, 3), &dev).unwrap();

    let rows: Vec<Vec<f32>> = masked_mean_l2(&hidden, &mask).unwrap().to_vec2().unwrap();
    // row 0: mean of (3,0) and (1,2); row 1: only (0,4)
    for (got, want) in rows.iter().zip([unit(&[2.0, 1.0]), unit(&[0.0, 4.0])]) {
        for (a, b) in got.iter().zip(&want) {
            assert!((a - b).abs() < 1e-5, "got {got:?}, want {want:?}");
        }
    }
}

#[test]
fn masked_mean_l2_fully_masked_row_stays_finite() {
    let dev = Device::Cpu;
    let h = Tensor::ones((2, 3, 2), DType::F32, &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 1, 0, 0, 0, 0], (2, 3), &dev).unwrap();
    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    assert_eq!(out.len(), 2);
    assert!(out[1].iter().all(|x| x.is_finite()));
}
