//! 训练用的损失度量.

use ndarray::{ArrayViewD, Axis, Zip};

/// 掩膜内的均方误差: `sum(((pred - target) * mask)^2) / sum(mask)`.
///
/// 掩膜和为 0 时返回 0.
pub fn masked_mse(
    pred: ArrayViewD<'_, f32>,
    target: ArrayViewD<'_, f32>,
    mask: ArrayViewD<'_, f32>,
) -> f32 {
    debug_assert_eq!(pred.shape(), target.shape());
    debug_assert_eq!(pred.shape(), mask.shape());
    let mut num = 0f64;
    Zip::from(&pred)
        .and(&target)
        .and(&mask)
        .for_each(|&p, &t, &m| num += (((p - t) * m) as f64).powi(2));
    let den = mask.iter().map(|&m| m as f64).sum::<f64>();
    if den == 0.0 {
        0.0
    } else {
        (num / den) as f32
    }
}

/// 软 Dice 损失. 输入形状为 `(N, C, ...)`, 对每个 `(n, c)` 计算后取平均.
///
/// `1 - (2 * |P * T| + smooth) / (|P| + |T| + smooth)`.
pub fn dice_loss(pred: ArrayViewD<'_, f32>, target: ArrayViewD<'_, f32>, smooth: f32) -> f32 {
    debug_assert_eq!(pred.shape(), target.shape());
    debug_assert!(pred.ndim() >= 2);
    let mut total = 0f64;
    let mut count = 0usize;
    for (p_n, t_n) in pred.axis_iter(Axis(0)).zip(target.axis_iter(Axis(0))) {
        for (p, t) in p_n.axis_iter(Axis(0)).zip(t_n.axis_iter(Axis(0))) {
            let inter: f64 = Zip::from(&p).and(&t).fold(0.0, |acc, &a, &b| acc + (a * b) as f64);
            let sp: f64 = p.iter().map(|&v| v as f64).sum();
            let st: f64 = t.iter().map(|&v| v as f64).sum();
            let smooth = smooth as f64;
            total += 1.0 - (2.0 * inter + smooth) / (sp + st + smooth);
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        (total / count as f64) as f32
    }
}
