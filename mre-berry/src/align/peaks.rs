//! 一维信号的峰值检测.

/// 寻找 `signal` 中所有高度不低于 `min_height` 的局部极大值的位置, 升序返回.
///
/// 局部极大值指比左侧邻居严格大, 且向右经过一段 (可以为空的) 等值平台后,
/// 比右侧邻居严格大的样本. 平台的位置取其中点 (向下取整). 信号两端的样本永远不是峰值.
pub fn find_peaks(signal: &[f64], min_height: f64) -> Vec<usize> {
    let n = signal.len();
    let mut peaks = vec![];
    if n < 3 {
        return peaks;
    }

    let i_max = n - 1;
    let mut i = 1;
    while i < i_max {
        if signal[i - 1] < signal[i] {
            let mut ahead = i + 1;
            while ahead < i_max && signal[ahead] == signal[i] {
                ahead += 1;
            }
            if signal[ahead] < signal[i] {
                let (left, right) = (i, ahead - 1);
                peaks.push((left + right) / 2);
                i = ahead;
            }
        }
        i += 1;
    }

    peaks.retain(|&p| signal[p] >= min_height);
    peaks
}

/// 算术平均值. 空信号返回 0.
#[inline]
pub fn mean(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        0.0
    } else {
        signal.iter().sum::<f64>() / signal.len() as f64
    }
}
