//! 体素插值.

use super::Pixel;
use nalgebra::Vector3;
use ndarray::ArrayView3;

/// 连续索引 `c` 是否落在长度为 `n` 的轴的采样范围 `[-0.5, n - 0.5)` 内.
#[inline]
fn inside(c: f64, n: usize) -> bool {
    c >= -0.5 && c < n as f64 - 0.5
}

/// 连续索引 (x, y, z) 是否落在 `(z, H, W)` 布局数据的采样范围内.
#[inline]
fn inside_3d(data: &ArrayView3<'_, impl Copy>, c: &Vector3<f64>) -> bool {
    let (z, h, w) = data.dim();
    inside(c.x, w) && inside(c.y, h) && inside(c.z, z)
}

/// 最近邻插值. 半整数向上取整. 超出采样范围时返回 `None`.
pub(crate) fn nearest<T: Pixel>(data: &ArrayView3<'_, T>, c: &Vector3<f64>) -> Option<T> {
    if !inside_3d(data, c) {
        return None;
    }
    let (z, h, w) = data.dim();
    let round = |v: f64, n: usize| ((v + 0.5).floor().max(0.0) as usize).min(n - 1);
    Some(data[(round(c.z, z), round(c.y, h), round(c.x, w))])
}

/// 三线性插值. 邻居索引在边界处被截断. 超出采样范围时返回 `None`.
pub(crate) fn trilinear<T: Pixel>(data: &ArrayView3<'_, T>, c: &Vector3<f64>) -> Option<f64> {
    if !inside_3d(data, c) {
        return None;
    }
    let (z, h, w) = data.dim();

    // (下邻居, 上邻居, 上邻居权重)
    let split = |v: f64, n: usize| {
        let v = v.clamp(0.0, (n - 1) as f64);
        let lo = v.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        (lo, hi, v - lo as f64)
    };
    let (z0, z1, fz) = split(c.z, z);
    let (y0, y1, fy) = split(c.y, h);
    let (x0, x1, fx) = split(c.x, w);

    let v = |k: usize, j: usize, i: usize| data[(k, j, i)].to_f64().unwrap_or(0.0);
    let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;

    let c00 = lerp(v(z0, y0, x0), v(z0, y0, x1), fx);
    let c01 = lerp(v(z0, y1, x0), v(z0, y1, x1), fx);
    let c10 = lerp(v(z1, y0, x0), v(z1, y0, x1), fx);
    let c11 = lerp(v(z1, y1, x0), v(z1, y1, x1), fx);

    let c0 = lerp(c00, c01, fy);
    let c1 = lerp(c10, c11, fy);
    Some(lerp(c0, c1, fz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_nearest_bounds() {
        let data = Array3::from_shape_fn((2, 2, 2), |(z, h, w)| (z * 4 + h * 2 + w) as u8);
        let v = data.view();
        assert_eq!(nearest(&v, &Vector3::new(0.0, 0.0, 0.0)), Some(0));
        assert_eq!(nearest(&v, &Vector3::new(0.5, 0.0, 0.0)), Some(1));
        assert_eq!(nearest(&v, &Vector3::new(-0.4, 1.2, 1.0)), Some(6));
        assert_eq!(nearest(&v, &Vector3::new(-0.6, 0.0, 0.0)), None);
        assert_eq!(nearest(&v, &Vector3::new(0.0, 0.0, 1.5)), None);
    }

    #[test]
    fn test_trilinear_midpoint() {
        let data = Array3::from_shape_fn((2, 2, 2), |(z, h, w)| (z * 4 + h * 2 + w) as f32);
        let v = data.view();
        let mid = trilinear(&v, &Vector3::new(0.5, 0.5, 0.5)).unwrap();
        assert!((mid - 3.5).abs() < 1e-12);
        // 边界外侧半个体素内取边界值.
        let edge = trilinear(&v, &Vector3::new(-0.25, 0.0, 0.0)).unwrap();
        assert!((edge - 0.0).abs() < 1e-12);
    }
}
