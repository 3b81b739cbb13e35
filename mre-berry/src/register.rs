//! 配准协作者接口与内置实现.
//!
//! 配准结果总是位于固定 (fixed) 图像的网格上.

use crate::data::Volume;
use crate::resample::{resample_onto, AffineTransform, Interpolation};
use crate::{MreError, MreResult};
use log::debug;
use ndarray::{s, Array3, ArrayView3, Axis, Zip};

/// 命名的配准预设.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegistrationProfile {
    /// 序列到序列 (同一次检查中的不同 MRI 序列).
    MriSequence,

    /// 弹性成像波图像到解剖 z 栈的匹配.
    MreMatch,
}

impl RegistrationProfile {
    /// 预设名称.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MriSequence => "mri_seq",
            Self::MreMatch => "mre_match",
        }
    }

    /// 在深度为 `nz` 的固定图像上允许搜索的最大 z 平移 (以切片为单位).
    #[inline]
    pub const fn max_shift(&self, nz: usize) -> usize {
        match self {
            Self::MriSequence => {
                if nz / 2 < 2 {
                    nz / 2
                } else {
                    2
                }
            }
            Self::MreMatch => nz / 2,
        }
    }
}

/// 外部刚性/仿射配准过程.
pub trait Registration {
    /// 把 `moving` 配准到 `fixed`, 返回位于 `fixed` 网格上的 moving 图像.
    ///
    /// `fixed_mask` 和 `moving_mask` 若给出, 必须分别与 `fixed`, `moving` 形状一致.
    fn register(
        &self,
        fixed: &Volume<f32>,
        moving: &Volume<f32>,
        profile: RegistrationProfile,
        fixed_mask: Option<&Volume<u8>>,
        moving_mask: Option<&Volume<u8>>,
    ) -> MreResult<Volume<f32>>;
}

/// 检查掩膜是否与图像形状一致.
fn check_mask(image: &Volume<f32>, mask: Option<&Volume<u8>>, which: &str) -> MreResult<()> {
    match mask {
        Some(m) if m.shape() != image.shape() => Err(MreError::Registration(format!(
            "{which} 掩膜形状 {:?} 与图像形状 {:?} 不一致",
            m.shape(),
            image.shape()
        ))),
        _ => Ok(()),
    }
}

/// 纯几何配准: 在物理空间中使用恒等变换, 把 moving 线性插值到 fixed 网格上.
#[derive(Copy, Clone, Debug, Default)]
pub struct GeometricRegistration;

impl Registration for GeometricRegistration {
    fn register(
        &self,
        fixed: &Volume<f32>,
        moving: &Volume<f32>,
        _profile: RegistrationProfile,
        fixed_mask: Option<&Volume<u8>>,
        moving_mask: Option<&Volume<u8>>,
    ) -> MreResult<Volume<f32>> {
        check_mask(fixed, fixed_mask, "fixed")?;
        check_mask(moving, moving_mask, "moving")?;
        Ok(resample_onto(
            moving,
            fixed.geometry(),
            fixed.size_xyz(),
            &AffineTransform::identity(),
            Interpolation::Linear,
        ))
    }
}

/// 轴向平移搜索配准.
///
/// 先按几何关系把 moving 搬到 fixed 网格上, 再在预设范围内穷举整数 z 平移,
/// 取掩膜内归一化互相关最大的一个. 得分相同时取平移量绝对值较小者.
///
/// 给出 `moving_mask` 时, 只在 moving 掩膜 (与 fixed 掩膜) 内计分; 并且
/// 与零平移相比, 使 moving 掩膜内的体素离开 fixed 网格或 fixed 掩膜的平移不参与比较.
#[derive(Copy, Clone, Debug, Default)]
pub struct AxialShiftRegistration;

impl Registration for AxialShiftRegistration {
    fn register(
        &self,
        fixed: &Volume<f32>,
        moving: &Volume<f32>,
        profile: RegistrationProfile,
        fixed_mask: Option<&Volume<u8>>,
        moving_mask: Option<&Volume<u8>>,
    ) -> MreResult<Volume<f32>> {
        check_mask(fixed, fixed_mask, "fixed")?;
        check_mask(moving, moving_mask, "moving")?;

        let base = GeometricRegistration.register(fixed, moving, profile, None, None)?;
        let moving_mask = moving_mask.map(|m| {
            resample_onto(
                m,
                fixed.geometry(),
                fixed.size_xyz(),
                &AffineTransform::identity(),
                Interpolation::NearestNeighbor,
            )
        });

        let fixed_view = fixed_mask.map(|m| m.data());
        let required = moving_mask
            .as_ref()
            .map(|m| coverage(m.data(), fixed_view.clone()));

        let nz = fixed.len_z() as isize;
        let max = profile.max_shift(fixed.len_z()) as isize;
        let mut best: Option<(isize, f64)> = None;
        for shift in (0..=max).flat_map(|d| if d == 0 { vec![0] } else { vec![-d, d] }) {
            if shift.abs() >= nz.max(1) {
                continue;
            }
            let cmask = moving_mask.as_ref().map(|m| shift_z(m.data(), shift));
            if let (Some(need), Some(m)) = (required, cmask.as_ref()) {
                if coverage(m.view(), fixed_view.clone()) < need {
                    continue;
                }
            }
            let candidate = shift_z(base.data(), shift);
            let Some(score) = masked_ncc(
                fixed.data(),
                candidate.view(),
                fixed_view.clone(),
                cmask.as_ref().map(|m| m.view()),
            ) else {
                continue;
            };
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((shift, score));
            }
        }

        let shift = best.map_or(0, |(s, _)| s);
        debug!(
            "{} 轴向平移搜索: 最佳平移 {shift} 切片, 得分 {:?}",
            profile.name(),
            best.map(|(_, b)| b)
        );
        Ok(Volume::new(
            shift_z(base.data(), shift),
            fixed.geometry().clone(),
        ))
    }
}

/// 沿 z 轴平移 `shift` 个切片: `out[k] = data[k - shift]`, 空出的切片补 0.
pub(crate) fn shift_z<T: Copy + num::Zero>(data: ArrayView3<'_, T>, shift: isize) -> Array3<T> {
    let nz = data.len_of(Axis(0)) as isize;
    let mut out = Array3::zeros(data.raw_dim());
    if shift.abs() >= nz {
        return out;
    }
    if shift >= 0 {
        out.slice_mut(s![shift.., .., ..])
            .assign(&data.slice(s![..nz - shift, .., ..]));
    } else {
        out.slice_mut(s![..nz + shift, .., ..])
            .assign(&data.slice(s![-shift.., .., ..]));
    }
    out
}

/// `mask` 中落在 `within` 内的非零体素个数. `within` 为 `None` 时统计全部非零体素.
fn coverage(mask: ArrayView3<'_, u8>, within: Option<ArrayView3<'_, u8>>) -> usize {
    match within {
        Some(w) => Zip::from(&mask)
            .and(&w)
            .fold(0, |n, &m, &w| n + usize::from(m != 0 && w != 0)),
        None => mask.iter().filter(|&&m| m != 0).count(),
    }
}

/// 掩膜内的归一化互相关. 有效体素不足 2 个或任一方差为 0 时返回 `None`.
fn masked_ncc(
    a: ArrayView3<'_, f32>,
    b: ArrayView3<'_, f32>,
    mask_a: Option<ArrayView3<'_, u8>>,
    mask_b: Option<ArrayView3<'_, u8>>,
) -> Option<f64> {
    let (mut n, mut sa, mut sb, mut saa, mut sbb, mut sab) = (0f64, 0f64, 0f64, 0f64, 0f64, 0f64);
    for (pos, (&x, &y)) in a.indexed_iter().zip(b.iter()).map(|((p, x), y)| (p, (x, y))) {
        if mask_a.as_ref().is_some_and(|m| m[pos] == 0)
            || mask_b.as_ref().is_some_and(|m| m[pos] == 0)
        {
            continue;
        }
        let (x, y) = (x as f64, y as f64);
        n += 1.0;
        sa += x;
        sb += y;
        saa += x * x;
        sbb += y * y;
        sab += x * y;
    }
    if n < 2.0 {
        return None;
    }
    let cov = sab - sa * sb / n;
    let va = saa - sa * sa / n;
    let vb = sbb - sb * sb / n;
    (va > 0.0 && vb > 0.0).then(|| cov / (va * vb).sqrt())
}

/// 把 `volume` 的强度范围线性映射到 `[out_min, out_max]`.
///
/// 输入范围退化 (最大值等于最小值) 时: 最大值非 0 则按 `[0, max]` 映射,
/// 否则所有体素变为 `out_min`.
pub fn rescale_intensity(volume: &Volume<f32>, out_min: f32, out_max: f32) -> Volume<f32> {
    let Some((lo, hi)) = volume.min_max() else {
        return volume.clone();
    };
    let (lo, hi, out_min, out_max) = (lo as f64, hi as f64, out_min as f64, out_max as f64);
    let scale = if hi != lo {
        (out_max - out_min) / (hi - lo)
    } else if hi != 0.0 {
        (out_max - out_min) / hi
    } else {
        0.0
    };
    let shift = out_min - lo * scale;
    Volume::new(
        volume.data().mapv(|v| (v as f64 * scale + shift) as f32),
        volume.geometry().clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Geometry;

    fn vol(data: Array3<f32>) -> Volume<f32> {
        Volume::new(data, Geometry::from_spacing([1.0; 3]))
    }

    #[test]
    fn test_shift_z() {
        let data = Array3::from_shape_fn((4, 1, 1), |(z, _, _)| z as i32 + 1);
        assert_eq!(shift_z(data.view(), 1).into_raw_vec(), vec![0, 1, 2, 3]);
        assert_eq!(shift_z(data.view(), -2).into_raw_vec(), vec![3, 4, 0, 0]);
        assert_eq!(shift_z(data.view(), 9).into_raw_vec(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_geometric_registration_same_grid() {
        let data = Array3::from_shape_fn((3, 4, 5), |(z, h, w)| (z + h + w) as f32);
        let fixed = vol(Array3::zeros((3, 4, 5)));
        let out = GeometricRegistration
            .register(&fixed, &vol(data.clone()), RegistrationProfile::MriSequence, None, None)
            .unwrap();
        assert_eq!(out.data(), data.view());
    }

    #[test]
    fn test_mask_shape_checked() {
        let fixed = vol(Array3::zeros((3, 4, 5)));
        let bad = Volume::new(Array3::<u8>::zeros((2, 4, 5)), Geometry::from_spacing([1.0; 3]));
        let r = GeometricRegistration.register(
            &fixed,
            &fixed,
            RegistrationProfile::MreMatch,
            Some(&bad),
            None,
        );
        assert!(matches!(r, Err(MreError::Registration(_))));
    }

    #[test]
    fn test_axial_shift_recovers_offset() {
        // 固定图像在 z = 5 处有一个亮片, moving 在 z = 3 处.
        let mut f = Array3::<f32>::zeros((12, 4, 4));
        f.slice_mut(s![5, .., ..]).fill(10.0);
        f[(5, 0, 0)] = 7.0;
        let mut m = Array3::<f32>::zeros((12, 4, 4));
        m.slice_mut(s![3, .., ..]).fill(10.0);
        m[(3, 0, 0)] = 7.0;

        let out = AxialShiftRegistration
            .register(&vol(f.clone()), &vol(m), RegistrationProfile::MreMatch, None, None)
            .unwrap();
        assert_eq!(out.data(), f.view());
    }

    #[test]
    fn test_rescale_intensity() {
        let v = vol(Array3::from_shape_vec((1, 1, 3), vec![0.0, 5.0, 10.0]).unwrap());
        let r = rescale_intensity(&v, 100.0, 200.0);
        assert_eq!(r.data().iter().copied().collect::<Vec<_>>(), vec![100.0, 150.0, 200.0]);

        let flat = vol(Array3::from_elem((1, 1, 2), 0.0));
        let r = rescale_intensity(&flat, 3.0, 9.0);
        assert!(r.data().iter().all(|&v| v == 3.0));
    }
}
