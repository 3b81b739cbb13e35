//! 体数据重采样.
//!
//! 把任意网格上的单个 3D 图像搬运到目标体素网格上. 插值策略由图像角色
//! ([`ImageRole`]) 决定: 掩膜使用最近邻, 强度图像使用三线性插值.

use crate::data::{Geometry, Volume};
use crate::MreResult;
use log::debug;
use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;
use num::{Bounded, NumCast, ToPrimitive, Zero};

mod interp;

/// 可以参与重采样的体素类型.
pub trait Pixel: Copy + Zero + Bounded + ToPrimitive + NumCast + Send + Sync {}

impl<T> Pixel for T where T: Copy + Zero + Bounded + ToPrimitive + NumCast + Send + Sync {}

/// 把 `v` 截断到 `T` 的表示范围内再转换. 整数类型向零取整, 无法表示的值 (NaN) 变为 0.
#[inline]
pub fn saturating_cast<T: Pixel>(v: f64) -> T {
    let lo = T::min_value().to_f64().unwrap_or(f64::MIN);
    let hi = T::max_value().to_f64().unwrap_or(f64::MAX);
    num::cast::<f64, T>(v.clamp(lo, hi)).unwrap_or_else(T::zero)
}

/// 插值方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Interpolation {
    /// 最近邻. 不会产生原图中不存在的值.
    NearestNeighbor,

    /// 三线性.
    Linear,
}

/// 图像所属的网格域.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Domain {
    /// 解剖 MRI 网格, 深度为 `nz_mri`.
    Mri,

    /// 弹性成像 MRE 网格, 深度为 `nz_mre`.
    Mre,
}

/// 图像角色. 在调用处一次性确定, 决定目标深度和插值方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ImageRole {
    /// MRI 域强度图像.
    MriIntensity,

    /// MRI 域标签/掩膜.
    MriMask,

    /// MRE 域强度图像 (波、刚度、置信度).
    MreIntensity,

    /// MRE 域标签/掩膜.
    MreMask,
}

impl ImageRole {
    /// 所属网格域.
    #[inline]
    pub const fn domain(&self) -> Domain {
        match self {
            Self::MriIntensity | Self::MriMask => Domain::Mri,
            Self::MreIntensity | Self::MreMask => Domain::Mre,
        }
    }

    /// 是否为标签/掩膜.
    #[inline]
    pub const fn is_mask(&self) -> bool {
        matches!(self, Self::MriMask | Self::MreMask)
    }

    /// 该角色对应的插值方式.
    #[inline]
    pub const fn interpolation(&self) -> Interpolation {
        if self.is_mask() {
            Interpolation::NearestNeighbor
        } else {
            Interpolation::Linear
        }
    }
}

/// 两个规范网格的形状.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GridSpec {
    /// x 方向体素个数.
    pub nx: usize,

    /// y 方向体素个数.
    pub ny: usize,

    /// MRI 域 z 方向切片个数.
    pub nz_mri: usize,

    /// MRE 域 z 方向切片个数.
    pub nz_mre: usize,
}

impl GridSpec {
    /// `role` 对应的目标网格大小, 按 `(x, y, z)` 排列.
    #[inline]
    pub fn target_size(&self, role: ImageRole) -> [usize; 3] {
        let nz = match role.domain() {
            Domain::Mri => self.nz_mri,
            Domain::Mre => self.nz_mre,
        };
        [self.nx, self.ny, nz]
    }
}

/// 以 `center` 为中心的仿射变换: `p -> M (p - c) + c + t`.
///
/// 将输出 (参考) 网格的物理坐标映射到输入图像的物理坐标.
#[derive(Clone, Debug, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3<f64>,
    center: Vector3<f64>,
    translation: Vector3<f64>,
}

impl AffineTransform {
    /// 恒等变换.
    #[inline]
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
            center: Vector3::zeros(),
            translation: Vector3::zeros(),
        }
    }

    /// 基于几何的居中初始化.
    ///
    /// 变换中心取参考网格的几何中心, 平移量使参考网格中心落到输入网格中心,
    /// 旋转部分为单位阵. 不读取任何体素内容.
    pub fn centered_geometry(
        reference: &Geometry,
        reference_size: [usize; 3],
        input: &Geometry,
        input_size: [usize; 3],
    ) -> Self {
        let center = reference.center(reference_size);
        let translation = input.center(input_size) - center;
        Self {
            matrix: Matrix3::identity(),
            center,
            translation,
        }
    }

    /// 变换一个物理坐标点.
    #[inline]
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * (p - self.center) + self.center + self.translation
    }

    /// 平移分量.
    #[inline]
    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }
}

/// 把 `input` 重采样到由 `reference` 和 `size` 描述的网格上.
///
/// 对每个输出体素, 先求其物理坐标, 经 `transform` 映射到输入空间后再插值.
/// 落在输入采样范围外的体素取 0. 输出保持输入的体素类型.
pub fn resample_onto<T: Pixel>(
    input: &Volume<T>,
    reference: &Geometry,
    size: [usize; 3],
    transform: &AffineTransform,
    interpolation: Interpolation,
) -> Volume<T> {
    let [nx, ny, nz] = size;
    let src = input.data();
    let src_geo = input.geometry();

    let data = Array3::from_shape_fn((nz, ny, nx), |(k, j, i)| {
        let p = reference.index_to_physical(&Vector3::new(i as f64, j as f64, k as f64));
        let c = src_geo.physical_to_index(&transform.transform_point(&p));
        match interpolation {
            Interpolation::NearestNeighbor => interp::nearest(&src, &c).unwrap_or_else(T::zero),
            Interpolation::Linear => {
                interp::trilinear(&src, &c).map_or_else(T::zero, saturating_cast::<T>)
            }
        }
    });
    Volume::new(data, reference.clone())
}

/// 单图像重采样器. 除目标网格形状外不持有任何状态.
#[derive(Copy, Clone, Debug)]
pub struct ImageResampler {
    grid: GridSpec,
}

impl ImageResampler {
    /// 以目标网格 `grid` 初始化.
    #[inline]
    pub fn new(grid: GridSpec) -> Self {
        Self { grid }
    }

    /// 目标网格.
    #[inline]
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// 重采样 `image` 到 `role` 对应的规范网格.
    ///
    /// 参考网格的原点和方向取自 `image`. 当 `spacing_override` 为 `None`
    /// 时, 参考网格间距为源间距乘以各轴缩放因子 (源范围 / 目标范围),
    /// 即保持物理范围不变 (resize 模式); 否则 x, y 间距直接取
    /// `spacing_override`, z 间距保持源间距 (respace 模式).
    pub fn resample<T: Pixel>(
        &self,
        image: &Volume<T>,
        role: ImageRole,
        spacing_override: Option<(f64, f64)>,
    ) -> MreResult<Volume<T>> {
        let target = self.grid.target_size(role);
        let source = image.size_xyz();
        let src_spacing = image.geometry().spacing();

        let spacing = match spacing_override {
            None => Vector3::from_fn(|a, _| {
                src_spacing[a] * (source[a] as f64 / target[a] as f64)
            }),
            Some((sx, sy)) => Vector3::new(sx, sy, src_spacing.z),
        };
        debug!(
            "重采样 {role:?}: {source:?} -> {target:?}, 间距 {:?} -> {:?}",
            src_spacing.as_slice(),
            spacing.as_slice()
        );

        // 空输入会产生 0 间距, 在这里被拒绝.
        let mut reference = image.geometry().clone();
        reference.set_spacing(spacing)?;

        let transform =
            AffineTransform::centered_geometry(&reference, target, image.geometry(), source);
        Ok(resample_onto(
            image,
            &reference,
            target,
            &transform,
            role.interpolation(),
        ))
    }

    /// resize 模式: 保持物理范围, 改变网格形状.
    #[inline]
    pub fn resize<T: Pixel>(&self, image: &Volume<T>, role: ImageRole) -> MreResult<Volume<T>> {
        self.resample(image, role, None)
    }

    /// respace 模式: 以外部给定的 x, y 间距重采样 (用于把 MRE 图像对齐到 MRI 间距).
    #[inline]
    pub fn respace<T: Pixel>(
        &self,
        image: &Volume<T>,
        role: ImageRole,
        x_spacing: f64,
        y_spacing: f64,
    ) -> MreResult<Volume<T>> {
        self.resample(image, role, Some((x_spacing, y_spacing)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridSpec {
        GridSpec {
            nx: 12,
            ny: 10,
            nz_mri: 6,
            nz_mre: 2,
        }
    }

    #[test]
    fn test_role_dispatch() {
        assert_eq!(ImageRole::MriMask.interpolation(), Interpolation::NearestNeighbor);
        assert_eq!(ImageRole::MreMask.interpolation(), Interpolation::NearestNeighbor);
        assert_eq!(ImageRole::MriIntensity.interpolation(), Interpolation::Linear);
        assert_eq!(ImageRole::MreIntensity.interpolation(), Interpolation::Linear);
        assert_eq!(grid().target_size(ImageRole::MreIntensity), [12, 10, 2]);
        assert_eq!(grid().target_size(ImageRole::MriMask), [12, 10, 6]);
    }

    #[test]
    fn test_saturating_cast() {
        assert_eq!(saturating_cast::<i16>(1e9), i16::MAX);
        assert_eq!(saturating_cast::<i16>(-1e9), i16::MIN);
        assert_eq!(saturating_cast::<i16>(2.7), 2);
        assert_eq!(saturating_cast::<u8>(f64::NAN), 0);
        assert_eq!(saturating_cast::<f32>(0.25), 0.25);
    }

    #[test]
    fn test_checkerboard_mask_stays_binary() {
        let data = Array3::from_shape_fn((5, 7, 9), |(z, h, w)| ((z + h + w) % 2) as u8);
        let mask = Volume::new(data, Geometry::from_spacing([1.0, 1.3, 2.5]));
        let r = ImageResampler::new(grid());

        let out = r.resize(&mask, ImageRole::MriMask).unwrap();
        assert_eq!(out.shape(), (6, 10, 12));
        assert!(out.data().iter().all(|&v| v <= 1));
        assert!(out.data().iter().any(|&v| v == 1));

        // 线性插值会在边界处产生中间值.
        let fdata = mask.data().mapv(|v| <f32 as From<u8>>::from(v));
        let fmask = Volume::new(fdata, mask.geometry().clone());
        let lin = r.resize(&fmask, ImageRole::MriIntensity).unwrap();
        assert!(lin.data().iter().any(|&v| v > 0.0 && v < 1.0));
    }

    #[test]
    fn test_shape_exact_for_any_input() {
        let r = ImageResampler::new(grid());
        for (z, h, w) in [(1, 1, 1), (3, 40, 2), (17, 5, 33)] {
            let v = Volume::new(Array3::<f32>::ones((z, h, w)), Geometry::from_spacing([0.8; 3]));
            let resized = r.resize(&v, ImageRole::MriIntensity).unwrap();
            assert_eq!(resized.shape(), (6, 10, 12));
            let respaced = r.respace(&v, ImageRole::MreIntensity, 0.5, 0.5).unwrap();
            assert_eq!(respaced.shape(), (2, 10, 12));
        }
    }

    #[test]
    fn test_identity_resize_preserves_values() {
        let data = Array3::from_shape_fn((6, 10, 12), |(z, h, w)| (z * 100 + h * 10 + w) as i16);
        let v = Volume::new(data.clone(), Geometry::from_spacing([1.0, 1.0, 3.0]));
        let out = ImageResampler::new(grid())
            .resize(&v, ImageRole::MriIntensity)
            .unwrap();
        assert_eq!(out.data(), data.view());
        assert_eq!(out.geometry().spacing(), v.geometry().spacing());
    }

    #[test]
    fn test_respace_keeps_origin_and_direction() {
        // 绕 z 轴旋转 90 度.
        let direction = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let geometry = Geometry::new(
            Vector3::new(10.0, -5.0, 2.0),
            Vector3::new(0.8, 0.9, 3.0),
            direction,
        )
        .unwrap();
        let v = Volume::new(Array3::<f32>::ones((4, 20, 20)), geometry.clone());

        let out = ImageResampler::new(grid())
            .respace(&v, ImageRole::MreIntensity, 0.5, 0.6)
            .unwrap();
        assert_eq!(out.shape(), (2, 10, 12));
        assert_eq!(out.geometry().spacing(), &Vector3::new(0.5, 0.6, 3.0));
        assert_eq!(out.geometry().origin(), geometry.origin());
        assert_eq!(out.geometry().direction(), &direction);
        // 参考网格居中于输入网格内部, 不会取到范围外的 0.
        assert!(out.data().iter().all(|&p| (p - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_centered_transform_translation() {
        let reference = Geometry::from_spacing([2.0, 2.0, 2.0]);
        let input = Geometry::from_spacing([1.0, 1.0, 1.0]);
        let t = AffineTransform::centered_geometry(&reference, [4, 4, 4], &input, [8, 8, 8]);
        // 参考中心 (3, 3, 3), 输入中心 (3.5, 3.5, 3.5).
        assert!((t.translation() - Vector3::repeat(0.5)).norm() < 1e-12);
    }
}
