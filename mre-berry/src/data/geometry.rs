//! 体数据的物理空间几何信息.
//!
//! 所有物理坐标均按 `(x, y, z)` 顺序给出 (LPS 约定), 与体数据在内存中的
//! `(z, H, W)` 布局相互独立.

use crate::{MreError, MreResult};
use nalgebra::{Matrix3, Vector3};
use nifti::NiftiHeader;

/// 体数据的原点、体素间距和方向余弦矩阵.
///
/// 方向矩阵的第 `j` 列是第 `j` 个索引轴在物理空间中的单位方向.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    origin: Vector3<f64>,
    spacing: Vector3<f64>,
    direction: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Geometry {
    /// 构建几何信息.
    ///
    /// `spacing` 的每个分量都必须是有限正数, `direction` 必须可逆, 否则返回 `Err`.
    pub fn new(
        origin: Vector3<f64>,
        spacing: Vector3<f64>,
        direction: Matrix3<f64>,
    ) -> MreResult<Self> {
        if !spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(MreError::Config(format!("非法体素间距 {spacing:?}")));
        }
        let inverse = direction
            .try_inverse()
            .ok_or_else(|| MreError::Config("方向矩阵不可逆".to_string()))?;
        Ok(Self {
            origin,
            spacing,
            direction,
            inverse,
        })
    }

    /// 原点为 0, 方向为单位阵, 间距为 `spacing` 的几何信息.
    ///
    /// 当 `spacing` 非法时 panic.
    pub fn from_spacing(spacing: [f64; 3]) -> Self {
        Self::new(
            Vector3::zeros(),
            Vector3::from(spacing),
            Matrix3::identity(),
        )
        .expect("体素间距必须为正")
    }

    /// 从 nifti header 解析几何信息.
    ///
    /// 依次尝试 sform, qform; 两者都不可用时只使用 `pixdim`.
    /// nifti 使用 RAS 约定, 这里统一翻转 x, y 轴转换为 LPS.
    pub fn from_header(h: &NiftiHeader) -> MreResult<Self> {
        let [_, sx, sy, sz, ..] = h.pixdim;
        let spacing = Vector3::new(sx as f64, sy as f64, sz as f64)
            .map(|s| if s.abs() > 0.0 { s.abs() } else { 1.0 });

        let (origin, direction) = if h.sform_code > 0 {
            let rows = [h.srow_x, h.srow_y, h.srow_z];
            let mut m = Matrix3::zeros();
            for (r, row) in rows.iter().enumerate() {
                for c in 0..3 {
                    m[(r, c)] = row[c] as f64 / spacing[c];
                }
            }
            let o = Vector3::new(rows[0][3] as f64, rows[1][3] as f64, rows[2][3] as f64);
            (o, m)
        } else if h.qform_code > 0 {
            let (b, c, d) = (
                h.quatern_b as f64,
                h.quatern_c as f64,
                h.quatern_d as f64,
            );
            let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
            let mut m = Matrix3::new(
                a * a + b * b - c * c - d * d,
                2.0 * (b * c - a * d),
                2.0 * (b * d + a * c),
                2.0 * (b * c + a * d),
                a * a + c * c - b * b - d * d,
                2.0 * (c * d - a * b),
                2.0 * (b * d - a * c),
                2.0 * (c * d + a * b),
                a * a + d * d - c * c - b * b,
            );
            // qfac
            if h.pixdim[0] < 0.0 {
                m.column_mut(2).neg_mut();
            }
            let o = Vector3::new(
                h.quatern_x as f64,
                h.quatern_y as f64,
                h.quatern_z as f64,
            );
            (o, m)
        } else {
            (Vector3::zeros(), Matrix3::identity())
        };

        // RAS -> LPS
        let flip = Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0));
        Self::new(flip * origin, spacing, flip * direction)
    }

    /// 原点的物理坐标.
    #[inline]
    pub fn origin(&self) -> &Vector3<f64> {
        &self.origin
    }

    /// 体素间距, 以毫米为单位.
    #[inline]
    pub fn spacing(&self) -> &Vector3<f64> {
        &self.spacing
    }

    /// 方向余弦矩阵.
    #[inline]
    pub fn direction(&self) -> &Matrix3<f64> {
        &self.direction
    }

    /// 设置原点.
    #[inline]
    pub fn set_origin(&mut self, origin: Vector3<f64>) {
        self.origin = origin;
    }

    /// 设置体素间距. 当间距非法时返回 `Err`, 原值保持不变.
    pub fn set_spacing(&mut self, spacing: Vector3<f64>) -> MreResult<()> {
        if !spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(MreError::Config(format!("非法体素间距 {spacing:?}")));
        }
        self.spacing = spacing;
        Ok(())
    }

    /// 连续索引 `(i, j, k)` (分别对应 x, y, z) 到物理坐标.
    #[inline]
    pub fn index_to_physical(&self, index: &Vector3<f64>) -> Vector3<f64> {
        self.origin + self.direction * self.spacing.component_mul(index)
    }

    /// 物理坐标到连续索引 `(i, j, k)`.
    #[inline]
    pub fn physical_to_index(&self, point: &Vector3<f64>) -> Vector3<f64> {
        (self.inverse * (point - self.origin)).component_div(&self.spacing)
    }

    /// 形状为 `size` (按 x, y, z 顺序) 的网格的几何中心.
    pub fn center(&self, size: [usize; 3]) -> Vector3<f64> {
        let mid = Vector3::from(size).map(|n| (n as f64 - 1.0) / 2.0);
        self.index_to_physical(&mid)
    }

    /// 平移原点, 使形状为 `size` 的网格沿 z 方向的中心位于物理 z = 0.
    pub fn recenter_z(&mut self, size: [usize; 3]) {
        let c = self.center(size);
        self.origin.z -= c.z;
    }

    /// 沿 `grid` 的 z 轴平移原点, 使原点落在 `grid` 的整数 z 索引上.
    ///
    /// 平移量不超过 `grid` 的半个 z 间距. 两个网格 z 间距相同时,
    /// 本网格的每个 z 切片随之落在 `grid` 的切片上.
    pub fn snap_z_to(&mut self, grid: &Geometry) {
        let k = grid.physical_to_index(&self.origin).z;
        let dk = k.round() - k;
        self.origin += grid.direction.column(2) * (dk * grid.spacing.z);
    }
}
