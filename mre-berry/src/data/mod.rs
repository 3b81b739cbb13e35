use std::ops::{Index, IndexMut};
use std::path::Path;

use itertools::Itertools;
use ndarray::{Array3, ArrayView2, ArrayView3, ArrayViewMut3, Axis, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use ordered_float::OrderedFloat;

use crate::{Idx3d, MreError, MreResult};

pub mod geometry;
pub mod save;

pub use geometry::Geometry;

/// 带物理几何信息的 3D 体数据.
///
/// 数据按 `(z, H, W)` 布局存储, 即第一维是相邻切片方向, 第二维向下增长,
/// 第三维向右增长. 几何信息按 `(x, y, z)` 顺序描述, 其中 x 对应 W, y 对应 H.
#[derive(Debug, Clone)]
pub struct Volume<T> {
    data: Array3<T>,
    geometry: Geometry,
}

impl<T> Index<Idx3d> for Volume<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl<T> IndexMut<Idx3d> for Volume<T> {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl<T> Volume<T> {
    /// 由 `(z, H, W)` 布局的数据和几何信息直接创建.
    #[inline]
    pub fn new(data: Array3<T>, geometry: Geometry) -> Self {
        Self { data, geometry }
    }

    /// 获取数据形状 `(z, H, W)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获取按 `(x, y, z)` 顺序排列的网格大小.
    #[inline]
    pub fn size_xyz(&self) -> [usize; 3] {
        let (z, h, w) = self.shape();
        [w, h, z]
    }

    /// 获取水平切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 几何信息.
    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// 可变几何信息.
    #[inline]
    pub fn geometry_mut(&mut self) -> &mut Geometry {
        &mut self.geometry
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, T> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut3<'_, T> {
        self.data.view_mut()
    }

    /// 消费自我, 获得底层数据.
    #[inline]
    pub fn into_data(self) -> Array3<T> {
        self.data
    }

    /// 获取 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ArrayView2<'_, T> {
        self.data.index_axis(Axis(0), z_index)
    }

    /// 获取能按升序迭代水平切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = ArrayView2<'_, T>> {
        self.data.axis_iter(Axis(0))
    }
}

impl<T: Clone> Volume<T> {
    /// 获取按 `(x, y, z)` 布局排列的一份数据拷贝 (即 `(z, H, W)` 的转置).
    pub fn to_xyz(&self) -> Array3<T> {
        self.data
            .view()
            .permuted_axes([2, 1, 0])
            .as_standard_layout()
            .into_owned()
    }

    /// 由 `(x, y, z)` 布局的数据和几何信息创建.
    pub fn from_xyz(data: Array3<T>, geometry: Geometry) -> Self {
        let data = data.permuted_axes([2, 1, 0]);
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        debug_assert!(data.is_standard_layout());
        Self { data, geometry }
    }
}

impl Volume<f32> {
    /// 打开 nii 文件格式的 3D 体数据. `path` 为 nii 文件的本地路径.
    /// 体素值统一以 `f32` 保存.
    pub fn open<P: AsRef<Path>>(path: P) -> MreResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let geometry = Geometry::from_header(obj.header())?;

        // [W, H, z] -> [z, H, W].
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()?
            .into_dimensionality::<Ix3>()?
            .permuted_axes([2, 1, 0]);
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Ok(Self { data, geometry })
    }

    /// 最小与最大体素值. 忽略非有限值; 若不存在有限值则返回 `None`.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .minmax_by_key(|&v| OrderedFloat(v))
            .into_option()
    }
}

/// 检查 `found` 是否与 `expected` 形状一致.
#[inline]
pub(crate) fn check_shape(expected: &[usize], found: &[usize]) -> MreResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(MreError::shape_mismatch(expected, found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xyz_round_trip() {
        let zyx = Array3::from_shape_fn((2, 3, 4), |(z, h, w)| (z * 100 + h * 10 + w) as i16);
        let v = Volume::new(zyx.clone(), Geometry::from_spacing([1.0; 3]));
        let xyz = v.to_xyz();
        assert_eq!(xyz.dim(), (4, 3, 2));
        assert_eq!(xyz[(3, 1, 0)], zyx[(0, 1, 3)]);
        assert_eq!(v.size_xyz(), [4, 3, 2]);

        let back = Volume::from_xyz(xyz, Geometry::from_spacing([1.0; 3]));
        assert_eq!(back.data(), zyx.view());
    }

    #[test]
    fn test_min_max_ignores_nan() {
        let mut data = Array3::from_elem((1, 2, 2), 3.0f32);
        data[(0, 0, 0)] = f32::NAN;
        data[(0, 1, 1)] = -2.0;
        let v = Volume::new(data, Geometry::from_spacing([1.0; 3]));
        assert_eq!(v.min_max(), Some((-2.0, 3.0)));
    }
}
