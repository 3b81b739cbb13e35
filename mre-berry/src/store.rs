//! 多维带标签数组仓库.
//!
//! 所有张量都以 `(x, y, z)` 作为最后三维, 第一维为受试者.

use crate::data::check_shape;
use crate::data::save::{ImgWriteVis, IntensitySlice, MaskSlice};
use crate::npz::NpzArchive;
use crate::resample::GridSpec;
use crate::{MreError, MreResult};
use ndarray::{
    s, Array1, Array2, Array5, ArrayView1, ArrayView2, ArrayView3, Axis, Ix1, Ix2, Ix5,
};
use ndarray_npy::NpzWriter;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// 仓库中的四个体数据张量.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tensor {
    /// `(subject, sequence, x, y, z_mri)`.
    ImageMri,

    /// `(subject, mask_type, x, y, z_mri)`.
    MaskMri,

    /// `(subject, mre_type, x, y, z_mre)`.
    ImageMre,

    /// `(subject, mask_type, x, y, z_mre)`.
    MaskMre,
}

impl Tensor {
    /// 全部张量.
    pub const ALL: [Tensor; 4] = [
        Tensor::ImageMri,
        Tensor::MaskMri,
        Tensor::ImageMre,
        Tensor::MaskMre,
    ];

    /// 张量名称, 同时也是持久化时的数组名.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ImageMri => "image_mri",
            Self::MaskMri => "mask_mri",
            Self::ImageMre => "image_mre",
            Self::MaskMre => "mask_mre",
        }
    }

    /// 第二维 (标签维) 的坐标轴名称.
    #[inline]
    pub const fn label_axis(&self) -> &'static str {
        match self {
            Self::ImageMri => "sequence",
            Self::MaskMri | Self::MaskMre => "mask_type",
            Self::ImageMre => "mre_type",
        }
    }

    /// 是否是掩膜张量?
    #[inline]
    pub const fn is_mask(&self) -> bool {
        matches!(self, Self::MaskMri | Self::MaskMre)
    }
}

/// 坐标轴标签.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Coords {
    /// 受试者.
    pub subject: Vec<String>,
    /// 序列.
    pub sequence: Vec<String>,
    /// 掩膜类型.
    pub mask_type: Vec<String>,
    /// 弹性成像图像类型.
    pub mre_type: Vec<String>,
    /// x 坐标.
    pub x: Vec<u32>,
    /// y 坐标, 降序. 索引 `j` 处的坐标为 `ny - 1 - j`, 数据仍按图像行序存放.
    pub y: Vec<u32>,
    /// MRI 域 z 坐标.
    pub z_mri: Vec<u32>,
    /// MRE 域 z 坐标.
    pub z_mre: Vec<u32>,
}

impl Coords {
    /// 由类别标签和网格规格构造. 数值坐标为 `0..n`, 其中 y 为降序.
    pub fn new(
        subject: Vec<String>,
        sequence: Vec<String>,
        mask_type: Vec<String>,
        mre_type: Vec<String>,
        grid: &GridSpec,
    ) -> Self {
        let range = |n: usize| (0..n as u32).collect::<Vec<_>>();
        Self {
            subject,
            sequence,
            mask_type,
            mre_type,
            x: range(grid.nx),
            y: range(grid.ny).into_iter().rev().collect(),
            z_mri: range(grid.nz_mri),
            z_mre: range(grid.nz_mre),
        }
    }

    /// 网格规格.
    pub fn grid(&self) -> GridSpec {
        GridSpec {
            nx: self.x.len(),
            ny: self.y.len(),
            nz_mri: self.z_mri.len(),
            nz_mre: self.z_mre.len(),
        }
    }

    /// 张量 `tensor` 的类别标签.
    pub fn labels(&self, tensor: Tensor) -> &[String] {
        match tensor {
            Tensor::ImageMri => &self.sequence,
            Tensor::MaskMri | Tensor::MaskMre => &self.mask_type,
            Tensor::ImageMre => &self.mre_type,
        }
    }

    fn shape(&self, tensor: Tensor) -> [usize; 5] {
        let z = match tensor {
            Tensor::ImageMri | Tensor::MaskMri => self.z_mri.len(),
            Tensor::ImageMre | Tensor::MaskMre => self.z_mre.len(),
        };
        [
            self.subject.len(),
            self.labels(tensor).len(),
            self.x.len(),
            self.y.len(),
            z,
        ]
    }
}

#[inline]
fn position(labels: &[String], axis: &'static str, label: &str) -> MreResult<usize> {
    labels
        .iter()
        .position(|l| l == label)
        .ok_or_else(|| MreError::UnknownLabel {
            axis,
            label: label.to_owned(),
        })
}

/// 多维带标签数组仓库. 总是稠密的: 缺失数据的位置为全 0.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeStore {
    coords: Coords,
    image_mri: Array5<i16>,
    mask_mri: Array5<i16>,
    image_mre: Array5<i16>,
    mask_mre: Array5<i16>,
    slice_id: Array2<bool>,
}

impl VolumeStore {
    /// 创建全 0 仓库.
    pub fn zeros(coords: Coords) -> Self {
        let z = |t: Tensor| Array5::zeros(coords.shape(t));
        Self {
            image_mri: z(Tensor::ImageMri),
            mask_mri: z(Tensor::MaskMri),
            image_mre: z(Tensor::ImageMre),
            mask_mre: z(Tensor::MaskMre),
            slice_id: Array2::from_elem((coords.subject.len(), coords.z_mri.len()), false),
            coords,
        }
    }

    /// 坐标轴标签.
    #[inline]
    pub fn coords(&self) -> &Coords {
        &self.coords
    }

    /// 网格规格.
    #[inline]
    pub fn grid(&self) -> GridSpec {
        self.coords.grid()
    }

    /// 受试者在第一维上的索引.
    pub fn subject_index(&self, subject: &str) -> MreResult<usize> {
        position(&self.coords.subject, "subject", subject)
    }

    /// `tensor` 的标签维上 `label` 的索引.
    pub fn label_index(&self, tensor: Tensor, label: &str) -> MreResult<usize> {
        position(self.coords.labels(tensor), tensor.label_axis(), label)
    }

    /// 张量整体视图.
    #[inline]
    pub fn tensor(&self, tensor: Tensor) -> &Array5<i16> {
        match tensor {
            Tensor::ImageMri => &self.image_mri,
            Tensor::MaskMri => &self.mask_mri,
            Tensor::ImageMre => &self.image_mre,
            Tensor::MaskMre => &self.mask_mre,
        }
    }

    #[inline]
    fn tensor_mut(&mut self, tensor: Tensor) -> &mut Array5<i16> {
        match tensor {
            Tensor::ImageMri => &mut self.image_mri,
            Tensor::MaskMri => &mut self.mask_mri,
            Tensor::ImageMre => &mut self.image_mre,
            Tensor::MaskMre => &mut self.mask_mre,
        }
    }

    /// 获取 `(subject, label)` 处的 `(x, y, z)` 体数据.
    pub fn volume(
        &self,
        tensor: Tensor,
        subject: &str,
        label: &str,
    ) -> MreResult<ArrayView3<'_, i16>> {
        let (si, li) = (self.subject_index(subject)?, self.label_index(tensor, label)?);
        Ok(self.tensor(tensor).slice(s![si, li, .., .., ..]))
    }

    /// 写入 `(subject, label)` 处的 `(x, y, z)` 体数据. 形状必须与网格一致.
    pub fn set_volume(
        &mut self,
        tensor: Tensor,
        subject: &str,
        label: &str,
        data: ArrayView3<'_, i16>,
    ) -> MreResult<()> {
        let (si, li) = (self.subject_index(subject)?, self.label_index(tensor, label)?);
        let mut slot = self.tensor_mut(tensor).slice_mut(s![si, li, .., .., ..]);
        check_shape(slot.shape(), data.shape())?;
        slot.assign(&data);
        Ok(())
    }

    /// 写入 `(subject, label)` 处第 `z` 个 `(x, y)` 切片.
    pub fn set_slice(
        &mut self,
        tensor: Tensor,
        subject: &str,
        label: &str,
        z: usize,
        data: ArrayView2<'_, i16>,
    ) -> MreResult<()> {
        let (si, li) = (self.subject_index(subject)?, self.label_index(tensor, label)?);
        let mut slot = self.tensor_mut(tensor).slice_mut(s![si, li, .., .., ..]);
        let nz = slot.len_of(Axis(2));
        if z >= nz {
            return Err(MreError::shape_mismatch(&[nz], &[z]));
        }
        let mut slot = slot.index_axis_mut(Axis(2), z);
        check_shape(slot.shape(), data.shape())?;
        slot.assign(&data);
        Ok(())
    }

    /// 把 MRI z 索引 `indices` 标记为采集切片.
    pub fn mark_slices(&mut self, subject: &str, indices: &[usize]) -> MreResult<()> {
        let si = self.subject_index(subject)?;
        let nz = self.slice_id.ncols();
        if let Some(&bad) = indices.iter().find(|&&i| i >= nz) {
            return Err(MreError::Alignment(format!(
                "切片索引 {bad} 超出 MRI z 范围 0..{nz}"
            )));
        }
        for &i in indices {
            self.slice_id[(si, i)] = true;
        }
        Ok(())
    }

    /// 受试者的采集切片标记.
    pub fn slice_id(&self, subject: &str) -> MreResult<ArrayView1<'_, bool>> {
        let si = self.subject_index(subject)?;
        Ok(self.slice_id.row(si))
    }

    /// 被标记为采集切片的 MRI z 索引, 升序.
    pub fn marked_slices(&self, subject: &str) -> MreResult<Vec<usize>> {
        Ok(self
            .slice_id(subject)?
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect())
    }

    /// 把受试者的所有数据清零.
    pub fn clear_subject(&mut self, subject: &str) -> MreResult<()> {
        let si = self.subject_index(subject)?;
        for t in Tensor::ALL {
            self.tensor_mut(t)
                .slice_mut(s![si, .., .., .., ..])
                .fill(0);
        }
        self.slice_id.row_mut(si).fill(false);
        Ok(())
    }

    /// 取出 `(subject, label)` 处的一个 `(x, y)` 切片.
    pub fn slice(
        &self,
        tensor: Tensor,
        subject: &str,
        label: &str,
        z: usize,
    ) -> MreResult<ArrayView2<'_, i16>> {
        let v = self.volume(tensor, subject, label)?;
        let nz = v.len_of(Axis(2));
        if z >= nz {
            return Err(MreError::shape_mismatch(&[nz], &[z]));
        }
        Ok(v.index_axis_move(Axis(2), z))
    }

    /// 把一个 `(x, y)` 切片保存为 PNG. 掩膜映射为黑白, 强度按切片极值归一化.
    pub fn save_slice_png<P: AsRef<Path>>(
        &self,
        tensor: Tensor,
        subject: &str,
        label: &str,
        z: usize,
        path: P,
    ) -> MreResult<()> {
        let slice = self.slice(tensor, subject, label, z)?;
        if tensor.is_mask() {
            MaskSlice(slice).save(path)?;
        } else {
            IntensitySlice(slice).save(path)?;
        }
        Ok(())
    }

    /// 以压缩 npz 格式保存到 `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MreResult<()> {
        let mut npz = NpzWriter::new_compressed(File::create(path)?);
        for t in Tensor::ALL {
            npz.add_array(format!("{}.npy", t.name()), self.tensor(t))?;
        }
        npz.add_array("slice_id.npy", &self.slice_id)?;
        let coords = Array1::from(bincode::serialize(&self.coords)?);
        npz.add_array("coords.npy", &coords)?;
        npz.finish()?;
        Ok(())
    }

    /// 从 `path` 打开由 [`save`](Self::save) 保存的仓库.
    pub fn open<P: AsRef<Path>>(path: P) -> MreResult<Self> {
        let mut npz = NpzArchive::open(path)?;
        let raw = npz.by_name::<u8, Ix1>("coords")?;
        let coords: Coords = bincode::deserialize(&raw.to_vec())?;

        let mut read = |t: Tensor| -> MreResult<Array5<i16>> {
            let a = npz.by_name::<i16, Ix5>(t.name())?;
            check_shape(&coords.shape(t), a.shape())?;
            Ok(a)
        };
        let image_mri = read(Tensor::ImageMri)?;
        let mask_mri = read(Tensor::MaskMri)?;
        let image_mre = read(Tensor::ImageMre)?;
        let mask_mre = read(Tensor::MaskMre)?;

        let slice_id = npz.by_name::<bool, Ix2>("slice_id")?;
        check_shape(&[coords.subject.len(), coords.z_mri.len()], slice_id.shape())?;
        Ok(Self {
            coords,
            image_mri,
            mask_mri,
            image_mre,
            mask_mre,
            slice_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn labels(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn store() -> VolumeStore {
        let grid = GridSpec {
            nx: 4,
            ny: 3,
            nz_mri: 5,
            nz_mre: 2,
        };
        VolumeStore::zeros(Coords::new(
            labels(&["01", "02"]),
            labels(&["t1", "t2"]),
            labels(&["liver", "mre"]),
            labels(&["mre", "mre_mask"]),
            &grid,
        ))
    }

    #[test]
    fn test_shapes() {
        let s = store();
        assert_eq!(s.tensor(Tensor::ImageMri).shape(), &[2, 2, 4, 3, 5]);
        assert_eq!(s.tensor(Tensor::MaskMre).shape(), &[2, 2, 4, 3, 2]);
        assert_eq!(s.slice_id("02").unwrap().len(), 5);
    }

    #[test]
    fn test_coords_y_descending() {
        let c = store().coords().clone();
        assert_eq!(c.x, vec![0, 1, 2, 3]);
        assert_eq!(c.y, vec![2, 1, 0]);
        assert_eq!(c.z_mri, vec![0, 1, 2, 3, 4]);
        assert_eq!(c.grid().ny, 3);
    }

    #[test]
    fn test_set_and_get() {
        let mut s = store();
        let v = Array3::from_shape_fn((4, 3, 5), |(x, y, z)| (x + 10 * y + 100 * z) as i16);
        s.set_volume(Tensor::ImageMri, "02", "t2", v.view()).unwrap();
        assert_eq!(s.volume(Tensor::ImageMri, "02", "t2").unwrap(), v.view());
        assert!(s.volume(Tensor::ImageMri, "01", "t2").unwrap().iter().all(|&p| p == 0));

        let bad = Array3::zeros((4, 3, 2));
        assert!(matches!(
            s.set_volume(Tensor::ImageMri, "01", "t1", bad.view()),
            Err(MreError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            s.volume(Tensor::ImageMre, "01", "t1"),
            Err(MreError::UnknownLabel { axis: "mre_type", .. })
        ));
    }

    #[test]
    fn test_mark_and_clear() {
        let mut s = store();
        s.mark_slices("01", &[1, 3]).unwrap();
        assert_eq!(s.marked_slices("01").unwrap(), vec![1, 3]);
        assert!(s.mark_slices("01", &[5]).is_err());

        s.set_volume(Tensor::MaskMre, "01", "mre", Array3::ones((4, 3, 2)).view())
            .unwrap();
        s.clear_subject("01").unwrap();
        assert!(s.marked_slices("01").unwrap().is_empty());
        assert!(s.tensor(Tensor::MaskMre).iter().all(|&p| p == 0));
    }

    #[test]
    fn test_set_slice() {
        let mut s = store();
        let plane = Array2::from_elem((4, 3), 7i16);
        s.set_slice(Tensor::MaskMri, "02", "mre", 3, plane.view()).unwrap();
        let v = s.volume(Tensor::MaskMri, "02", "mre").unwrap();
        assert_eq!(v.iter().filter(|&&p| p == 7).count(), 12);
        assert!(v.slice(s![.., .., 3]).iter().all(|&p| p == 7));
        assert!(s.set_slice(Tensor::MaskMri, "02", "mre", 5, plane.view()).is_err());
    }

    #[test]
    fn test_save_slice_png() {
        let dir = tempfile::tempdir().unwrap();
        let s = store();
        let path = dir.path().join("s.png");
        s.save_slice_png(Tensor::MaskMri, "01", "liver", 4, &path).unwrap();
        assert!(path.exists());
        assert!(s.save_slice_png(Tensor::MaskMri, "01", "liver", 5, &path).is_err());
    }
}
