//! 切片的可视化持久化存储.
//!
//! 切片按仓库布局 `(x, y)` 给出, 保存时 x 对应图像宽度, y 对应图像高度.

use crate::consts::gray::{BLACK, WHITE};
use image::{GrayImage, ImageResult, Luma};
use itertools::Itertools;
use ndarray::ArrayView2;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的切片.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将切片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 掩膜切片. 0 保存为黑色, 其余保存为白色.
#[derive(Copy, Clone, Debug)]
pub struct MaskSlice<'a>(pub ArrayView2<'a, i16>);

/// 强度切片. 按切片自身的最小/最大值线性映射到 `[0, 255]`.
#[derive(Copy, Clone, Debug)]
pub struct IntensitySlice<'a>(pub ArrayView2<'a, i16>);

#[inline]
fn pretty(label: i16) -> u8 {
    if label == 0 {
        BLACK
    } else {
        WHITE
    }
}

fn write_gray<P, F>(slice: ArrayView2<'_, i16>, path: P, f: F) -> ImageResult<()>
where
    P: AsRef<Path>,
    F: Fn(i16) -> u8,
{
    let (width, height) = slice.dim();
    let mut buf = GrayImage::new(width as u32, height as u32);
    for ((x, y), &pix) in slice.indexed_iter() {
        buf.put_pixel(x as u32, y as u32, Luma([f(pix)]));
    }
    buf.save(path)
}

impl ImgWriteVis for MaskSlice<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        write_gray(self.0, path, pretty)
    }
}

impl ImgWriteVis for IntensitySlice<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (lo, hi) = self.0.iter().copied().minmax().into_option().unwrap_or((0, 0));
        let (lo, width) = (lo as f32, (i32::from(hi) - i32::from(lo)) as f32);
        write_gray(self.0, path, |v| {
            if width <= 0.0 {
                BLACK
            } else {
                ((v as f32 - lo) / width * WHITE as f32).round() as u8
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mask_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let m = array![[0i16, 1, 0], [1, 0, 1]];
        MaskSlice(m.view()).save(&path).unwrap();

        let img = image::open(&path).unwrap().into_luma8();
        assert_eq!(img.dimensions(), (2, 3));
        assert_eq!(img.get_pixel(0, 0).0[0], BLACK);
        assert_eq!(img.get_pixel(0, 1).0[0], WHITE);
        assert_eq!(img.get_pixel(1, 0).0[0], WHITE);
    }

    #[test]
    fn test_intensity_png_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        let m = array![[-100i16], [100]];
        IntensitySlice(m.view()).save(&path).unwrap();

        let img = image::open(&path).unwrap().into_luma8();
        assert_eq!(img.get_pixel(0, 0).0[0], BLACK);
        assert_eq!(img.get_pixel(1, 0).0[0], WHITE);
    }
}
