//! 弹性成像有效区域掩膜.
//!
//! 对每个 `(x, y)` 切片独立计算, 切片之间互不影响.

use crate::consts::gray::{is_background, is_foreground, MASK_BACKGROUND, MASK_FOREGROUND};
use crate::consts::{ELAST_BACKGROUND_EPS, ELAST_DIFF_EPS};
use crate::data::check_shape;
use crate::MreResult;
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut2, Axis, Zip};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 以十字形结构元素 (4-邻域加中心) 做一次二值膨胀. 图像外视为 0.
pub fn binary_dilation(mask: ArrayView2<'_, u8>) -> Array2<u8> {
    let (h, w) = mask.dim();
    let mut out = mask.mapv(|p| u8::from(!is_background(p)));
    if h == 0 || w == 0 {
        return out;
    }
    let src = out.clone();

    // 逐方向平移后取并.
    let up = src.slice(s![1.., ..]);
    let down = src.slice(s![..h - 1, ..]);
    let left = src.slice(s![.., 1..]);
    let right = src.slice(s![.., ..w - 1]);
    Zip::from(out.slice_mut(s![..h - 1, ..])).and(&up).for_each(|d, &v| *d |= v);
    Zip::from(out.slice_mut(s![1.., ..])).and(&down).for_each(|d, &v| *d |= v);
    Zip::from(out.slice_mut(s![.., ..w - 1])).and(&left).for_each(|d, &v| *d |= v);
    Zip::from(out.slice_mut(s![.., 1..])).and(&right).for_each(|d, &v| *d |= v);
    out
}

/// 弹性成像掩膜生成器. 无状态.
#[derive(Copy, Clone, Debug, Default)]
pub struct ElastographyMaskGenerator;

impl ElastographyMaskGenerator {
    /// 由单个切片的波 (刚度) 图像与置信度图像计算有效区域, 写入 `out`.
    ///
    /// 1 表示有效组织, 0 表示背景或低置信度区域.
    pub fn generate_slice_into(
        wave: ArrayView2<'_, f32>,
        confidence: ArrayView2<'_, f32>,
        mut out: ArrayViewMut2<'_, u8>,
    ) {
        debug_assert_eq!(wave.dim(), confidence.dim());
        debug_assert_eq!(wave.dim(), out.dim());
        let candidate = Zip::from(&wave)
            .and(&confidence)
            .map_collect(|&w, &c| u8::from(w - c > ELAST_DIFF_EPS));
        let excluded = binary_dilation(candidate.view());
        Zip::from(&mut out)
            .and(&excluded)
            .and(&wave)
            .for_each(|o, &e, &w| {
                let background = w < ELAST_BACKGROUND_EPS;
                *o = if is_foreground(e) || background {
                    MASK_BACKGROUND
                } else {
                    MASK_FOREGROUND
                };
            });
    }

    /// 单个切片版本, 返回新分配的掩膜.
    pub fn generate_slice(
        wave: ArrayView2<'_, f32>,
        confidence: ArrayView2<'_, f32>,
    ) -> Array2<u8> {
        let mut out = Array2::zeros(wave.raw_dim());
        Self::generate_slice_into(wave, confidence, out.view_mut());
        out
    }

    /// 对 `(x, y, z)` 布局的体数据逐切片计算掩膜.
    pub fn generate(
        &self,
        wave: ArrayView3<'_, f32>,
        confidence: ArrayView3<'_, f32>,
    ) -> MreResult<Array3<u8>> {
        check_shape(wave.shape(), confidence.shape())?;
        let mut out = Array3::zeros(wave.raw_dim());
        for (z, slice) in out.axis_iter_mut(Axis(2)).enumerate() {
            Self::generate_slice_into(
                wave.index_axis(Axis(2), z),
                confidence.index_axis(Axis(2), z),
                slice,
            );
        }
        Ok(out)
    }

    /// 借助 `rayon`, 并行地逐切片计算掩膜. 结果与 [`generate`](Self::generate) 相同.
    #[cfg(feature = "rayon")]
    pub fn par_generate(
        &self,
        wave: ArrayView3<'_, f32>,
        confidence: ArrayView3<'_, f32>,
    ) -> MreResult<Array3<u8>> {
        check_shape(wave.shape(), confidence.shape())?;
        let mut out = Array3::zeros(wave.raw_dim());
        out.axis_iter_mut(Axis(2))
            .into_par_iter()
            .enumerate()
            .for_each(|(z, slice)| {
                Self::generate_slice_into(
                    wave.index_axis(Axis(2), z),
                    confidence.index_axis(Axis(2), z),
                    slice,
                );
            });
        Ok(out)
    }
}
