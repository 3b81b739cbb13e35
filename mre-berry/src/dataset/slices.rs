//! 从仓库中展开二维训练样本.
//!
//! 每个样本对应一个 `(受试者, z_mre)` 对: 输入为对应 MRI 切片上的若干序列,
//! 目标为刚度图像, 掩膜为有效区域掩膜. 所有二维数组均为 `(y, x)` 布局.

use crate::consts::{SAMPLE_INPUT_CLIP, SAMPLE_TARGET_CLIP};
use crate::store::{Tensor, VolumeStore};
use crate::MreResult;
use log::warn;
use ndarray::{s, Array2, Array3, Axis};

/// 样本展开选项.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOptions {
    /// 输入序列.
    pub sequences: Vec<String>,

    /// 目标弹性成像图像类型.
    pub target: String,

    /// 掩膜类型.
    pub mask: String,

    /// 是否截断: 输入不超过 750, 目标不超过 9000.
    pub clip: bool,

    /// 是否把每个样本的输入标准化为零均值单位标准差.
    pub standardize: bool,
}

/// 一个二维样本.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceSample {
    /// `{subject}_{z_mre}`.
    pub name: String,

    /// `(sequence, y, x)`.
    pub input: Array3<f32>,

    /// `(y, x)`.
    pub target: Array2<f32>,

    /// `(y, x)`.
    pub mask: Array2<f32>,
}

/// 二维样本集合.
#[derive(Debug, Clone, Default)]
pub struct SliceSamples {
    samples: Vec<SliceSample>,
}

impl SliceSamples {
    /// 从 `store` 中展开 `subjects` 的样本.
    ///
    /// 只有 `slice_id` 恰好标记了 `z_mre` 个切片的受试者才能建立两个 z 域的对应,
    /// 其余受试者被跳过.
    pub fn from_store(
        store: &VolumeStore,
        subjects: &[String],
        options: &SampleOptions,
    ) -> MreResult<Self> {
        let nz_mre = store.grid().nz_mre;
        let mut samples = vec![];
        for subject in subjects {
            let marked = store.marked_slices(subject)?;
            if marked.len() != nz_mre {
                warn!(
                    "受试者 `{subject}` 标记了 {} 个切片, 需要 {nz_mre} 个, 跳过",
                    marked.len()
                );
                continue;
            }
            let inputs = options
                .sequences
                .iter()
                .map(|seq| store.volume(Tensor::ImageMri, subject, seq))
                .collect::<MreResult<Vec<_>>>()?;
            let elast = store.volume(Tensor::ImageMre, subject, &options.target)?;
            let mask = store.volume(Tensor::MaskMre, subject, &options.mask)?;

            for (k, &z) in marked.iter().enumerate() {
                let (nx, ny, _) = elast.dim();
                let mut input = Array3::zeros((inputs.len(), ny, nx));
                for (c, v) in inputs.iter().enumerate() {
                    // (x, y) -> (y, x).
                    input
                        .index_axis_mut(Axis(0), c)
                        .assign(&v.slice(s![.., .., z]).t().mapv(f32::from));
                }
                let mut target = elast.slice(s![.., .., k]).t().mapv(f32::from);
                if options.clip {
                    input.mapv_inplace(|v| v.min(SAMPLE_INPUT_CLIP));
                    target.mapv_inplace(|v| v.min(SAMPLE_TARGET_CLIP));
                }
                if options.standardize {
                    standardize_inplace(&mut input);
                }
                samples.push(SliceSample {
                    name: format!("{subject}_{k}"),
                    input,
                    target,
                    mask: mask.slice(s![.., .., k]).t().mapv(f32::from),
                });
            }
        }
        Ok(Self { samples })
    }

    /// 样本个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 第 `index` 个样本.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&SliceSample> {
        self.samples.get(index)
    }

    /// 样本迭代器.
    pub fn iter(&self) -> std::slice::Iter<'_, SliceSample> {
        self.samples.iter()
    }
}

/// 以样本均值与无偏标准差标准化. 结果中的非有限值置 0.
fn standardize_inplace(input: &mut Array3<f32>) {
    let n = input.len() as f64;
    let mean = input.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = input.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    input.mapv_inplace(|v| {
        let z = ((v as f64 - mean) / std) as f32;
        if z.is_finite() {
            z
        } else {
            0.0
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resample::GridSpec;
    use crate::store::Coords;

    fn store() -> VolumeStore {
        let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        let grid = GridSpec {
            nx: 3,
            ny: 2,
            nz_mri: 6,
            nz_mre: 2,
        };
        let mut store = VolumeStore::zeros(Coords::new(
            s(&["a", "b"]),
            s(&["t1", "t2"]),
            s(&["liver", "mre"]),
            s(&["mre"]),
            &grid,
        ));
        let t1 = Array3::from_shape_fn((3, 2, 6), |(x, y, z)| (100 * z + 10 * y + x) as i16);
        store.set_volume(Tensor::ImageMri, "a", "t1", t1.view()).unwrap();
        let elast = Array3::from_shape_fn((3, 2, 2), |(_, _, z)| 5000 + 5000 * z as i16);
        store.set_volume(Tensor::ImageMre, "a", "mre", elast.view()).unwrap();
        store.mark_slices("a", &[1, 4]).unwrap();
        store
    }

    fn options(clip: bool) -> SampleOptions {
        SampleOptions {
            sequences: vec!["t1".into(), "t2".into()],
            target: "mre".into(),
            mask: "mre".into(),
            clip,
            standardize: false,
        }
    }

    #[test]
    fn test_pairs_marked_slices() {
        let subjects = vec!["a".to_string(), "b".to_string()];
        let samples = SliceSamples::from_store(&store(), &subjects, &options(false)).unwrap();
        // "b" 没有标记切片, 被跳过.
        assert_eq!(samples.len(), 2);
        let second = samples.get(1).unwrap();
        assert_eq!(second.name, "a_1");
        assert_eq!(second.input.dim(), (2, 2, 3));
        // 输入取自 z_mri = 4, (y, x) = (1, 2).
        assert_eq!(second.input[(0, 1, 2)], 412.0);
        assert_eq!(second.target[(0, 0)], 10000.0);
    }

    #[test]
    fn test_clip() {
        let subjects = vec!["a".to_string()];
        let samples = SliceSamples::from_store(&store(), &subjects, &options(true)).unwrap();
        assert!(samples.iter().all(|s| s.target.iter().all(|&v| v <= 9000.0)));
        assert!(samples.iter().all(|s| s.input.iter().all(|&v| v <= 750.0)));
    }

    #[test]
    fn test_standardize() {
        let mut x = Array3::from_shape_vec((1, 1, 3), vec![1.0f32, 2.0, 3.0]).unwrap();
        standardize_inplace(&mut x);
        assert_eq!(x.into_raw_vec(), vec![-1.0, 0.0, 1.0]);

        let mut flat = Array3::from_elem((1, 2, 2), 4.0f32);
        standardize_inplace(&mut flat);
        assert!(flat.iter().all(|&v| v == 0.0));
    }
}
