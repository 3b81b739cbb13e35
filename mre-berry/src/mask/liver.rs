//! 基于外部分割预测器的肝脏掩膜.

use crate::consts::gray::{MASK_BACKGROUND, MASK_FOREGROUND};
use crate::consts::{LIVER_CLIP_UPPER, LIVER_PROB_THRESHOLD};
use crate::npz::NpzArchive;
use crate::{MreError, MreResult};
use log::debug;
use ndarray::{s, Array3, Array5, ArrayView3, ArrayView5, Axis, Ix3, IxDyn};
use std::path::Path;

/// 体数据分割预测器.
///
/// 输入形状为 `(1, 1, Z, Y, X)`, 输出形状与输入相同, 为未经 sigmoid 的原始 logits.
pub trait Predictor {
    /// 对一个标准化后的体数据做前向推理.
    fn predict(&self, input: ArrayView5<'_, f32>) -> MreResult<Array5<f32>>;
}

impl<F> Predictor for F
where
    F: Fn(ArrayView5<'_, f32>) -> Array5<f32>,
{
    #[inline]
    fn predict(&self, input: ArrayView5<'_, f32>) -> MreResult<Array5<f32>> {
        Ok(self(input))
    }
}

/// 单通道 3D 卷积预测器. 奇数尺寸卷积核, 零填充, 输出与输入同形.
#[derive(Debug, Clone)]
pub struct Conv3dPredictor {
    kernel: Array3<f32>,
    bias: f32,
}

impl Conv3dPredictor {
    /// 由 `(kz, ky, kx)` 卷积核与偏置构造. 卷积核每一维都必须是奇数.
    pub fn new(kernel: Array3<f32>, bias: f32) -> MreResult<Self> {
        let (kz, ky, kx) = kernel.dim();
        if [kz, ky, kx].iter().any(|&k| k % 2 == 0) {
            return Err(MreError::Predictor(format!(
                "卷积核尺寸必须为奇数, 实际为 {:?}",
                (kz, ky, kx)
            )));
        }
        Ok(Self { kernel, bias })
    }

    /// 从权重文件加载. 文件为 npz 归档, 包含 `kernel` (3D) 与 `bias` (标量或长度为 1).
    pub fn open<P: AsRef<Path>>(path: P) -> MreResult<Self> {
        let mut npz = NpzArchive::open(path.as_ref()).map_err(|e| {
            MreError::Predictor(format!("无法加载权重 {}: {e}", path.as_ref().display()))
        })?;
        let kernel = npz.by_name::<f32, Ix3>("kernel")?;
        let bias = npz.by_name::<f32, IxDyn>("bias")?;
        let bias = match bias.len() {
            1 => bias.iter().copied().next().unwrap_or(0.0),
            n => {
                return Err(MreError::Predictor(format!(
                    "偏置应只有 1 个元素, 实际为 {n} 个"
                )))
            }
        };
        Self::new(kernel, bias)
    }

    fn convolve(&self, input: ArrayView3<'_, f32>) -> Array3<f32> {
        let (nz, ny, nx) = input.dim();
        let (kz, ky, kx) = self.kernel.dim();
        let (rz, ry, rx) = ((kz / 2) as isize, (ky / 2) as isize, (kx / 2) as isize);
        Array3::from_shape_fn((nz, ny, nx), |(z, y, x)| {
            let mut acc = self.bias;
            for ((dz, dy, dx), &w) in self.kernel.indexed_iter() {
                let iz = z as isize + dz as isize - rz;
                let iy = y as isize + dy as isize - ry;
                let ix = x as isize + dx as isize - rx;
                if iz < 0 || iy < 0 || ix < 0 {
                    continue;
                }
                if let Some(&v) = input.get((iz as usize, iy as usize, ix as usize)) {
                    acc += w * v;
                }
            }
            acc
        })
    }
}

impl Predictor for Conv3dPredictor {
    fn predict(&self, input: ArrayView5<'_, f32>) -> MreResult<Array5<f32>> {
        let (n, c, ..) = input.dim();
        if n != 1 || c != 1 {
            return Err(MreError::Predictor(format!(
                "只支持 1 个样本 1 个通道, 实际为 ({n}, {c})"
            )));
        }
        let out = self.convolve(input.slice(s![0, 0, .., .., ..]));
        Ok(out.insert_axis(Axis(0)).insert_axis(Axis(0)))
    }
}

/// 截断并标准化. 高于 1500 的体素截断为 1500, 再以有限体素的均值与总体标准差标准化,
/// 所得非有限值置 0.
pub fn standardize(volume: ArrayView3<'_, f32>) -> Array3<f32> {
    let clipped = volume.mapv(|v| if v >= LIVER_CLIP_UPPER { LIVER_CLIP_UPPER } else { v });
    let (n, sum) = clipped
        .iter()
        .filter(|v| v.is_finite())
        .fold((0usize, 0f64), |(n, s), &v| (n + 1, s + v as f64));
    if n == 0 {
        return Array3::zeros(clipped.raw_dim());
    }
    let mean = sum / n as f64;
    let var = clipped
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n as f64;
    let std = var.sqrt();
    clipped.mapv(|v| {
        let z = ((v as f64 - mean) / std) as f32;
        if z.is_finite() {
            z
        } else {
            0.0
        }
    })
}

#[inline]
fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// 肝脏掩膜生成器. 预测器在构造时注入.
pub struct LiverMaskGenerator {
    predictor: Box<dyn Predictor>,
}

impl LiverMaskGenerator {
    /// 以给定预测器构造.
    pub fn new(predictor: Box<dyn Predictor>) -> Self {
        Self { predictor }
    }

    /// 由 `(z, y, x)` 布局的强度体数据生成 `(x, y, z)` 布局的二值肝脏掩膜.
    pub fn generate(&self, volume: ArrayView3<'_, f32>) -> MreResult<Array3<u8>> {
        let input = standardize(volume).insert_axis(Axis(0)).insert_axis(Axis(0));
        let logits = self.predictor.predict(input.view())?;
        if logits.shape() != input.shape() {
            return Err(MreError::Predictor(format!(
                "输出形状 {:?} 与输入形状 {:?} 不一致",
                logits.shape(),
                input.shape()
            )));
        }

        let mask = logits.slice(s![0, 0, .., .., ..]).mapv(|v| {
            if sigmoid(v) > LIVER_PROB_THRESHOLD {
                MASK_FOREGROUND
            } else {
                MASK_BACKGROUND
            }
        });
        debug!(
            "肝脏掩膜: {} / {} 个前景体素",
            mask.iter().filter(|&&p| p == MASK_FOREGROUND).count(),
            mask.len()
        );

        // (z, y, x) -> (x, y, z).
        Ok(mask.permuted_axes([2, 1, 0]).as_standard_layout().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array0, Array3};
    use ndarray_npy::NpzWriter;

    fn scalar(v: f32) -> Array0<f32> {
        Array0::from_elem((), v)
    }

    #[test]
    fn test_standardize() {
        let v = Array3::from_shape_vec((1, 1, 4), vec![0.0, 2.0, f32::NAN, 5000.0]).unwrap();
        let s = standardize(v.view());
        // 5000 被截断为 1500, NaN 变为 0.
        assert_eq!(s[(0, 0, 2)], 0.0);
        assert!(s[(0, 0, 0)] < s[(0, 0, 1)]);
        assert!(s[(0, 0, 1)] < s[(0, 0, 3)]);
        let finite: f32 = [0, 1, 3].iter().map(|&i| s[(0, 0, i)]).sum();
        assert!(finite.abs() < 1e-5);
    }

    #[test]
    fn test_constant_volume_is_binary() {
        let gen = LiverMaskGenerator::new(Box::new(|x: ArrayView5<f32>| x.to_owned()));
        let m = gen.generate(Array3::from_elem((3, 4, 5), 42.0).view()).unwrap();
        assert_eq!(m.dim(), (5, 4, 3));
        // 标准化后全为 0, sigmoid(0) = 0.5 > 0.1.
        assert!(m.iter().all(|&p| p == MASK_FOREGROUND));
    }

    #[test]
    fn test_output_is_transposed() {
        let gen = LiverMaskGenerator::new(Box::new(|x: ArrayView5<f32>| x.mapv(|v| v * 100.0)));
        let mut v = Array3::from_elem((2, 3, 4), -10.0f32);
        v[(1, 2, 0)] = 10.0;
        let m = gen.generate(v.view()).unwrap();
        assert_eq!(m.dim(), (4, 3, 2));
        assert_eq!(m[(0, 2, 1)], MASK_FOREGROUND);
        assert_eq!(m.iter().filter(|&&p| p == MASK_FOREGROUND).count(), 1);
    }

    #[test]
    fn test_bad_predictor_shape() {
        let gen = LiverMaskGenerator::new(Box::new(|_: ArrayView5<f32>| {
            Array5::zeros((1, 1, 1, 1, 1))
        }));
        let r = gen.generate(Array3::zeros((2, 2, 2)).view());
        assert!(matches!(r, Err(MreError::Predictor(_))));
    }

    #[test]
    fn test_conv3d_identity_kernel() {
        let mut k = Array3::zeros((3, 3, 3));
        k[(1, 1, 1)] = 2.0;
        let p = Conv3dPredictor::new(k, 1.0).unwrap();
        let x = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z + y + x) as f32)
            .insert_axis(Axis(0))
            .insert_axis(Axis(0));
        let y = p.predict(x.view()).unwrap();
        assert_eq!(y, x.mapv(|v| 2.0 * v + 1.0));
        assert!(Conv3dPredictor::new(Array3::zeros((2, 3, 3)), 0.0).is_err());
    }

    #[test]
    fn test_conv3d_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.npz");
        let mut npz = NpzWriter::new(std::fs::File::create(&path).unwrap());
        npz.add_array("kernel.npy", &Array3::<f32>::ones((1, 1, 1))).unwrap();
        npz.add_array("bias", &scalar(0.5)).unwrap();
        npz.finish().unwrap();

        let p = Conv3dPredictor::open(&path).unwrap();
        let x = Array5::<f32>::ones((1, 1, 2, 2, 2));
        assert!(p.predict(x.view()).unwrap().iter().all(|&v| v == 1.5));
        assert!(Conv3dPredictor::open(dir.path().join("missing.npz")).is_err());
    }
}
