//! 弹性成像波图像切片定位.
//!
//! 采集到的少量波图像切片按其记录的物理 z 位置展开成一个稀疏的 z 栈,
//! 与解剖 z 栈配准后, 用逐切片标准差的峰值确定每个采集切片对应的 MRI 切片.

mod peaks;
mod plot;

pub use peaks::{find_peaks, mean};

use crate::consts::gray::MASK_FOREGROUND;
use crate::consts::{FIXED_MASK_SPLIT, WAVE_PAD_LEADING, WAVE_PAD_TRAILING};
use crate::data::{Geometry, Volume};
use crate::register::{Registration, RegistrationProfile};
use crate::{MreError, MreResult};
use log::{debug, warn};
use ndarray::{s, Array3, ArrayView3, Axis};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// 一个受试者的对齐诊断结果.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentReport {
    /// 受试者标识.
    pub subject: String,

    /// 配准后 moving 图像每个 z 切片的标准差.
    pub signal: Vec<f64>,

    /// 检测到的峰值, 即采集切片所在的 MRI z 索引.
    pub peaks: Vec<usize>,

    /// 期望的峰值个数 (采集切片个数).
    pub expected: usize,
}

impl AlignmentReport {
    /// 峰值个数是否与采集切片个数一致?
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.peaks.len() == self.expected
    }

    /// 峰值个数不一致时返回 [`MreError::PeakCountMismatch`].
    pub fn ensure_consistent(&self) -> MreResult<()> {
        if self.is_consistent() {
            Ok(())
        } else {
            Err(MreError::PeakCountMismatch {
                subject: self.subject.clone(),
                expected: self.expected,
                found: self.peaks.len(),
            })
        }
    }
}

/// 读取记录采集切片物理 z 位置的文件 (bincode 编码的 `Vec<f64>`).
pub fn read_locations<P: AsRef<Path>>(path: P) -> MreResult<Vec<f64>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}

/// 写出采集切片物理 z 位置.
pub fn write_locations<P: AsRef<Path>>(path: P, locations: &[f64]) -> MreResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, locations)?;
    Ok(())
}

/// 相邻采集切片之间需要插入的空切片个数.
///
/// 以固定体 z 间距为单位向零取整, 负值记为 0.
pub fn slice_gaps(locations: &[f64], z_spacing: f64) -> Vec<usize> {
    debug_assert!(z_spacing > 0.0);
    locations
        .windows(2)
        .map(|w| ((w[1] - w[0]) / z_spacing).trunc().max(0.0) as usize)
        .collect()
}

/// 展开后的稀疏波图像 z 栈.
#[derive(Debug, Clone)]
pub struct PaddedWave {
    /// 展开后的体数据, z 间距与固定体一致.
    pub volume: Volume<f32>,

    /// 与 `volume` 同形, 仅在采集切片位置为 1.
    pub validity: Volume<u8>,

    /// 采集切片在展开 z 栈中的位置.
    pub positions: Vec<usize>,
}

/// 按 `gaps` 展开 `moving` 的 z 切片, 并在首尾补零.
///
/// 首部补 `trunc(0.6 * fixed_nz)` 个空切片, 尾部补 `trunc(0.4 * fixed_nz)` 个.
pub fn pad_wave(
    moving: &Volume<f32>,
    gaps: &[usize],
    fixed_nz: usize,
    fixed_z_spacing: f64,
) -> MreResult<PaddedWave> {
    let k = moving.len_z();
    if k == 0 || gaps.len() + 1 != k {
        return Err(MreError::Alignment(format!(
            "{k} 个采集切片需要 {} 个间隔, 实际为 {} 个",
            k.saturating_sub(1),
            gaps.len()
        )));
    }

    let leading = (WAVE_PAD_LEADING * fixed_nz as f64) as usize;
    let trailing = (WAVE_PAD_TRAILING * fixed_nz as f64) as usize;
    let mut positions = Vec::with_capacity(k);
    let mut z = leading;
    for i in 0..k {
        positions.push(z);
        z += 1 + gaps.get(i).copied().unwrap_or(0);
    }
    let depth = z + trailing;

    let (_, h, w) = moving.shape();
    let mut data = Array3::zeros((depth, h, w));
    let mut validity = Array3::zeros((depth, h, w));
    for (i, &p) in positions.iter().enumerate() {
        data.index_axis_mut(Axis(0), p).assign(&moving.slice_at(i));
        validity.index_axis_mut(Axis(0), p).fill(MASK_FOREGROUND);
    }

    let src = moving.geometry();
    let mut spacing = *src.spacing();
    spacing.z = fixed_z_spacing;
    let geometry = Geometry::new(*src.origin(), spacing, *src.direction())?;
    Ok(PaddedWave {
        volume: Volume::new(data, geometry.clone()),
        validity: Volume::new(validity, geometry),
        positions,
    })
}

/// 固定体掩膜: 沿 z 方向依次为 30% 关, 60% 开, 10% 关 (各段长度向零取整, 余下的切片为关).
pub fn fixed_mask(fixed: &Volume<f32>) -> Volume<u8> {
    let (nz, h, w) = fixed.shape();
    let off = (FIXED_MASK_SPLIT[0] * nz as f64) as usize;
    let on = (FIXED_MASK_SPLIT[1] * nz as f64) as usize;
    let mut data = Array3::zeros((nz, h, w));
    data.slice_mut(s![off..(off + on).min(nz), .., ..])
        .fill(MASK_FOREGROUND);
    Volume::new(data, fixed.geometry().clone())
}

/// 每个 z 切片的 (总体) 标准差.
pub fn slice_std(volume: ArrayView3<'_, f32>) -> Vec<f64> {
    volume
        .axis_iter(Axis(0))
        .map(|slice| {
            let n = slice.len();
            if n == 0 {
                return 0.0;
            }
            let m = slice.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
            let var = slice.iter().map(|&v| (v as f64 - m).powi(2)).sum::<f64>() / n as f64;
            var.sqrt()
        })
        .collect()
}

/// 波图像切片定位器. 无状态.
#[derive(Copy, Clone, Debug, Default)]
pub struct WaveSliceAligner;

impl WaveSliceAligner {
    /// 在 `fixed` 的 z 栈中定位 `moving` 的各个采集切片.
    ///
    /// `locations` 为各采集切片记录的物理 z 位置, 个数必须等于 `moving` 的切片数.
    /// 两个体数据的 z 中心都被平移到物理 z = 0 后, 以 [`RegistrationProfile::MreMatch`]
    /// 配准; 展开 z 栈的有效区域作为 moving 掩膜传给配准过程.
    /// 返回的报告中 `peaks` 即为 MRI z 索引.
    pub fn align(
        &self,
        fixed: &Volume<f32>,
        moving: &Volume<f32>,
        locations: &[f64],
        subject: &str,
        registration: &dyn Registration,
    ) -> MreResult<AlignmentReport> {
        let k = moving.len_z();
        if locations.len() != k {
            return Err(MreError::Alignment(format!(
                "受试者 `{subject}` 记录了 {} 个切片位置, 但采集了 {k} 个切片",
                locations.len()
            )));
        }
        let z_spacing = fixed.geometry().spacing().z;
        let gaps = slice_gaps(locations, z_spacing);
        let padded = pad_wave(moving, &gaps, fixed.len_z(), z_spacing)?;
        debug!(
            "受试者 `{subject}`: 间隔 {gaps:?}, 展开后 {} 个切片",
            padded.volume.len_z()
        );

        let mut fixed = fixed.clone();
        let fixed_size = fixed.size_xyz();
        fixed.geometry_mut().recenter_z(fixed_size);
        let fixed_mask = fixed_mask(&fixed);

        // 切片数奇偶不同时, 居中后 moving 切片落在 fixed 两个切片之间, 需对齐到整数索引.
        let mut moving = padded.volume;
        let moving_size = moving.size_xyz();
        moving.geometry_mut().recenter_z(moving_size);
        moving.geometry_mut().snap_z_to(fixed.geometry());
        let validity = Volume::new(padded.validity.into_data(), moving.geometry().clone());

        let registered = registration.register(
            &fixed,
            &moving,
            RegistrationProfile::MreMatch,
            Some(&fixed_mask),
            Some(&validity),
        )?;

        let signal = slice_std(registered.data());
        let peaks = find_peaks(&signal, mean(&signal));
        let report = AlignmentReport {
            subject: subject.to_owned(),
            signal,
            peaks,
            expected: k,
        };
        if !report.is_consistent() {
            warn!(
                "受试者 `{subject}`: 检测到 {} 个峰值 {:?}, 期望 {k} 个",
                report.peaks.len(),
                report.peaks
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{AxialShiftRegistration, GeometricRegistration};

    fn geo(z: f64) -> Geometry {
        Geometry::from_spacing([1.0, 1.0, z])
    }

    #[test]
    fn test_slice_gaps() {
        assert_eq!(slice_gaps(&[0.0, 10.0, 19.9, 15.0], 5.0), vec![2, 1, 0]);
        assert!(slice_gaps(&[3.0], 1.0).is_empty());
    }

    #[test]
    fn test_pad_wave_layout() {
        let moving = Volume::new(Array3::from_elem((3, 2, 2), 1.0f32), geo(7.0));
        let p = pad_wave(&moving, &[2, 0], 10, 2.5).unwrap();
        // 6 个前导, 切片, 2 空, 切片, 切片, 4 个尾随.
        assert_eq!(p.positions, vec![6, 9, 10]);
        assert_eq!(p.volume.len_z(), 15);
        assert_eq!(p.volume.geometry().spacing().z, 2.5);
        let on: Vec<usize> = p
            .validity
            .slice_iter()
            .enumerate()
            .filter(|(_, s)| s.iter().all(|&v| v == MASK_FOREGROUND))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(on, p.positions);
        assert!(pad_wave(&moving, &[1], 10, 1.0).is_err());
    }

    #[test]
    fn test_fixed_mask_split() {
        let fixed = Volume::new(Array3::zeros((32, 1, 1)), geo(1.0));
        let m = fixed_mask(&fixed);
        let on: Vec<u8> = m.data().iter().copied().collect();
        // 9 关, 19 开, 其余关.
        assert_eq!(on.iter().position(|&v| v == 1), Some(9));
        assert_eq!(on.iter().filter(|&&v| v == 1).count(), 19);
        assert_eq!(on.len(), 32);
    }

    #[test]
    fn test_slice_std() {
        let mut v = Array3::zeros((2, 1, 2));
        v[(1, 0, 0)] = 2.0f32;
        assert_eq!(slice_std(v.view()), vec![0.0, 1.0]);
    }

    #[test]
    fn test_locations_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mre.bin");
        write_locations(&path, &[1.5, -3.0]).unwrap();
        assert_eq!(read_locations(&path).unwrap(), vec![1.5, -3.0]);
    }

    #[test]
    fn test_align_finds_acquired_slices() {
        // 固定体 30 个切片; 展开后 18 + 1 + 4 + 1 + 4 + 1 + 4 + 1 + 12 = 46 个切片,
        // 两者中心相差 8 个切片.
        let fixed = Volume::new(Array3::from_elem((30, 8, 8), 1.0f32), geo(2.0));
        let moving = Volume::new(
            Array3::from_shape_fn((4, 8, 8), |(_, h, w)| ((h * 8 + w) % 5) as f32),
            geo(8.0),
        );
        let locations = [0.0, 8.0, 16.0, 24.0];
        let report = WaveSliceAligner
            .align(&fixed, &moving, &locations, "01", &GeometricRegistration)
            .unwrap();
        assert_eq!(report.signal.len(), 30);
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.peaks, vec![10, 15, 20, 25]);
        assert!(report.ensure_consistent().is_ok());

        let wrong = WaveSliceAligner.align(&fixed, &moving, &[0.0], "01", &GeometricRegistration);
        assert!(matches!(wrong, Err(MreError::Alignment(_))));
    }

    /// 固定体 32 个切片, 每个切片的图案互不相同; 波图像取其中第 9, 14, 19, 24 个切片.
    fn anatomy(scaled: bool) -> (Volume<f32>, Volume<f32>) {
        let pattern = |z: usize, h: usize, w: usize| ((h * 7 + w * 3 + z * 5) % 17) as f32 + 1.0;
        let fixed = Array3::from_shape_fn((32, 8, 8), |(z, h, w)| {
            let gain = if scaled { 1.0 + z as f32 / 8.0 } else { 1.0 };
            pattern(z, h, w) * gain
        });
        let acquired = [9, 14, 19, 24];
        let moving = Array3::from_shape_fn((4, 8, 8), |(k, h, w)| pattern(acquired[k], h, w));
        (Volume::new(fixed, geo(2.0)), Volume::new(moving, geo(8.0)))
    }

    #[test]
    fn test_align_odd_padded_depth_lands_on_whole_slices() {
        // 展开后 19 + 1 + 4 + 1 + 4 + 1 + 4 + 1 + 12 = 47 个切片, 与 32 奇偶不同.
        let (fixed, moving) = anatomy(false);
        let report = WaveSliceAligner
            .align(&fixed, &moving, &[0.0, 8.0, 16.0, 24.0], "01", &GeometricRegistration)
            .unwrap();
        assert_eq!(report.peaks, vec![11, 16, 21, 26]);
        let zero = report.signal.iter().filter(|&&v| v == 0.0).count();
        assert_eq!(zero, 28);
    }

    #[test]
    fn test_align_axial_shift_matches_anatomy() {
        for scaled in [false, true] {
            let (fixed, moving) = anatomy(scaled);
            let report = WaveSliceAligner
                .align(&fixed, &moving, &[0.0, 8.0, 16.0, 24.0], "01", &AxialShiftRegistration)
                .unwrap();
            assert_eq!(report.peaks, vec![9, 14, 19, 24], "scaled = {scaled}");
            assert!(report.is_consistent());
        }
    }

    #[test]
    fn test_mismatch_error() {
        let r = AlignmentReport {
            subject: "07".into(),
            signal: vec![0.0; 3],
            peaks: vec![1],
            expected: 4,
        };
        assert!(matches!(
            r.ensure_consistent(),
            Err(MreError::PeakCountMismatch { expected: 4, found: 1, .. })
        ));
    }
}
