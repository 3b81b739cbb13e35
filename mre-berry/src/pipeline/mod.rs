//! 受试者队列到多维数组仓库的流水线.
//!
//! 每个受试者依次经过:
//!
//! 1. 序列配准与缩放, 写入 `image_mri`;
//! 2. 主序列缩放, 写入 `image_mri`;
//! 3. 肝脏分割, 写入 `mask_mri[liver]`;
//! 4. 弹性成像图像重设间距, 写入 `image_mre`;
//! 5. 波图像切片定位;
//! 6. 弹性成像有效区域掩膜, 写入 `mask_mre[mre]`;
//! 7. 定位一致时, 标记 `slice_id` 并在两个 z 域之间复制掩膜.
//!
//! 各阶段的中间结果以返回值传递给下一阶段, 不保存在流水线对象中.

mod subject;

pub use subject::{channel_path, SubjectImages};

use crate::align::{read_locations, AlignmentReport, WaveSliceAligner};
use crate::config::PipelineConfig;
use crate::data::Volume;
use crate::dataset::discover_subjects;
use crate::mask::{ElastographyMaskGenerator, LiverMaskGenerator, Predictor};
use crate::register::{rescale_intensity, Registration, RegistrationProfile};
use crate::resample::{saturating_cast, ImageResampler, ImageRole};
use crate::store::{Coords, Tensor, VolumeStore};
use crate::{MreError, MreResult};
use log::{error, info, warn};
use ndarray::{Array3, Axis};
use std::path::{Path, PathBuf};

/// 仓库来源: 从数据目录构建, 或直接打开已保存的仓库.
#[derive(Debug, Clone)]
pub enum XrSource {
    /// 从数据目录按配置构建.
    Build {
        /// 数据目录. 每个子目录是一个受试者.
        data_dir: PathBuf,
        /// 配置.
        config: PipelineConfig,
    },

    /// 打开已保存的仓库, 不运行流水线.
    FromFile(PathBuf),
}

impl XrSource {
    /// 由可选参数确定来源. `from_file` 优先; 否则必须同时给出数据目录与配置.
    pub fn from_options(
        data_dir: Option<PathBuf>,
        config: Option<PipelineConfig>,
        from_file: Option<PathBuf>,
    ) -> MreResult<Self> {
        match (data_dir, config, from_file) {
            (_, _, Some(path)) => Ok(Self::FromFile(path)),
            (Some(data_dir), Some(config), None) => {
                config.validate()?;
                Ok(Self::Build { data_dir, config })
            }
            _ => Err(MreError::Config(
                "必须给出 (数据目录与配置) 或 (已保存的仓库文件)".into(),
            )),
        }
    }
}

/// 单个受试者的处理结果.
#[derive(Debug, Clone, PartialEq)]
pub enum SubjectStatus {
    /// 已处理. 附带切片定位诊断.
    Processed(AlignmentReport),

    /// 缺少必需的数据, 已跳过. 附带缺失项.
    Skipped(Vec<String>),

    /// 处理失败, 该受试者的数据已清零. 附带错误信息.
    Failed(String),
}

/// 一次运行的汇总.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// 按处理顺序排列的 (受试者, 结果).
    pub subjects: Vec<(String, SubjectStatus)>,

    /// 仓库保存路径. 未保存时为 `None`.
    pub output: Option<PathBuf>,
}

impl RunSummary {
    /// 所有已处理受试者的诊断.
    pub fn reports(&self) -> impl Iterator<Item = &AlignmentReport> {
        self.subjects.iter().filter_map(|(_, s)| match s {
            SubjectStatus::Processed(r) => Some(r),
            _ => None,
        })
    }

    /// 结果为 `pred` 的受试者个数.
    pub fn count<F: Fn(&SubjectStatus) -> bool>(&self, pred: F) -> usize {
        self.subjects.iter().filter(|(_, s)| pred(s)).count()
    }
}

/// 序列阶段的输出: 缩放到公共网格的对齐输入序列, 以及主序列的新间距.
struct SequenceStage {
    align_volume: Volume<f32>,
    primary_spacing: (f64, f64),
}

/// 把 `(z, y, x)` 体数据转换为仓库的 `(x, y, z)` 整数体数据.
fn to_store(volume: &Volume<f32>) -> Array3<i16> {
    volume.to_xyz().mapv(|v| saturating_cast::<i16>(v as f64))
}

/// 把掩膜转换为仓库的整数体数据. 掩膜已是 `(x, y, z)` 布局.
fn mask_to_store(mask: &Array3<u8>) -> Array3<i16> {
    mask.mapv(i16::from)
}

/// MRI/MRE 体数据到多维数组仓库的流水线.
pub struct MreToXr {
    data_dir: PathBuf,
    config: PipelineConfig,
    resampler: ImageResampler,
    liver: LiverMaskGenerator,
    registration: Box<dyn Registration>,
    store: VolumeStore,
}

impl MreToXr {
    /// 以数据目录下的所有子目录为受试者构造.
    pub fn new(
        data_dir: PathBuf,
        config: PipelineConfig,
        predictor: Box<dyn Predictor>,
        registration: Box<dyn Registration>,
    ) -> MreResult<Self> {
        let subjects = discover_subjects(&data_dir)?;
        Self::with_subjects(data_dir, config, subjects, predictor, registration)
    }

    /// 以给定受试者列表构造.
    pub fn with_subjects(
        data_dir: PathBuf,
        config: PipelineConfig,
        subjects: Vec<String>,
        predictor: Box<dyn Predictor>,
        registration: Box<dyn Registration>,
    ) -> MreResult<Self> {
        config.validate()?;
        let grid = config.grid();
        let coords = Coords::new(
            subjects,
            config.sequences.clone(),
            config.mask_types.clone(),
            config.mre_types.clone(),
            &grid,
        );
        Ok(Self {
            data_dir,
            resampler: ImageResampler::new(grid),
            liver: LiverMaskGenerator::new(predictor),
            registration,
            store: VolumeStore::zeros(coords),
            config,
        })
    }

    /// 受试者列表.
    #[inline]
    pub fn subjects(&self) -> &[String] {
        &self.store.coords().subject
    }

    /// 当前仓库.
    #[inline]
    pub fn store(&self) -> &VolumeStore {
        &self.store
    }

    /// 取出仓库.
    #[inline]
    pub fn into_store(self) -> VolumeStore {
        self.store
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 仓库保存路径: 数据目录旁的 `xarray_{output_name}.npz`.
    pub fn output_path(&self) -> PathBuf {
        let parent = self.data_dir.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!("xarray_{}.npz", self.config.output_name))
    }

    /// 依次处理所有受试者. 单个受试者失败只影响它自己.
    pub fn run(&mut self) -> MreResult<RunSummary> {
        let mut summary = RunSummary::default();
        let subjects = self.subjects().to_vec();
        for (i, subject) in subjects.iter().enumerate() {
            info!("[{}/{}] 受试者 `{subject}`", i + 1, subjects.len());
            let status = match self.process_subject(subject) {
                Ok(status) => status,
                Err(e) => {
                    error!("受试者 `{subject}` 处理失败: {e}");
                    self.store.clear_subject(subject)?;
                    SubjectStatus::Failed(e.to_string())
                }
            };
            summary.subjects.push((subject.clone(), status));
        }

        if self.config.write_file {
            let path = self.output_path();
            info!("写入仓库 {}", path.display());
            self.store.save(&path)?;
            summary.output = Some(path);
        }
        Ok(summary)
    }

    /// 处理单个受试者.
    pub fn process_subject(&mut self, subject: &str) -> MreResult<SubjectStatus> {
        let cfg = &self.config;
        let channels = cfg
            .sequences
            .iter()
            .chain(cfg.mre_types.iter())
            .chain(std::iter::once(&cfg.raw_wave_channel))
            .map(String::as_str)
            .collect::<Vec<_>>();
        let images = SubjectImages::open(&self.data_dir, subject, channels)?;

        let missing = images.missing(
            &[
                cfg.primary_input.as_str(),
                cfg.align_input.as_str(),
                cfg.liver_input.as_str(),
                cfg.stiffness_channel.as_str(),
                cfg.confidence_channel.as_str(),
                cfg.raw_wave_channel.as_str(),
            ],
            &[cfg.locations_file.as_str()],
        );
        if !missing.is_empty() {
            warn!("受试者 `{subject}` 缺少 {missing:?}, 跳过");
            return Ok(SubjectStatus::Skipped(missing));
        }

        let stage = self.sequence_stage(&images)?;
        self.liver_stage(subject)?;
        self.mre_stage(&images, stage.primary_spacing)?;

        let locations = read_locations(images.dir().join(&self.config.locations_file))?;
        let moving = images
            .get(&self.config.raw_wave_channel)
            .ok_or_else(|| MreError::Alignment("缺少原始波图像".into()))?;
        let report = WaveSliceAligner.align(
            &stage.align_volume,
            moving,
            &locations,
            subject,
            self.registration.as_ref(),
        )?;

        self.elast_stage(subject)?;
        self.link_stage(subject, &report)?;
        Ok(SubjectStatus::Processed(report))
    }

    /// 把除主序列以外的序列配准到主序列并缩放, 然后缩放主序列本身.
    fn sequence_stage(&mut self, images: &SubjectImages) -> MreResult<SequenceStage> {
        let subject = images.subject();
        let cfg = &self.config;
        let primary = images
            .get(&cfg.primary_input)
            .ok_or_else(|| MreError::Config(format!("缺少主序列 `{}`", cfg.primary_input)))?;

        let mut align_volume = None;
        for seq in &cfg.sequences {
            if *seq == cfg.primary_input {
                continue;
            }
            let Some(moving) = images.get(seq) else {
                continue;
            };
            let (lo, hi) = moving.min_max().unwrap_or((0.0, 0.0));
            let registered = self.registration.register(
                primary,
                moving,
                RegistrationProfile::MriSequence,
                None,
                None,
            )?;
            let registered = rescale_intensity(&registered, lo, hi);
            let resized = self.resampler.resize(&registered, ImageRole::MriIntensity)?;
            self.store
                .set_volume(Tensor::ImageMri, subject, seq, to_store(&resized).view())?;
            if *seq == cfg.align_input {
                align_volume = Some(resized);
            }
        }

        let resized = self.resampler.resize(primary, ImageRole::MriIntensity)?;
        self.store.set_volume(
            Tensor::ImageMri,
            subject,
            &cfg.primary_input,
            to_store(&resized).view(),
        )?;
        let spacing = resized.geometry().spacing();
        let primary_spacing = (spacing.x, spacing.y);
        if cfg.align_input == cfg.primary_input {
            align_volume = Some(resized);
        }

        let align_volume = align_volume
            .ok_or_else(|| MreError::Alignment(format!("缺少对齐序列 `{}`", cfg.align_input)))?;
        Ok(SequenceStage {
            align_volume,
            primary_spacing,
        })
    }

    /// 由仓库中的肝脏分割输入序列生成肝脏掩膜.
    fn liver_stage(&mut self, subject: &str) -> MreResult<()> {
        let cfg = &self.config;
        let input = self
            .store
            .volume(Tensor::ImageMri, subject, &cfg.liver_input)?
            .mapv(f32::from);
        // (x, y, z) -> (z, y, x).
        let mask = self.liver.generate(input.view().reversed_axes())?;
        self.store.set_volume(
            Tensor::MaskMri,
            subject,
            &cfg.liver_mask_type,
            mask_to_store(&mask).view(),
        )
    }

    /// 把弹性成像图像按主序列的面内间距重设间距.
    fn mre_stage(&mut self, images: &SubjectImages, spacing: (f64, f64)) -> MreResult<()> {
        let subject = images.subject();
        for mre_type in &self.config.mre_types {
            let Some(image) = images.get(mre_type) else {
                continue;
            };
            let respaced = self
                .resampler
                .respace(image, ImageRole::MreIntensity, spacing.0, spacing.1)?;
            self.store.set_volume(
                Tensor::ImageMre,
                subject,
                mre_type,
                to_store(&respaced).view(),
            )?;
        }
        Ok(())
    }

    /// 由仓库中的刚度图像与置信度图像生成有效区域掩膜.
    fn elast_stage(&mut self, subject: &str) -> MreResult<()> {
        let cfg = &self.config;
        let wave = self
            .store
            .volume(Tensor::ImageMre, subject, &cfg.stiffness_channel)?
            .mapv(f32::from);
        let conf = self
            .store
            .volume(Tensor::ImageMre, subject, &cfg.confidence_channel)?
            .mapv(f32::from);
        let mask = ElastographyMaskGenerator.generate(wave.view(), conf.view())?;
        self.store.set_volume(
            Tensor::MaskMre,
            subject,
            &cfg.mre_mask_type,
            mask_to_store(&mask).view(),
        )
    }

    /// 按切片定位结果标记 `slice_id`, 并在两个 z 域之间复制掩膜.
    fn link_stage(&mut self, subject: &str, report: &AlignmentReport) -> MreResult<()> {
        let cfg = &self.config;
        if !report.is_consistent() || report.peaks.len() != cfg.nz_mre {
            if cfg.strict_alignment {
                return Err(MreError::PeakCountMismatch {
                    subject: subject.to_owned(),
                    expected: cfg.nz_mre,
                    found: report.peaks.len(),
                });
            }
            warn!(
                "受试者 `{subject}`: 切片定位不可靠 (峰值 {:?}), 不标记 slice_id",
                report.peaks
            );
            return Ok(());
        }

        let peaks = &report.peaks;
        self.store.mark_slices(subject, peaks)?;

        let liver = self
            .store
            .volume(Tensor::MaskMri, subject, &cfg.liver_mask_type)?
            .select(Axis(2), peaks);
        self.store
            .set_volume(Tensor::MaskMre, subject, &cfg.liver_mask_type, liver.view())?;

        let mre = self
            .store
            .volume(Tensor::MaskMre, subject, &cfg.mre_mask_type)?
            .to_owned();
        for (k, &z) in peaks.iter().enumerate() {
            self.store.set_slice(
                Tensor::MaskMri,
                subject,
                &cfg.mre_mask_type,
                z,
                mre.index_axis(Axis(2), k),
            )?;
        }
        Ok(())
    }
}

/// 以只读方式打开已保存的仓库, 不运行流水线.
pub fn open_store<P: AsRef<Path>>(path: P) -> MreResult<VolumeStore> {
    VolumeStore::open(path)
}
