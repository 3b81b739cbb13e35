//! 运行时错误.

use thiserror::Error;

/// 本 crate 的通用返回类型.
pub type MreResult<T> = Result<T, MreError>;

/// 流水线各阶段可能出现的错误.
#[derive(Error, Debug)]
pub enum MreError {
    /// nifti 文件读取错误.
    #[error("nifti 错误: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 底层 I/O 错误.
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// npz 归档读取错误.
    #[error("npz 读取错误: {0}")]
    ReadNpz(#[from] ndarray_npy::ReadNpzError),

    /// npz 归档写入错误.
    #[error("npz 写入错误: {0}")]
    WriteNpz(#[from] ndarray_npy::WriteNpzError),

    /// bincode 序列化/反序列化错误.
    #[error("序列化错误: {0}")]
    Bincode(#[from] bincode::Error),

    /// 图像编码错误.
    #[error("图像写入错误: {0}")]
    Image(#[from] image::ImageError),

    /// 配置文件解析错误.
    #[error("配置文件解析错误: {0}")]
    Toml(#[from] toml::de::Error),

    /// ndarray 形状转换错误.
    #[error("数组形状错误: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// 配置错误. 在构造阶段立即报告, 不产生任何部分状态.
    #[error("配置错误: {0}")]
    Config(String),

    /// 数组形状与期望不符.
    #[error("形状不匹配: 期望 {expected:?}, 实际 {found:?}")]
    ShapeMismatch {
        /// 期望形状.
        expected: Vec<usize>,
        /// 实际形状.
        found: Vec<usize>,
    },

    /// 分割预测器错误 (不可用或输入不兼容).
    #[error("预测器错误: {0}")]
    Predictor(String),

    /// 外部配准过程错误.
    #[error("配准错误: {0}")]
    Registration(String),

    /// 波图像对齐的输入不合法.
    #[error("对齐错误: {0}")]
    Alignment(String),

    /// 检测到的峰值个数与采集切片个数不一致.
    #[error("受试者 `{subject}` 检测到 {found} 个峰值, 但采集切片有 {expected} 个")]
    PeakCountMismatch {
        /// 受试者.
        subject: String,
        /// 期望个数.
        expected: usize,
        /// 实际个数.
        found: usize,
    },

    /// 坐标轴上不存在该标签.
    #[error("坐标轴 `{axis}` 上不存在标签 `{label}`")]
    UnknownLabel {
        /// 坐标轴名称.
        axis: &'static str,
        /// 标签.
        label: String,
    },
}

impl MreError {
    /// 根据两个形状构造 [`MreError::ShapeMismatch`].
    #[inline]
    pub(crate) fn shape_mismatch(expected: &[usize], found: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
