//! 流水线配置.
//!
//! 配置文件为 TOML 格式, 所有字段均可省略.
//!
//! ```toml
//! nx = 128
//! ny = 128
//! sequences = ["t1_pre_water", "t1_pre_in", "t1_pre_out", "t2"]
//! output_name = "cohort_a"
//! strict_alignment = true
//! ```

use crate::resample::GridSpec;
use crate::{MreError, MreResult};
use serde::Deserialize;
use std::path::Path;

fn default_nx() -> usize {
    256
}

fn default_ny() -> usize {
    256
}

fn default_nz_mri() -> usize {
    32
}

fn default_nz_mre() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn default_sequences() -> Vec<String> {
    strings(&["t1_pre_water", "t1_pre_in", "t1_pre_out"])
}

fn default_mask_types() -> Vec<String> {
    strings(&["liver", "mre"])
}

fn default_mre_types() -> Vec<String> {
    strings(&["mre", "mre_mask", "mre_raw", "mre_wave"])
}

fn default_primary_input() -> String {
    "t1_pre_water".into()
}

fn default_liver_input() -> String {
    "t1_pre_out".into()
}

fn default_align_input() -> String {
    "t1_pre_in".into()
}

fn default_stiffness() -> String {
    "mre".into()
}

fn default_confidence() -> String {
    "mre_mask".into()
}

fn default_raw_wave() -> String {
    "mre_raw".into()
}

fn default_liver_mask() -> String {
    "liver".into()
}

fn default_mre_mask() -> String {
    "mre".into()
}

fn default_output_name() -> String {
    "test".into()
}

fn default_locations_file() -> String {
    "mre.bin".into()
}

/// 流水线配置.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// 公共网格 x 方向体素个数.
    #[serde(default = "default_nx")]
    pub nx: usize,

    /// 公共网格 y 方向体素个数.
    #[serde(default = "default_ny")]
    pub ny: usize,

    /// MRI 域 z 方向切片个数.
    #[serde(default = "default_nz_mri")]
    pub nz_mri: usize,

    /// MRE 域 z 方向切片个数.
    #[serde(default = "default_nz_mre")]
    pub nz_mre: usize,

    /// 写入仓库的 MRI 序列.
    #[serde(default = "default_sequences")]
    pub sequences: Vec<String>,

    /// 掩膜类型.
    #[serde(default = "default_mask_types")]
    pub mask_types: Vec<String>,

    /// 弹性成像图像类型.
    #[serde(default = "default_mre_types")]
    pub mre_types: Vec<String>,

    /// 主序列. 其余序列都配准到它的网格上.
    #[serde(default = "default_primary_input")]
    pub primary_input: String,

    /// 肝脏分割的输入序列.
    #[serde(default = "default_liver_input")]
    pub liver_input: String,

    /// 与波图像对齐的序列.
    #[serde(default = "default_align_input")]
    pub align_input: String,

    /// 刚度图像通道.
    #[serde(default = "default_stiffness")]
    pub stiffness_channel: String,

    /// 置信度图像通道.
    #[serde(default = "default_confidence")]
    pub confidence_channel: String,

    /// 原始波图像通道.
    #[serde(default = "default_raw_wave")]
    pub raw_wave_channel: String,

    /// 肝脏掩膜的掩膜类型名.
    #[serde(default = "default_liver_mask")]
    pub liver_mask_type: String,

    /// 弹性成像有效区域掩膜的掩膜类型名.
    #[serde(default = "default_mre_mask")]
    pub mre_mask_type: String,

    /// 输出标签. 仓库保存为数据目录旁的 `xarray_{output_name}.npz`.
    #[serde(default = "default_output_name")]
    pub output_name: String,

    /// 运行结束后是否保存仓库.
    #[serde(default = "default_true")]
    pub write_file: bool,

    /// 受试者目录中记录采集切片 z 位置的文件名.
    #[serde(default = "default_locations_file")]
    pub locations_file: String,

    /// 峰值个数不一致时是否中止该受试者.
    #[serde(default)]
    pub strict_alignment: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            nx: default_nx(),
            ny: default_ny(),
            nz_mri: default_nz_mri(),
            nz_mre: default_nz_mre(),
            sequences: default_sequences(),
            mask_types: default_mask_types(),
            mre_types: default_mre_types(),
            primary_input: default_primary_input(),
            liver_input: default_liver_input(),
            align_input: default_align_input(),
            stiffness_channel: default_stiffness(),
            confidence_channel: default_confidence(),
            raw_wave_channel: default_raw_wave(),
            liver_mask_type: default_liver_mask(),
            mre_mask_type: default_mre_mask(),
            output_name: default_output_name(),
            write_file: true,
            locations_file: default_locations_file(),
            strict_alignment: false,
        }
    }
}

impl PipelineConfig {
    /// 解析 TOML 文本并校验.
    pub fn from_toml(text: &str) -> MreResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 读取 TOML 配置文件并校验.
    pub fn open<P: AsRef<Path>>(path: P) -> MreResult<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// 公共网格规格.
    #[inline]
    pub fn grid(&self) -> GridSpec {
        GridSpec {
            nx: self.nx,
            ny: self.ny,
            nz_mri: self.nz_mri,
            nz_mre: self.nz_mre,
        }
    }

    /// 校验配置的内部一致性.
    pub fn validate(&self) -> MreResult<()> {
        let err = |msg: String| Err(MreError::Config(msg));
        if [self.nx, self.ny, self.nz_mri, self.nz_mre].contains(&0) {
            return err(format!(
                "网格尺寸不能为 0: ({}, {}, {}, {})",
                self.nx, self.ny, self.nz_mri, self.nz_mre
            ));
        }
        for (name, list) in [
            ("sequences", &self.sequences),
            ("mask_types", &self.mask_types),
            ("mre_types", &self.mre_types),
        ] {
            if list.is_empty() {
                return err(format!("`{name}` 不能为空"));
            }
        }
        let need = |list: &Vec<String>, item: &String, field: &str| {
            if list.contains(item) {
                Ok(())
            } else {
                Err(MreError::Config(format!("`{field}` 中缺少 `{item}`")))
            }
        };
        need(&self.sequences, &self.primary_input, "sequences")?;
        need(&self.sequences, &self.liver_input, "sequences")?;
        need(&self.sequences, &self.align_input, "sequences")?;
        need(&self.mask_types, &self.liver_mask_type, "mask_types")?;
        need(&self.mask_types, &self.mre_mask_type, "mask_types")?;
        need(&self.mre_types, &self.stiffness_channel, "mre_types")?;
        need(&self.mre_types, &self.confidence_channel, "mre_types")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = PipelineConfig::from_toml("").unwrap();
        assert_eq!(c, PipelineConfig::default());
        assert_eq!(c.grid().nz_mre, 4);
        assert_eq!(c.mre_types.len(), 4);
        assert!(c.write_file);
        assert!(!c.strict_alignment);
    }

    #[test]
    fn test_override() {
        let c = PipelineConfig::from_toml("nx = 64\nny = 48\noutput_name = \"a\"").unwrap();
        assert_eq!((c.nx, c.ny, c.nz_mri), (64, 48, 32));
        assert_eq!(c.output_name, "a");
    }

    #[test]
    fn test_rejects() {
        assert!(matches!(
            PipelineConfig::from_toml("bogus = 1"),
            Err(MreError::Toml(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml("nz_mre = 0"),
            Err(MreError::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml("mask_types = [\"liver\"]"),
            Err(MreError::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml("sequences = [\"t2\"]"),
            Err(MreError::Config(_))
        ));
    }
}
