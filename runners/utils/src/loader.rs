//! 对 `mre_berry::dataset` 与 `mre_berry::config` 的更一层封装.

use mre_berry::config::PipelineConfig;
use mre_berry::MreResult;
use std::env;
use std::path::{Path, PathBuf};

/// 获取受试者数据目录.
///
/// 1. 若环境变量 `$MRE_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/mre`;
/// 3. 无法确定用户主目录时返回 `None`.
pub fn data_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("MRE_DATA_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => mre_berry::dataset::home_dataset_dir_with(["mre"]),
    }
}

/// 读取配置文件. 未给出路径时使用默认配置.
pub fn config_or_default<P: AsRef<Path>>(path: Option<P>) -> MreResult<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::open(p),
        None => Ok(PipelineConfig::default()),
    }
}
