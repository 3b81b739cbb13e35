//! 数据集操作.

use crate::MreResult;
use std::path::{Path, PathBuf};

pub mod slices;
pub mod split;

pub use slices::{SampleOptions, SliceSample, SliceSamples};
pub use split::{split_subjects, SetType};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P, I>(it: I) -> Option<PathBuf>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = P>,
{
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 数据目录下的受试者, 即所有子目录名, 按字典序排列.
pub fn discover_subjects<P: AsRef<Path>>(data_dir: P) -> MreResult<Vec<String>> {
    let mut subjects = vec![];
    for entry in std::fs::read_dir(data_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            subjects.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    subjects.sort_unstable();
    Ok(subjects)
}
