//! 单个受试者的输入文件.

use crate::data::Volume;
use crate::MreResult;
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 通道文件可能的扩展名, 按优先级排列.
const EXTENSIONS: [&str; 2] = ["nii", "nii.gz"];

/// 在受试者目录中查找通道 `channel` 对应的文件.
pub fn channel_path(dir: &Path, channel: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{channel}.{ext}")))
        .find(|p| p.is_file())
}

/// 一个受试者目录中已加载的图像通道.
///
/// 不存在的通道不会出现在其中, 也不算错误.
#[derive(Debug)]
pub struct SubjectImages {
    subject: String,
    dir: PathBuf,
    images: HashMap<String, Volume<f32>>,
}

impl SubjectImages {
    /// 从 `data_dir/subject` 加载 `channels` 中存在的通道.
    pub fn open<'a, I>(data_dir: &Path, subject: &str, channels: I) -> MreResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let dir = data_dir.join(subject);
        let mut images = HashMap::new();
        for ch in channels {
            if images.contains_key(ch) {
                continue;
            }
            if let Some(path) = channel_path(&dir, ch) {
                debug!("受试者 `{subject}`: 读取 {}", path.display());
                images.insert(ch.to_owned(), Volume::open(&path)?);
            }
        }
        Ok(Self {
            subject: subject.to_owned(),
            dir,
            images,
        })
    }

    /// 受试者标识.
    #[inline]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// 受试者目录.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 获取通道.
    #[inline]
    pub fn get(&self, channel: &str) -> Option<&Volume<f32>> {
        self.images.get(channel)
    }

    /// 是否加载了该通道?
    #[inline]
    pub fn contains(&self, channel: &str) -> bool {
        self.images.contains_key(channel)
    }

    /// 已加载通道个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// 是否一个通道都没有?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// `required` 中缺失的项. `extra_files` 为受试者目录中必须存在的其他文件.
    pub fn missing(&self, required: &[&str], extra_files: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|ch| !self.contains(ch))
            .map(|ch| ch.to_string())
            .chain(
                extra_files
                    .iter()
                    .filter(|f| !self.dir.join(f).is_file())
                    .map(|f| f.to_string()),
            )
            .collect()
    }
}
