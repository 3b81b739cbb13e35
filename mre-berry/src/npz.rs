//! npz 归档的读取.

use crate::MreResult;
use ndarray::{Array, Dimension};
use ndarray_npy::{NpzReader, ReadableElement};
use std::fs::File;
use std::path::Path;

/// 已打开的 npz 文件归档.
///
/// 同一个数组既可能以 `name.npy` 保存 (numpy 的习惯), 也可能以 `name`
/// 保存. 按名称读取时两种都接受, 优先 `name.npy`.
pub struct NpzArchive {
    reader: NpzReader<File>,
    names: Vec<String>,
}

impl NpzArchive {
    /// 打开位于路径 `p` 的 npz 文件.
    pub fn open<P: AsRef<Path>>(p: P) -> MreResult<Self> {
        let file = File::open(p.as_ref())?;
        let mut reader = NpzReader::new(file)?;
        let names = reader.names()?;
        Ok(Self { reader, names })
    }

    /// 归档内的数组名称 (去掉 `.npy` 后缀).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .map(|n| n.strip_suffix(".npy").unwrap_or(n.as_str()))
    }

    /// 是否包含名为 `name` 的数组?
    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    /// 按名称读取数组.
    pub fn by_name<A, D>(&mut self, name: &str) -> MreResult<Array<A, D>>
    where
        A: ReadableElement,
        D: Dimension,
    {
        let dotted = format!("{name}.npy");
        let key = if self.names.iter().any(|n| *n == dotted) {
            dotted.as_str()
        } else {
            name
        };
        Ok(self.reader.by_name(key)?)
    }
}
