//! 训练/验证/测试划分.

use crate::consts::VAL_SUBJECTS;
use crate::{MreError, MreResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt;
use std::str::FromStr;

/// 数据集划分类别.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SetType {
    /// 训练集.
    Train,
    /// 验证集.
    Val,
    /// 测试集.
    Test,
}

impl FromStr for SetType {
    type Err = MreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "val" => Ok(Self::Val),
            "test" => Ok(Self::Test),
            other => Err(MreError::Config(format!(
                "划分类别必须是 train, val 或 test 之一, 实际为 `{other}`"
            ))),
        }
    }
}

impl fmt::Display for SetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        })
    }
}

/// 从 `subjects` 中选出类别为 `set` 的受试者.
///
/// 测试集即 `test` 本身 (每一项都必须在 `subjects` 中). 其余受试者以 `seed`
/// 打乱, 前 3 个为验证集, 剩下的为训练集.
pub fn split_subjects(
    subjects: &[String],
    test: &[String],
    set: SetType,
    seed: u64,
) -> MreResult<Vec<String>> {
    if let Some(t) = test.iter().find(|t| !subjects.contains(t)) {
        return Err(MreError::UnknownLabel {
            axis: "subject",
            label: t.clone(),
        });
    }
    if set == SetType::Test {
        return Ok(test.to_vec());
    }

    let mut rest: Vec<String> = subjects
        .iter()
        .filter(|s| !test.contains(s))
        .cloned()
        .collect();
    rest.shuffle(&mut StdRng::seed_from_u64(seed));
    let cut = VAL_SUBJECTS.min(rest.len());
    Ok(match set {
        SetType::Val => rest[..cut].to_vec(),
        _ => rest[cut..].to_vec(),
    })
}
