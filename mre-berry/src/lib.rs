#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 将 MRI 与 MR 弹性成像 (MRE) 体数据对齐到公共体素网格,
//! 合成肝脏掩膜与弹性成像有效区域掩膜, 并组装为多维带标签数组仓库.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 内存中的体数据统一按 `(z, H, W)` 布局存储; 仓库中的张量按 `(x, y, z)` 布局存储.
//!   两者之间的转换见 [`Volume::to_xyz`] 与 [`Volume::from_xyz`].
//! 2. 物理几何信息采用 LPS 约定, 从 nii 文件读取时会自动转换.
//! 3. 配准与分割网络属于外部协作者, 分别通过 [`register::Registration`] 与
//!   [`mask::Predictor`] 注入.
//!
//! # 模块
//!
//! ### 重采样 ✅
//!
//! 按图像角色选择插值方式 (掩膜用最近邻, 强度用线性), 把单个体数据缩放或重设间距到目标网格.
//!
//! 实现位于 `mre-berry/src/resample`.
//!
//! ### 配准接口 ✅
//!
//! 配准协作者 trait, 纯几何实现与轴向平移搜索实现, 以及配准后的强度范围恢复.
//!
//! 实现位于 `mre-berry/src/register.rs`.
//!
//! ### 掩膜合成 ✅
//!
//! 1. 肝脏掩膜: 截断, 标准化, 预测器推理, sigmoid, 二值化. ✅
//! 2. 弹性成像有效区域掩膜: 差分门限, 一次二值膨胀, 背景并集, 取反. ✅
//!
//! 实现位于 `mre-berry/src/mask`.
//!
//! ### 波图像切片定位 ✅
//!
//! 按记录的 z 位置展开采集切片, 与解剖 z 栈配准, 由逐切片标准差的峰值确定 MRI 切片索引.
//! 诊断信息可保存为柱状图.
//!
//! 实现位于 `mre-berry/src/align`.
//!
//! ### 数组仓库与流水线 ✅
//!
//! 实现位于 `mre-berry/src/store.rs` 与 `mre-berry/src/pipeline`.
//!
//! ### 训练数据 ✅
//!
//! 受试者划分, 二维样本展开, 损失度量.
//!
//! 实现位于 `mre-berry/src/dataset` 与 `mre-berry/src/metrics.rs`.

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 3D nii 文件基础数据结构.
pub mod data;

mod error;
mod npz;

pub mod align;
pub mod config;
pub mod consts;
pub mod dataset;
pub mod mask;
pub mod metrics;
pub mod pipeline;
pub mod prelude;
pub mod register;
pub mod resample;
pub mod store;

pub use data::save::{ImgWriteVis, IntensitySlice, MaskSlice};
pub use data::{Geometry, Volume};
pub use error::{MreError, MreResult};
pub use npz::NpzArchive;
