//! 掩膜生成.
//!
//! 两种掩膜都以仓库布局 `(x, y, z)` 输出, 取值仅为
//! [`MASK_BACKGROUND`](crate::consts::gray::MASK_BACKGROUND) 与
//! [`MASK_FOREGROUND`](crate::consts::gray::MASK_FOREGROUND).

pub mod elast;
pub mod liver;

pub use elast::ElastographyMaskGenerator;
pub use liver::{Conv3dPredictor, LiverMaskGenerator, Predictor};
