//! 通用常量.

/// 单通道二值掩膜取值与颜色.
pub mod gray {
    /// 掩膜中, 背景 (或被排除区域) 的体素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// 掩膜中, 前景 (肝脏或有效组织) 的体素值.
    pub const MASK_FOREGROUND: u8 = 1;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道灰色.
    pub const GRAY: u8 = 0b_1000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 体素是否是前景?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        matches!(p, MASK_FOREGROUND)
    }

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, MASK_BACKGROUND)
    }
}

/// 肝脏分割前的强度截断上限. 高于此值的体素被截断为此值.
pub const LIVER_CLIP_UPPER: f32 = 1500.0;

/// 肝脏分割 sigmoid 输出的二值化门限. 大于该值视为肝脏.
pub const LIVER_PROB_THRESHOLD: f32 = 0.1;

/// 弹性成像掩膜: `wave - confidence` 超过该值即视为候选排除区域.
pub const ELAST_DIFF_EPS: f32 = 1e-7;

/// 弹性成像掩膜: 波图像低于该值即视为背景.
pub const ELAST_BACKGROUND_EPS: f32 = 1e-8;

/// 波图像对齐: 前导填充切片数占固定体 z 深度的比例.
pub const WAVE_PAD_LEADING: f64 = 0.6;

/// 波图像对齐: 尾随填充切片数占固定体 z 深度的比例.
pub const WAVE_PAD_TRAILING: f64 = 0.4;

/// 波图像对齐: 固定体掩膜沿 z 方向 (关, 开, 关) 三段的比例.
pub const FIXED_MASK_SPLIT: [f64; 3] = [0.3, 0.6, 0.1];

/// 切片样本中, 输入序列的截断上限.
pub const SAMPLE_INPUT_CLIP: f32 = 750.0;

/// 切片样本中, 弹性 (刚度) 目标的截断上限.
pub const SAMPLE_TARGET_CLIP: f32 = 9000.0;

/// 数据集划分时验证集的受试者个数.
pub const VAL_SUBJECTS: usize = 3;
