//! 通用常量.

/// 单通道掩膜取值.
pub mod gray {
    /// 掩膜背景的体素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// 掩膜前景 (肺野, 血管) 的体素值.
    pub const MASK_FOREGROUND: u8 = 1;

    /// 体素是否是前景?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        p != MASK_BACKGROUND
    }

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        p == MASK_BACKGROUND
    }
}

/// 默认分割参数.
///
/// 这些值来自胸部 CT 的经验调参, 不是普适常数. 实际使用时应通过
/// [`crate::config`] 调整.
pub mod defaults {
    /// 空气/组织二值化阈值 (HU). 一般来说 -450 以下是空气.
    pub const AIR_CUTOFF_HU: f32 = -450.0;

    /// 肺野闭运算球形结构元半径 (体素).
    pub const CLOSING_RADIUS: usize = 4;

    /// 区域生长种子点, 以 `(x, y, z)` 给出, 负数表示从末尾倒数.
    pub const SEEDS: [[isize; 3]; 2] = [[0, 0, 0], [-1, -1, 0]];

    /// 血管窗下限 (HU).
    pub const WINDOW_MIN_HU: f64 = -1350.0;

    /// 血管窗上限 (HU).
    pub const WINDOW_MAX_HU: f64 = 650.0;

    /// ROI 腐蚀核边长.
    pub const EROSION_SIZE: usize = 5;

    /// sigmoid 过渡宽度 (高亮血管灰度范围).
    pub const SIGMOID_ALPHA: f64 = 20.0;

    /// sigmoid 拐点 (高亮血管中心灰度).
    pub const SIGMOID_BETA: f64 = 95.0;

    /// Frangi 滤波尺度.
    pub const FRANGI_SIGMAS: [f64; 4] = [1.0, 2.0, 3.0, 4.0];

    /// Frangi 板状结构敏感度.
    pub const FRANGI_ALPHA: f64 = 0.5;

    /// Frangi 斑状结构敏感度.
    pub const FRANGI_BETA: f64 = 0.5;

    /// Frangi 结构显著度敏感度.
    pub const FRANGI_GAMMA: f64 = 50.0;

    /// 自适应阈值所用的分位数.
    pub const VESSEL_PERCENTILE: f64 = 95.0;

    /// 高斯核截断倍数 (`radius = truncate * sigma`).
    pub const GAUSSIAN_TRUNCATE: f64 = 4.0;
}

/// 批处理输出文件名后缀.
pub mod suffix {
    /// nifti 压缩文件扩展名.
    pub const NII_GZ: &str = ".nii.gz";

    /// 未压缩的 nifti 文件扩展名.
    pub const NII: &str = ".nii";

    /// 肺野掩膜文件后缀.
    pub const LUNG_MASK: &str = "_lung_mask.nii.gz";

    /// 血管掩膜文件后缀.
    pub const VESSEL_MASK: &str = "_vessel_mask.nii.gz";

    /// nnU-Net 风格的单通道后缀.
    pub const CHANNEL_0000: &str = "_0000";
}
