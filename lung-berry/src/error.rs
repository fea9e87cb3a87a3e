//! 运行时错误.

use crate::Idx3d;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// 分割流水线的阶段.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Stage {
    /// 肺野分割.
    Lung,

    /// 肺血管分割.
    Vessel,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Lung => f.write_str("lung field"),
            Stage::Vessel => f.write_str("vessel"),
        }
    }
}

/// 分割及其周边 I/O 的运行时错误.
///
/// 算法类错误对相同输入是确定性的, 因此调用方不应重试.
/// 批处理时, 单个文件的错误只影响该文件.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// CT 扫描与掩膜形状不一致. 两个分量均为 `(z, h, w)`.
    #[error("volume shape {volume:?} does not match mask shape {mask:?}")]
    InputShapeMismatch {
        /// CT 扫描形状.
        volume: Idx3d,
        /// 掩膜形状.
        mask: Idx3d,
    },

    /// 候选集为空: 肺野阶段闭运算后没有任何连通域, 或血管阶段没有正响应体素.
    #[error("no candidate region found in {stage} stage")]
    EmptyCandidateSet {
        /// 出错阶段.
        stage: Stage,
    },

    /// 自适应阈值退化 (>= 1), 无法做 `(r - t) / (1 - t)` 的归一化.
    #[error("adaptive vesselness threshold degenerated to {threshold}")]
    DegenerateThreshold {
        /// 计算得到的分位数阈值.
        threshold: f64,
    },

    /// 找不到 CT 扫描对应的肺野掩膜文件.
    #[error("lung mask for `{}` not found, tried {tried:?}", volume.display())]
    MissingCompanionFile {
        /// CT 扫描路径.
        volume: PathBuf,
        /// 依次尝试过的掩膜路径.
        tried: Vec<PathBuf>,
    },

    /// 区域生长种子点越界. 种子以 `(x, y, z)` 给出, 形状以 `(z, h, w)` 给出.
    #[error("seed {seed:?} lies outside volume of shape {shape:?}")]
    InvalidSeed {
        /// 原始种子点.
        seed: [isize; 3],
        /// 体数据形状.
        shape: Idx3d,
    },

    /// 配置参数不合法.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// 空间元信息不合法 (分辨率非正, 方向矩阵非正交等).
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// nifti 读写错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// 数组形状错误.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// 其他底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// toml 配置文件解析错误.
    #[cfg(feature = "serde")]
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl SegmentError {
    /// 是否是 "候选集为空" 类错误.
    #[inline]
    pub fn is_empty_candidate(&self) -> bool {
        matches!(self, Self::EmptyCandidateSet { .. })
    }
}

/// 分割结果.
pub type SegmentResult<T> = Result<T, SegmentError>;
