//! 分割参数配置.
//!
//! 所有可调参数都集中在 [`SegmentConfig`] 中, 并在构造分割器时显式传入.
//! 打开 `serde` feature 后可从 toml 文件加载, 缺省字段取默认值:
//!
//! ```toml
//! [lung]
//! air_cutoff = -400.0
//! closing_radius = 3
//!
//! [vessel]
//! erosion = { ellipse2d = 5 }
//!
//! [vessel.frangi]
//! sigmas = [1.0, 2.0]
//! boundary = "reflect"
//! ```

use crate::consts::defaults;
use crate::data::morph_3d::Connectivity;
use crate::error::{SegmentError, SegmentResult};
use crate::CtWindow;
use ndarray::Axis;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde")]
use std::path::Path;

macro_rules! ensure {
    ($cond: expr, $($arg: tt)+) => {
        if !$cond {
            return Err(SegmentError::InvalidConfig(format!($($arg)+)));
        }
    };
}

/// 窗口变换时切片所沿的物理轴.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SliceAxis {
    /// 物理 x 轴 (数组的 W 轴).
    #[default]
    X,

    /// 物理 y 轴 (数组的 H 轴).
    Y,

    /// 物理 z 轴 (数组的 z 轴), 即逐个水平切片.
    Z,
}

impl SliceAxis {
    /// 对应的 `(z, H, W)` 数组轴.
    #[inline]
    pub fn array_axis(&self) -> Axis {
        match self {
            SliceAxis::X => Axis(2),
            SliceAxis::Y => Axis(1),
            SliceAxis::Z => Axis(0),
        }
    }
}

/// ROI 边界腐蚀所用的结构元.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErosionKernel {
    /// 以 `(z, H, W)` 给出边长的 3D 长方体. 数据范围外视为背景.
    Box([usize; 3]),

    /// 逐个水平切片使用 `n x n` 的椭圆结构元. 切片范围外被忽略.
    Ellipse2d(usize),
}

impl Default for ErosionKernel {
    #[inline]
    fn default() -> Self {
        let n = defaults::EROSION_SIZE;
        Self::Box([n, n, n])
    }
}

/// 卷积时数据范围外取值的延拓方式. 对 `[a b c d]` 的左侧延拓:
///
/// | 方式 | 延拓 |
/// |---|---|
/// | `Constant(k)` | `k k k \| a b c d` |
/// | `Nearest` | `a a a \| a b c d` |
/// | `Reflect` | `c b a \| a b c d` |
/// | `Mirror` | `d c b \| a b c d` |
/// | `Wrap` | `b c d \| a b c d` |
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Boundary {
    /// 以常数填充.
    Constant(f64),
    /// 重复边界值.
    Nearest,
    /// 以边界为轴对称, 边界值重复一次.
    Reflect,
    /// 以边界体素中心为轴对称, 边界值不重复.
    Mirror,
    /// 周期延拓.
    Wrap,
}

impl Default for Boundary {
    #[inline]
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

/// 肺野分割参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LungConfig {
    /// 空气/组织二值化阈值 (HU), 不小于该值视为组织.
    pub air_cutoff: f32,

    /// 区域生长种子点, 以 `(x, y, z)` 给出, 负数表示从末尾倒数.
    pub seeds: Vec<[isize; 3]>,

    /// 区域生长的连通规则.
    pub grow_connectivity: Connectivity,

    /// 球形闭运算半径 (体素). 为 0 时跳过闭运算.
    pub closing_radius: usize,

    /// 连通域标记的连通规则.
    pub label_connectivity: Connectivity,
}

impl Default for LungConfig {
    fn default() -> Self {
        Self {
            air_cutoff: defaults::AIR_CUTOFF_HU,
            seeds: defaults::SEEDS.to_vec(),
            grow_connectivity: Connectivity::Face,
            closing_radius: defaults::CLOSING_RADIUS,
            label_connectivity: Connectivity::Vertex,
        }
    }
}

impl LungConfig {
    /// 检查参数合法性.
    pub fn validate(&self) -> SegmentResult<()> {
        ensure!(self.air_cutoff.is_finite(), "air cutoff must be finite, got {}", self.air_cutoff);
        ensure!(!self.seeds.is_empty(), "at least one seed is required");
        Ok(())
    }
}

/// 多尺度 Frangi 血管增强滤波参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FrangiConfig {
    /// 高斯尺度. 最终响应取各尺度最大值.
    pub sigmas: Vec<f64>,

    /// 板状/线状结构区分敏感度.
    pub alpha: f64,

    /// 斑状结构敏感度.
    pub beta: f64,

    /// 结构显著度敏感度. 为 `None` 时取首个尺度下 Hessian 范数最大值的一半.
    pub gamma: Option<f64>,

    /// 为 `true` 时增强暗于背景的管状结构.
    pub black_ridges: bool,

    /// 卷积边界延拓方式.
    pub boundary: Boundary,

    /// 高斯核截断倍数.
    pub truncate: f64,
}

impl Default for FrangiConfig {
    fn default() -> Self {
        Self {
            sigmas: defaults::FRANGI_SIGMAS.to_vec(),
            alpha: defaults::FRANGI_ALPHA,
            beta: defaults::FRANGI_BETA,
            gamma: Some(defaults::FRANGI_GAMMA),
            black_ridges: false,
            boundary: Boundary::default(),
            truncate: defaults::GAUSSIAN_TRUNCATE,
        }
    }
}

impl FrangiConfig {
    /// 检查参数合法性.
    pub fn validate(&self) -> SegmentResult<()> {
        ensure!(!self.sigmas.is_empty(), "at least one frangi sigma is required");
        ensure!(
            self.sigmas.iter().all(|s| s.is_finite() && *s > 0.0),
            "frangi sigmas must be positive, got {:?}",
            self.sigmas
        );
        ensure!(
            self.alpha.is_finite() && self.alpha > 0.0 && self.beta.is_finite() && self.beta > 0.0,
            "frangi alpha/beta must be positive, got {}/{}",
            self.alpha,
            self.beta
        );
        if let Some(g) = self.gamma {
            ensure!(g.is_finite() && g > 0.0, "frangi gamma must be positive, got {g}");
        }
        ensure!(
            self.truncate.is_finite() && self.truncate > 0.0,
            "gaussian truncate must be positive, got {}",
            self.truncate
        );
        if let Boundary::Constant(c) = self.boundary {
            ensure!(c.is_finite(), "constant boundary value must be finite, got {c}");
        }
        Ok(())
    }
}

/// 肺血管分割参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VesselConfig {
    /// 血管窗下限 (HU).
    pub window_min: f64,

    /// 血管窗上限 (HU).
    pub window_max: f64,

    /// 窗口变换逐切片拉伸所沿的轴.
    pub slice_axis: SliceAxis,

    /// 肺野掩膜腐蚀结构元.
    pub erosion: ErosionKernel,

    /// sigmoid 过渡宽度.
    pub sigmoid_alpha: f64,

    /// sigmoid 拐点.
    pub sigmoid_beta: f64,

    /// Frangi 滤波参数.
    pub frangi: FrangiConfig,

    /// 自适应阈值分位数, 位于 \[0, 100\].
    pub percentile: f64,
}

impl Default for VesselConfig {
    fn default() -> Self {
        Self {
            window_min: defaults::WINDOW_MIN_HU,
            window_max: defaults::WINDOW_MAX_HU,
            slice_axis: SliceAxis::default(),
            erosion: ErosionKernel::default(),
            sigmoid_alpha: defaults::SIGMOID_ALPHA,
            sigmoid_beta: defaults::SIGMOID_BETA,
            frangi: FrangiConfig::default(),
            percentile: defaults::VESSEL_PERCENTILE,
        }
    }
}

impl VesselConfig {
    /// 由 `window_min` 和 `window_max` 构成的 CT 窗.
    pub fn window(&self) -> SegmentResult<CtWindow> {
        CtWindow::from_bounds(self.window_min, self.window_max).ok_or_else(|| {
            SegmentError::InvalidConfig(format!(
                "window bounds must be finite and increasing, got [{}, {}]",
                self.window_min, self.window_max
            ))
        })
    }

    /// 检查参数合法性.
    pub fn validate(&self) -> SegmentResult<()> {
        self.window()?;
        match self.erosion {
            ErosionKernel::Box(size) => {
                ensure!(size.iter().all(|s| *s >= 1), "empty box kernel {size:?}")
            }
            ErosionKernel::Ellipse2d(n) => ensure!(n >= 1, "empty ellipse kernel"),
        }
        ensure!(
            self.sigmoid_alpha.is_finite() && self.sigmoid_alpha != 0.0,
            "sigmoid alpha must be finite and non-zero, got {}",
            self.sigmoid_alpha
        );
        ensure!(
            self.sigmoid_beta.is_finite(),
            "sigmoid beta must be finite, got {}",
            self.sigmoid_beta
        );
        ensure!(
            (0.0..=100.0).contains(&self.percentile),
            "percentile must lie in [0, 100], got {}",
            self.percentile
        );
        self.frangi.validate()
    }
}

/// 全部分割参数.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SegmentConfig {
    /// 肺野分割参数.
    pub lung: LungConfig,

    /// 肺血管分割参数.
    pub vessel: VesselConfig,
}

impl SegmentConfig {
    /// 检查参数合法性.
    pub fn validate(&self) -> SegmentResult<()> {
        self.lung.validate()?;
        self.vessel.validate()
    }

    /// 从 toml 字符串解析配置并检查合法性.
    #[cfg(feature = "serde")]
    pub fn from_toml_str(s: &str) -> SegmentResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 toml 文件加载配置并检查合法性.
    #[cfg(feature = "serde")]
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> SegmentResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SegmentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lung.seeds, vec![[0, 0, 0], [-1, -1, 0]]);
        assert_eq!(config.lung.grow_connectivity, Connectivity::Face);
        assert_eq!(config.vessel.erosion, ErosionKernel::Box([5, 5, 5]));
        assert_eq!(config.vessel.slice_axis.array_axis(), Axis(2));
        assert_eq!(config.vessel.frangi.gamma, Some(50.0));
    }

    #[test]
    fn test_reject_nonsense() {
        let mut config = SegmentConfig::default();
        config.vessel.window_min = 700.0;
        assert!(matches!(config.validate(), Err(SegmentError::InvalidConfig(_))));

        let mut config = SegmentConfig::default();
        config.vessel.frangi.sigmas = vec![1.0, -2.0];
        assert!(config.validate().is_err());

        let mut config = SegmentConfig::default();
        config.vessel.percentile = 100.5;
        assert!(config.validate().is_err());

        let mut config = SegmentConfig::default();
        config.lung.seeds.clear();
        assert!(config.validate().is_err());

        let mut config = SegmentConfig::default();
        config.vessel.erosion = ErosionKernel::Box([5, 0, 5]);
        assert!(config.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_toml_partial_override() {
        let config = SegmentConfig::from_toml_str(
            r#"
            [lung]
            air_cutoff = -400.0
            label_connectivity = "edge"

            [vessel]
            slice_axis = "z"
            erosion = { ellipse2d = 3 }

            [vessel.frangi]
            sigmas = [1.5]
            boundary = { constant = -1.0 }
            "#,
        )
        .unwrap();
        assert_eq!(config.lung.air_cutoff, -400.0);
        assert_eq!(config.lung.label_connectivity, Connectivity::Edge);
        assert_eq!(config.lung.closing_radius, defaults::CLOSING_RADIUS);
        assert_eq!(config.vessel.slice_axis, SliceAxis::Z);
        assert_eq!(config.vessel.erosion, ErosionKernel::Ellipse2d(3));
        assert_eq!(config.vessel.frangi.sigmas, vec![1.5]);
        assert_eq!(config.vessel.frangi.boundary, Boundary::Constant(-1.0));
        assert_eq!(config.vessel.percentile, defaults::VESSEL_PERCENTILE);

        let bad = SegmentConfig::from_toml_str("[vessel]\npercentile = 120.0\n");
        assert!(matches!(bad, Err(SegmentError::InvalidConfig(_))));
        let garbage = SegmentConfig::from_toml_str("[lung\n");
        assert!(matches!(garbage, Err(SegmentError::Toml(_))));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segment.toml");
        std::fs::write(&path, "[vessel.frangi]\nboundary = \"mirror\"\n").unwrap();
        let config = SegmentConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.vessel.frangi.boundary, Boundary::Mirror);
        assert!(SegmentConfig::from_toml_file(dir.path().join("missing.toml")).is_err());
    }
}
