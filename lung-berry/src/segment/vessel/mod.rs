//! 肺血管分割.
//!
//! 流程: 窗口变换 -> 腐蚀肺野掩膜得到 ROI -> sigmoid 非线性映射 ->
//! 多尺度 Frangi 增强 -> min-max 归一化 -> 分位数自适应阈值.

use std::path::{Path, PathBuf};

use itertools::izip;
use ndarray::{Array3, ArrayView2, ArrayView3, ArrayViewMut2, Axis};
use ordered_float::NotNan;

use crate::config::{ErosionKernel, VesselConfig};
use crate::consts::gray::*;
use crate::data::morph_3d::{binary_erosion_box, binary_erosion_ellipse_2d};
use crate::data::{save_f32_like, save_u8_like, VolumeAttr};
use crate::error::{SegmentError, SegmentResult, Stage};
use crate::{BinaryMask, CtVolume, CtWindow};

#[cfg(feature = "rayon")]
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

pub mod frangi;
pub mod gaussian;

/// 对单张切片做窗口变换并拉伸到 \[0, 255\].
fn window_slice(src: ArrayView2<f32>, mut dst: ArrayViewMut2<u8>, window: &CtWindow) {
    let windowed: Vec<f64> = src
        .iter()
        .map(|v| window.eval(*v as f64).unwrap_or(0.0))
        .collect();
    let (lo, hi) = windowed
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let range = hi - lo;
    if !(range > 0.0) {
        dst.fill(0);
        return;
    }
    for (d, v) in dst.iter_mut().zip(windowed) {
        *d = ((v - lo) / range * 255.0).clamp(0.0, 255.0) as u8;
    }
}

/// 窗口变换: 沿 `axis` 逐张切片, 先按 `window` 线性映射到 \[0, 255\] 并截断,
/// 再将切片最小值平移到 0, 最大值拉伸到 255, 小数部分截断.
///
/// 常数切片 (平移后最大值为 0) 输出全 0. 无意义的 HU 值 (inf, NaN) 视为 0.
pub fn window_transform(data: ArrayView3<f32>, window: &CtWindow, axis: Axis) -> Array3<u8> {
    let mut out = Array3::<u8>::zeros(data.dim());
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            out.axis_iter_mut(axis)
                .into_par_iter()
                .zip(data.axis_iter(axis).into_par_iter())
                .for_each(|(dst, src)| window_slice(src, dst, window));
        } else {
            out.axis_iter_mut(axis)
                .zip(data.axis_iter(axis))
                .for_each(|(dst, src)| window_slice(src, dst, window));
        }
    }
    out
}

/// sigmoid 非线性映射: `(max - min) / (1 + exp((beta - x) / alpha)) + min`,
/// 其中 `min`, `max` 为 `roi` 的全局极值 (包括 ROI 外的 0).
///
/// 单调不减. `roi` 为常数时输出恒为 `min`.
pub fn sigmoid_remap(roi: ArrayView3<u8>, alpha: f64, beta: f64) -> Array3<f32> {
    let (lo, hi) = roi
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let (lo, hi) = (lo as f64, hi as f64);
    roi.mapv(|x| ((hi - lo) / (1.0 + ((beta - x as f64) / alpha).exp()) + lo) as f32)
}

/// min-max 归一化到 \[0, 1\]. 常数数据归一化为全 0.
pub fn normalize_min_max(data: &mut Array3<f32>) {
    let (lo, hi) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let range = (hi - lo) as f64;
    if !(range > f64::EPSILON) {
        data.fill(0.0);
        return;
    }
    let scale = 1.0 / range;
    data.mapv_inplace(|v| ((v as f64 - lo as f64) * scale) as f32);
}

/// 求已排序数据 `sorted` 的 `q` 分位数 (`0 <= q <= 100`), 使用线性插值
/// (与 numpy 的默认方式一致). `sorted` 为空时返回 `None`.
pub fn percentile_linear(sorted: &[NotNan<f64>], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let pos = (n - 1) as f64 * (q / 100.0).clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = pos - lo as f64;
    let (a, b) = (sorted[lo].into_inner(), sorted[hi].into_inner());
    Some(a + (b - a) * frac)
}

/// 分位数自适应阈值.
///
/// 取 `response` 中所有严格为正的响应的 `percentile` 分位数 `t`, 响应严格大于 `t`
/// 的体素为前景. 返回 `(t, mask)`.
///
/// 没有正响应时返回 `EmptyCandidateSet`, `t >= 1` 时返回 `DegenerateThreshold`.
pub fn adaptive_threshold(
    response: ArrayView3<f32>,
    percentile: f64,
) -> SegmentResult<(f64, Array3<u8>)> {
    let mut positives: Vec<NotNan<f64>> = response
        .iter()
        .filter(|v| **v > 0.0)
        .filter_map(|v| NotNan::new(*v as f64).ok())
        .collect();
    positives.sort_unstable();

    let t = percentile_linear(&positives, percentile).ok_or(SegmentError::EmptyCandidateSet {
        stage: Stage::Vessel,
    })?;
    if t >= 1.0 {
        return Err(SegmentError::DegenerateThreshold { threshold: t });
    }
    let mask = response.mapv(|r| {
        if r as f64 > t {
            MASK_FOREGROUND
        } else {
            MASK_BACKGROUND
        }
    });
    Ok((t, mask))
}

/// 血管分割各阶段的中间结果.
#[derive(Debug, Clone)]
pub struct VesselStages {
    /// 窗口变换结果.
    pub windowed: Array3<u8>,

    /// 腐蚀后的肺野掩膜.
    pub eroded: Array3<u8>,

    /// `windowed * eroded`.
    pub roi: Array3<u8>,

    /// sigmoid 映射结果.
    pub sigmoid: Array3<f32>,

    /// 归一化到 \[0, 1\] 的 Frangi 响应.
    pub vesselness: Array3<f32>,

    /// 自适应阈值.
    pub threshold: f64,

    /// 最终血管掩膜.
    pub mask: BinaryMask,
}

impl VesselStages {
    /// 将中间结果以 `<stem>_<stage>.nii.gz` 的形式写入 `dir`, 返回所有写入的路径.
    /// 最终掩膜不在其中.
    pub fn save_all<T: VolumeAttr + ?Sized>(
        &self,
        reference: &T,
        dir: &Path,
        stem: &str,
    ) -> SegmentResult<Vec<PathBuf>> {
        let path = |stage: &str| dir.join(format!("{stem}_{stage}.nii.gz"));
        let mut written = Vec::with_capacity(5);

        for (stage, data) in [
            ("windowed", &self.windowed),
            ("eroded", &self.eroded),
            ("roi", &self.roi),
        ] {
            let p = path(stage);
            save_u8_like(reference, data.view(), &p)?;
            written.push(p);
        }
        for (stage, data) in [("sigmoid", &self.sigmoid), ("vesselness", &self.vesselness)] {
            let p = path(stage);
            save_f32_like(reference, data.view(), &p)?;
            written.push(p);
        }
        Ok(written)
    }
}

/// 肺血管分割器.
#[derive(Debug, Clone)]
pub struct VesselEnhancer {
    config: VesselConfig,
    window: CtWindow,
}

impl VesselEnhancer {
    /// 检查配置并创建分割器.
    pub fn new(config: VesselConfig) -> SegmentResult<Self> {
        config.validate()?;
        let window = config.window()?;
        Ok(Self { config, window })
    }

    /// 当前配置.
    #[inline]
    pub fn config(&self) -> &VesselConfig {
        &self.config
    }

    /// 由 CT 扫描 `volume` 及其肺野掩膜 `lung` 分割肺血管.
    ///
    /// 返回的掩膜与 `volume` 形状与空间元信息相同, 且是腐蚀后肺野的子集.
    #[inline]
    pub fn segment(&self, volume: &CtVolume, lung: &BinaryMask) -> SegmentResult<BinaryMask> {
        self.segment_with_stages(volume, lung).map(|s| s.mask)
    }

    /// 同 [`Self::segment`], 但保留所有中间结果.
    pub fn segment_with_stages(
        &self,
        volume: &CtVolume,
        lung: &BinaryMask,
    ) -> SegmentResult<VesselStages> {
        if !volume.is_congruent(lung) {
            return Err(SegmentError::InputShapeMismatch {
                volume: volume.shape(),
                mask: lung.shape(),
            });
        }
        let cfg = &self.config;

        let windowed = window_transform(volume.data(), &self.window, cfg.slice_axis.array_axis());
        let eroded = match cfg.erosion {
            ErosionKernel::Box(size) => binary_erosion_box(lung.data(), size),
            ErosionKernel::Ellipse2d(n) => binary_erosion_ellipse_2d(lung.data(), n),
        };
        let mut roi = Array3::<u8>::zeros(windowed.dim());
        for (r, w, e) in izip!(roi.iter_mut(), windowed.iter(), eroded.iter()) {
            *r = if is_foreground(*e) { *w } else { 0 };
        }
        log::debug!(
            "vessel roi: {} of {} lung voxels kept after erosion",
            eroded.iter().filter(|p| is_foreground(**p)).count(),
            lung.count()
        );

        let sigmoid = sigmoid_remap(roi.view(), cfg.sigmoid_alpha, cfg.sigmoid_beta);
        let mut vesselness = frangi::frangi(sigmoid.view(), &cfg.frangi);
        normalize_min_max(&mut vesselness);

        let (threshold, mut raw) = adaptive_threshold(vesselness.view(), cfg.percentile)?;
        raw.zip_mut_with(&eroded, |m, e| {
            if is_background(*e) {
                *m = MASK_BACKGROUND;
            }
        });
        let mask = BinaryMask::like(volume, raw)?;
        log::debug!(
            "vessel threshold {threshold:.4}, {} vessel voxels",
            mask.count()
        );

        Ok(VesselStages {
            windowed,
            eroded,
            roi,
            sigmoid,
            vesselness,
            threshold,
            mask,
        })
    }
}
