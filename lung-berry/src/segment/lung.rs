//! 肺野分割.
//!
//! 1. 以空气阈值二值化, 组织为 1, 空气为 0;
//! 2. 从体外的角落出发区域生长, 找到与体外空气连通的部分;
//! 3. 取反得到 "身体", 再去掉其中的组织, 得到体内封闭的空腔;
//! 4. 球形闭运算修补空腔 (血管, 气管壁等造成的小缺口);
//! 5. 保留体积最大的连通域作为肺野.

use ndarray::Array3;

use crate::config::LungConfig;
use crate::consts::gray::*;
use crate::data::morph_3d::{binary_closing_ball, label, region_grow, resolve_seed};
use crate::data::VolumeAttr;
use crate::error::{SegmentError, SegmentResult, Stage};
use crate::{BinaryMask, CtVolume};

/// 肺野分割器.
#[derive(Debug, Clone)]
pub struct LungFieldSegmenter {
    config: LungConfig,
}

impl LungFieldSegmenter {
    /// 检查配置并创建分割器.
    pub fn new(config: LungConfig) -> SegmentResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 当前配置.
    #[inline]
    pub fn config(&self) -> &LungConfig {
        &self.config
    }

    /// 分割 `volume` 的肺野. 返回的掩膜与 `volume` 形状与空间元信息相同.
    ///
    /// 闭运算后不存在空腔时返回 `EmptyCandidateSet`. 种子点越界时返回 `InvalidSeed`.
    pub fn segment(&self, volume: &CtVolume) -> SegmentResult<BinaryMask> {
        let cfg = &self.config;
        let shape = volume.shape();
        let seeds = cfg
            .seeds
            .iter()
            .map(|s| resolve_seed(*s, shape))
            .collect::<SegmentResult<Vec<_>>>()?;

        let cutoff = cfg.air_cutoff;
        let threshold = volume.data().mapv(|v| {
            if v >= cutoff {
                MASK_FOREGROUND
            } else {
                MASK_BACKGROUND
            }
        });

        // 与种子连通的空气, 即体外.
        let outside = region_grow(
            threshold.view(),
            &seeds,
            (MASK_BACKGROUND, MASK_BACKGROUND),
            cfg.grow_connectivity,
        );

        // body = 1 - outside, cavity = body - threshold.
        let mut cavity = Array3::<u8>::zeros(shape);
        ndarray::Zip::from(&mut cavity)
            .and(&outside)
            .and(&threshold)
            .for_each(|c, o, t| {
                if is_background(*o) && is_background(*t) {
                    *c = MASK_FOREGROUND;
                }
            });
        log::debug!(
            "lung: {} outside voxels, {} cavity voxels",
            outside.iter().filter(|p| is_foreground(**p)).count(),
            cavity.iter().filter(|p| is_foreground(**p)).count()
        );

        let closed = binary_closing_ball(cavity.view(), cfg.closing_radius);
        let labeling = label(closed.view(), cfg.label_connectivity);
        let largest = labeling.largest().ok_or(SegmentError::EmptyCandidateSet {
            stage: Stage::Lung,
        })?;
        log::debug!(
            "lung: {} components, largest #{largest} has {} voxels",
            labeling.len(),
            labeling.count_of(largest).unwrap_or(0)
        );

        BinaryMask::like(volume, labeling.select(largest))
    }
}
