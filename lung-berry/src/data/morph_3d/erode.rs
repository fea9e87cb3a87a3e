//! 盒式 / 椭圆结构元腐蚀, 用于收缩肺野 ROI 的边界.

use crate::consts::gray::*;
use crate::data::lanes::for_each_lane_mut;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut2, Axis};

#[cfg(feature = "rayon")]
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

/// 以 `(z, H, W)` 各轴边长为 `size` 的长方体结构元腐蚀.
///
/// 结构元在偶数边长时锚点偏左 (左侧 `size / 2`, 右侧 `size - 1 - size / 2`).
/// 数据范围外视为背景, 因此距边界不足半个结构元的体素都会被腐蚀掉.
///
/// 长方体可分离, 所以该操作分解为三次一维腐蚀.
///
/// # 注意
///
/// `size` 的每个分量都必须至少为 1, 否则程序 panic.
pub fn binary_erosion_box(src: ArrayView3<u8>, size: [usize; 3]) -> Array3<u8> {
    assert!(size.iter().all(|s| *s >= 1), "empty box kernel: {size:?}");
    let mut out = src.mapv(|p| {
        if is_foreground(p) {
            MASK_FOREGROUND
        } else {
            MASK_BACKGROUND
        }
    });
    for (axis, len) in size.into_iter().enumerate() {
        if len == 1 {
            continue;
        }
        let left = len / 2;
        let right = len - 1 - left;
        for_each_lane_mut(&mut out, Axis(axis), |mut lane| {
            // bg_before[i]: lane[..i] 中背景体素个数.
            let mut bg_before = Vec::with_capacity(lane.len() + 1);
            bg_before.push(0usize);
            for p in lane.iter() {
                let last = bg_before[bg_before.len() - 1];
                bg_before.push(last + usize::from(is_background(*p)));
            }
            let n = lane.len();
            for (i, p) in lane.iter_mut().enumerate() {
                let inside = i >= left && i + right < n;
                let clean = inside && bg_before[i + right + 1] == bg_before[i - left];
                *p = if clean { MASK_FOREGROUND } else { MASK_BACKGROUND };
            }
        });
    }
    out
}

/// 生成 `size x size` 的椭圆 (此处为圆) 结构元, 与 OpenCV
/// `getStructuringElement(MORPH_ELLIPSE, (size, size))` 一致.
///
/// 例如 `size = 5` 时:
///
/// ```text
/// 0 0 1 0 0
/// 1 1 1 1 1
/// 1 1 1 1 1
/// 1 1 1 1 1
/// 0 0 1 0 0
/// ```
pub fn ellipse_kernel_2d(size: usize) -> Array2<u8> {
    let mut kernel = Array2::<u8>::zeros((size, size));
    let r = (size / 2) as isize;
    let c = (size / 2) as isize;
    let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };

    for (i, mut row) in kernel.rows_mut().into_iter().enumerate() {
        let dy = i as isize - r;
        if dy.abs() > r {
            continue;
        }
        let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as isize;
        let j1 = (c - dx).max(0) as usize;
        let j2 = ((c + dx + 1) as usize).min(size);
        row.slice_mut(ndarray::s![j1..j2]).fill(MASK_FOREGROUND);
    }
    kernel
}

/// 用 `kernel` 腐蚀单张切片. 锚点在结构元中心, 切片范围外的邻居被忽略.
fn erode_slice(src: ArrayView2<u8>, mut dst: ArrayViewMut2<u8>, offsets: &[(isize, isize)]) {
    let (len_h, len_w) = src.dim();
    for ((h, w), p) in dst.indexed_iter_mut() {
        let clean = offsets.iter().all(|(dh, dw)| {
            match (h.checked_add_signed(*dh), w.checked_add_signed(*dw)) {
                (Some(nh), Some(nw)) if nh < len_h && nw < len_w => is_foreground(src[(nh, nw)]),
                _ => true,
            }
        });
        *p = if clean { MASK_FOREGROUND } else { MASK_BACKGROUND };
    }
}

/// 逐个水平切片, 以 `size x size` 椭圆结构元 (见 [`ellipse_kernel_2d`]) 腐蚀.
///
/// 切片范围外的邻居被忽略, 不会导致边界体素被腐蚀.
pub fn binary_erosion_ellipse_2d(src: ArrayView3<u8>, size: usize) -> Array3<u8> {
    let kernel = ellipse_kernel_2d(size);
    let anchor = (size / 2) as isize;
    let offsets: Vec<(isize, isize)> = kernel
        .indexed_iter()
        .filter_map(|((i, j), p)| {
            is_foreground(*p).then_some((i as isize - anchor, j as isize - anchor))
        })
        .collect();

    let mut out = Array3::<u8>::zeros(src.dim());
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            out.axis_iter_mut(Axis(0))
                .into_par_iter()
                .zip(src.axis_iter(Axis(0)).into_par_iter())
                .for_each(|(dst, s)| erode_slice(s, dst, &offsets));
        } else {
            out.axis_iter_mut(Axis(0))
                .zip(src.axis_iter(Axis(0)))
                .for_each(|(dst, s)| erode_slice(s, dst, &offsets));
        }
    }
    out
}
