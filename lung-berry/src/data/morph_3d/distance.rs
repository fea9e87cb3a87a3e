//! 基于精确欧氏距离变换的球形结构元膨胀/腐蚀/闭运算.
//!
//! 半径为 `r` 的球形结构元是直径为 `2r + 1` 的离散球 (与 ITK 的 `BinaryBallStructuringElement` 一致),
//! 即所有满足 `|d|^2 <= (r + 0.5)^2` 的整数偏移 `d`. 由于 `|d|^2` 是整数,
//! 这等价于 `|d|^2 <= r^2 + r`.
//!
//! 因此 "膨胀" 等价于 "到最近前景体素的距离平方不超过 `r^2 + r`",
//! "腐蚀" 等价于 "到最近背景体素的距离平方大于 `r^2 + r`".
//! 这使运算复杂度与半径无关.

use crate::consts::gray::*;
use crate::data::lanes::for_each_lane_mut;
use ndarray::{s, Array3, ArrayView3, Axis};
use num::Float;

/// 一维距离变换: 计算 `d[q] = min_p ((q - p)^2 + f[p])`.
///
/// 只有 `f[p]` 有限的位置参与下包络. 若 `f` 全部为无穷, 则结果全部为无穷.
/// 参考 Felzenszwalb & Huttenlocher, "Distance Transforms of Sampled Functions".
fn lower_envelope<T: Float>(f: &[T], out: &mut [T]) {
    let sq = |q: usize| T::from(q * q).unwrap_or_else(T::infinity);
    let at = |q: usize| T::from(q).unwrap_or_else(T::infinity);

    // `v[k]` 为第 k 条抛物线的顶点, `z[k]`..`z[k + 1]` 为其支配区间.
    let mut v: Vec<usize> = Vec::with_capacity(f.len());
    let mut z: Vec<T> = Vec::with_capacity(f.len() + 1);

    for (q, fq) in f.iter().copied().enumerate() {
        if !fq.is_finite() {
            continue;
        }
        let mut s = T::neg_infinity();
        while let Some(&p) = v.last() {
            let two = T::one() + T::one();
            s = ((fq + sq(q)) - (f[p] + sq(p))) / (two * (at(q) - at(p)));
            match z.last() {
                Some(&zk) if s <= zk => {
                    v.pop();
                    z.pop();
                    s = T::neg_infinity();
                }
                _ => break,
            }
        }
        v.push(q);
        z.push(s);
    }

    if v.is_empty() {
        out.fill(T::infinity());
        return;
    }
    z.push(T::infinity());

    let mut k = 0;
    for (q, o) in out.iter_mut().enumerate() {
        while z[k + 1] < at(q) {
            k += 1;
        }
        let p = v[k];
        let diff = at(q.abs_diff(p));
        *o = diff * diff + f[p];
    }
}

/// 平方欧氏距离变换.
///
/// 对每个体素, 计算其到最近的前景 (非零) 体素的距离平方, 以体素为单位.
/// 前景体素本身为 0. 如果 `src` 没有任何前景, 则结果全部为 `f32::INFINITY`.
///
/// 依次沿 w, H, z 三个轴做一维变换. 数值以 `f32` 存储, 以 `f64` 计算.
pub fn squared_edt(src: ArrayView3<u8>) -> Array3<f32> {
    let mut dist = src.mapv(|p| {
        if is_foreground(p) {
            0.0
        } else {
            f32::INFINITY
        }
    });
    for axis in [2, 1, 0] {
        for_each_lane_mut(&mut dist, Axis(axis), |mut lane| {
            let f: Vec<f64> = lane.iter().map(|v| *v as f64).collect();
            let mut out = vec![0.0; f.len()];
            lower_envelope(&f, &mut out);
            lane.iter_mut().zip(out).for_each(|(d, v)| *d = v as f32);
        });
    }
    dist
}

#[inline]
fn binarize(pred: bool) -> u8 {
    if pred {
        MASK_FOREGROUND
    } else {
        MASK_BACKGROUND
    }
}

/// 球形结构元包含的最大距离平方.
#[inline]
fn ball_reach(radius: usize) -> f32 {
    (radius * radius + radius) as f32
}

/// 以半径为 `radius` 的球形结构元膨胀. 数据范围外视为背景.
pub fn binary_dilation_ball(src: ArrayView3<u8>, radius: usize) -> Array3<u8> {
    let r2 = ball_reach(radius);
    squared_edt(src).mapv(|d| binarize(d <= r2))
}

/// 以半径为 `radius` 的球形结构元腐蚀.
///
/// 数据范围外的体素不参与计算 (等价于视为前景), 所以与边界相接的前景不会被腐蚀掉.
pub fn binary_erosion_ball(src: ArrayView3<u8>, radius: usize) -> Array3<u8> {
    let r2 = ball_reach(radius);
    let inverted = src.mapv(|p| binarize(is_background(p)));
    squared_edt(inverted.view()).mapv(|d| binarize(d > r2))
}

/// 以半径为 `radius` 的球形结构元闭运算 (先膨胀, 后腐蚀).
///
/// 计算在四周各补 `radius` 层背景的网格上进行, 结束后裁剪回原形状.
/// 因此闭运算的结果总是包含 `src` 的前景. `radius` 为 0 时结果与 `src` 相同.
pub fn binary_closing_ball(src: ArrayView3<u8>, radius: usize) -> Array3<u8> {
    let (z, h, w) = src.dim();
    let r = radius;
    let mut padded = Array3::<u8>::zeros((z + 2 * r, h + 2 * r, w + 2 * r));
    padded
        .slice_mut(s![r..r + z, r..r + h, r..r + w])
        .zip_mut_with(&src, |p, v| *p = binarize(is_foreground(*v)));

    let dilated = binary_dilation_ball(padded.view(), radius);
    let closed = binary_erosion_ball(dilated.view(), radius);
    closed.slice(s![r..r + z, r..r + h, r..r + w]).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force_edt(src: &Array3<u8>) -> Array3<f32> {
        let sites: Vec<_> = src
            .indexed_iter()
            .filter_map(|(pos, p)| (*p != 0).then_some(pos))
            .collect();
        Array3::from_shape_fn(src.dim(), |(z, h, w)| {
            sites
                .iter()
                .map(|(a, b, c)| (z.abs_diff(*a).pow(2) + h.abs_diff(*b).pow(2) + w.abs_diff(*c).pow(2)) as f32)
                .fold(f32::INFINITY, f32::min)
        })
    }

    #[test]
    fn test_lower_envelope_1d() {
        let inf = f64::INFINITY;
        let f = [inf, 0.0, inf, inf, inf, 0.0, inf];
        let mut out = [0.0; 7];
        lower_envelope(&f, &mut out);
        assert_eq!(out, [1.0, 0.0, 1.0, 4.0, 1.0, 0.0, 1.0]);

        let mut out = [0.0; 3];
        lower_envelope(&[inf; 3], &mut out);
        assert!(out.iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn test_squared_edt_matches_brute_force() {
        let src = Array3::from_shape_fn((5, 6, 7), |(z, h, w)| {
            u8::from((z * 7 + h * 3 + w * 5) % 11 == 0)
        });
        assert_eq!(squared_edt(src.view()), brute_force_edt(&src));

        let empty = Array3::<u8>::zeros((2, 2, 2));
        assert!(squared_edt(empty.view()).iter().all(|v| v.is_infinite()));
    }

    #[test]
    #[allow(overflowing_literals)]
    fn test_dilation_ball_volume() {
        let mut src = Array3::<u8>::zeros((9, 9, 9));
        src[(4, 4, 4)] = 1;
        // |d|^2 <= 2: 中心 + 18 邻居.
        assert_eq!(binary_dilation_ball(src.view(), 1).sum(), 19);
        // |d|^2 <= 6: 1 + 6 + 12 + 8 + 6 + 24 + 24.
        assert_eq!(binary_dilation_ball(src.view(), 2).sum(), 81);
        assert_eq!(binary_dilation_ball(src.view(), 0), src);

        // 默认闭运算半径.
        let mut big = Array3::<u8>::zeros((11, 11, 11));
        big[(5, 5, 5)] = 1;
        assert_eq!(binary_dilation_ball(big.view(), 4).sum(), 389);
    }

    #[test]
    fn test_erosion_ball_keeps_border() {
        let src = Array3::<u8>::ones((5, 5, 5));
        assert_eq!(binary_erosion_ball(src.view(), 2), src);

        let mut holed = src.clone();
        holed[(2, 2, 2)] = 0;
        let eroded = binary_erosion_ball(holed.view(), 1);
        assert_eq!(eroded.sum(), 125 - 19);
    }

    #[test]
    fn test_closing_fills_hole_and_is_extensive() {
        let mut src = Array3::<u8>::zeros((9, 9, 9));
        src.slice_mut(s![1..8, 1..8, 1..8]).fill(1);
        src[(4, 4, 4)] = 0;
        src[(4, 4, 5)] = 0;

        let closed = binary_closing_ball(src.view(), 1);
        assert_eq!(closed[(4, 4, 4)], 1);
        assert_eq!(closed[(4, 4, 5)], 1);
        assert!(src.iter().zip(closed.iter()).all(|(a, b)| *a <= *b));

        // 贴边的前景不会因为闭运算而丢失.
        let full = Array3::<u8>::ones((4, 4, 4));
        assert_eq!(binary_closing_ball(full.view(), 3), full);
    }

    #[test]
    fn test_closing_radius_zero_is_identity() {
        let src = Array3::from_shape_fn((4, 5, 6), |(z, h, w)| u8::from((z + h * w) % 3 == 0));
        assert_eq!(binary_closing_ball(src.view(), 0), src);
    }
}
