//! 多尺度 Frangi 血管增强滤波.
//!
//! 参考 Frangi et al., "Multiscale vessel enhancement filtering", MICCAI 1998.
//! 对每个尺度 `sigma`, 用高斯导数求 Hessian 矩阵 (乘以 `sigma^2` 做尺度归一化),
//! 按绝对值升序排列其特征值 `|l1| <= |l2| <= |l3|`, 再计算:
//!
//! ```text
//! Ra = l2 / l3
//! Rb = |l1| / sqrt(l2 * l3)
//! S  = sqrt(l1^2 + l2^2 + l3^2)
//! v  = (1 - exp(-Ra^2 / 2a^2)) * exp(-Rb^2 / 2b^2) * (1 - exp(-S^2 / 2c^2))
//! ```
//!
//! 最终响应取所有尺度的最大值.

use super::gaussian::gaussian_derivative;
use crate::config::FrangiConfig;
use ndarray::{Array3, Array4, ArrayView1, ArrayView3, Axis, Zip};
use std::f64::consts::PI;

/// Hessian 的 6 个独立分量在最后一维中的排列: `zz, zh, zw, hh, hw, ww`.
const HESSIAN_ORDERS: [[usize; 3]; 6] = [
    [2, 0, 0],
    [1, 1, 0],
    [1, 0, 1],
    [0, 2, 0],
    [0, 1, 1],
    [0, 0, 2],
];

/// 求 `src` 在尺度 `sigma` 下经 `sigma^2` 归一化的 Hessian 矩阵.
///
/// 返回形状为 `(z, H, W, 6)`, 最后一维依次为 `zz, zh, zw, hh, hw, ww`.
pub fn hessian(src: ArrayView3<f32>, sigma: f64, config: &FrangiConfig) -> Array4<f32> {
    let (z, h, w) = src.dim();
    let mut ans = Array4::<f32>::zeros((z, h, w, 6));
    let scale = (sigma * sigma) as f32;
    for (c, orders) in HESSIAN_ORDERS.into_iter().enumerate() {
        let d = gaussian_derivative(src, sigma, orders, config.truncate, config.boundary);
        ans.index_axis_mut(Axis(3), c)
            .zip_mut_with(&d, |dst, v| *dst = v * scale);
    }
    ans
}

/// 对称 3x3 矩阵的特征值, 按绝对值升序排列.
///
/// 矩阵以 `[a00, a01, a02, a11, a12, a22]` 给出. 使用三角函数解析解.
pub fn symmetric_eigenvalues([a00, a01, a02, a11, a12, a22]: [f64; 6]) -> [f64; 3] {
    let p1 = a01 * a01 + a02 * a02 + a12 * a12;
    let mut eig = if p1 == 0.0 {
        [a00, a11, a22]
    } else {
        let q = (a00 + a11 + a22) / 3.0;
        let p2 = (a00 - q).powi(2) + (a11 - q).powi(2) + (a22 - q).powi(2) + 2.0 * p1;
        let p = (p2 / 6.0).sqrt();
        // B = (A - qI) / p
        let (b00, b11, b22) = ((a00 - q) / p, (a11 - q) / p, (a22 - q) / p);
        let (b01, b02, b12) = (a01 / p, a02 / p, a12 / p);
        let det = b00 * (b11 * b22 - b12 * b12) - b01 * (b01 * b22 - b12 * b02)
            + b02 * (b01 * b12 - b11 * b02);
        let r = (det / 2.0).clamp(-1.0, 1.0);
        let phi = r.acos() / 3.0;
        let e1 = q + 2.0 * p * phi.cos();
        let e3 = q + 2.0 * p * (phi + 2.0 * PI / 3.0).cos();
        let e2 = 3.0 * q - e1 - e3;
        [e1, e2, e3]
    };
    eig.sort_by(|a, b| a.abs().total_cmp(&b.abs()));
    eig
}

/// Hessian 的 Frobenius 范数, 等于其特征值平方和的平方根.
#[inline]
fn hessian_norm(h: ArrayView1<f32>) -> f64 {
    let [zz, zh, zw, hh, hw, ww] = [h[0], h[1], h[2], h[3], h[4], h[5]].map(f64::from);
    (zz * zz + hh * hh + ww * ww + 2.0 * (zh * zh + zw * zw + hw * hw)).sqrt()
}

/// 单个体素的 Frangi 响应. `eig` 按绝对值升序排列.
///
/// 对亮于背景的管状结构, 需要先对 Hessian 取负. 两个大特征值中任一为负时响应为 0.
#[inline]
pub fn vesselness([l1, l2, l3]: [f64; 3], alpha: f64, beta: f64, gamma: f64) -> f64 {
    if l2 < 0.0 || l3 < 0.0 || l3 == 0.0 {
        return 0.0;
    }
    let ra2 = (l2 / l3).powi(2);
    let rb2 = l1 * l1 / (l2 * l3);
    let s2 = l1 * l1 + l2 * l2 + l3 * l3;
    let v = (1.0 - (-ra2 / (2.0 * alpha * alpha)).exp())
        * (-rb2 / (2.0 * beta * beta)).exp()
        * (1.0 - (-s2 / (2.0 * gamma * gamma)).exp());
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// 多尺度 Frangi 滤波, 返回各尺度响应的最大值 (非负).
///
/// `config.gamma` 为 `None` 时, 取首个尺度下 Hessian 范数最大值的一半 (为 0 时取 1).
pub fn frangi(src: ArrayView3<f32>, config: &FrangiConfig) -> Array3<f32> {
    let mut filtered = Array3::<f32>::zeros(src.dim());
    let (alpha, beta) = (config.alpha, config.beta);
    let sign = if config.black_ridges { 1.0 } else { -1.0 };
    let mut gamma = config.gamma;

    for &sigma in &config.sigmas {
        let hess = hessian(src, sigma, config);
        let g = *gamma.get_or_insert_with(|| {
            let s_max = hess
                .lanes(Axis(3))
                .into_iter()
                .map(hessian_norm)
                .fold(0.0, f64::max);
            let g = if s_max == 0.0 { 1.0 } else { s_max / 2.0 };
            log::debug!("frangi gamma derived from sigma {sigma}: {g:.4}");
            g
        });

        let zip = Zip::from(&mut filtered).and(hess.lanes(Axis(3)));
        let update = |dst: &mut f32, h: ArrayView1<f32>| {
            let m = [h[0], h[1], h[2], h[3], h[4], h[5]].map(|v| sign * f64::from(v));
            let v = vesselness(symmetric_eigenvalues(m), alpha, beta, g) as f32;
            if v > *dst {
                *dst = v;
            }
        };
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                zip.par_for_each(update);
            } else {
                zip.for_each(update);
            }
        }
    }
    filtered
}
