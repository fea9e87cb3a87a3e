//! 一维高斯 (导数) 核与沿单轴的可分离卷积.

use crate::config::Boundary;
use crate::data::lanes::zip_lanes_mut;
use ndarray::{Array3, ArrayView3, Axis};

/// 截断倍数为 `truncate` 时 `sigma` 对应的核半径, 即 `round(truncate * sigma)`.
#[inline]
pub fn kernel_radius(sigma: f64, truncate: f64) -> usize {
    (truncate * sigma + 0.5) as usize
}

/// 生成 `[-radius, radius]` 上的一维高斯核的 `order` 阶导数 (`order <= 2`).
///
/// 高斯部分先归一化到和为 1, 再乘以对应阶数的多项式:
/// 1 阶为 `-x / sigma^2`, 2 阶为 `x^2 / sigma^4 - 1 / sigma^2`.
///
/// # 注意
///
/// `order > 2` 时程序 panic.
pub fn gaussian_kernel_1d(sigma: f64, order: usize, radius: usize) -> Vec<f64> {
    let s2 = sigma * sigma;
    let xs = (-(radius as isize)..=radius as isize).map(|x| x as f64);
    let mut phi: Vec<f64> = xs.clone().map(|x| (-0.5 * x * x / s2).exp()).collect();
    let total: f64 = phi.iter().sum();
    phi.iter_mut().for_each(|p| *p /= total);

    match order {
        0 => phi,
        1 => phi.iter().zip(xs).map(|(p, x)| p * (-x / s2)).collect(),
        2 => phi
            .iter()
            .zip(xs)
            .map(|(p, x)| p * (x * x / (s2 * s2) - 1.0 / s2))
            .collect(),
        _ => panic!("unsupported gaussian derivative order {order}"),
    }
}

/// 按 `boundary` 将可能越界的下标 `idx` 映射到长度为 `n` 的数据内.
///
/// `Boundary::Constant` 下越界返回 `None`.
#[inline]
pub fn extend_index(idx: isize, n: usize, boundary: Boundary) -> Option<usize> {
    let n_i = n as isize;
    if (0..n_i).contains(&idx) {
        return Some(idx as usize);
    }
    let mapped = match boundary {
        Boundary::Constant(_) => return None,
        Boundary::Nearest => idx.clamp(0, n_i - 1),
        Boundary::Reflect => {
            let m = idx.rem_euclid(2 * n_i);
            if m < n_i {
                m
            } else {
                2 * n_i - 1 - m
            }
        }
        Boundary::Mirror => {
            if n == 1 {
                0
            } else {
                let period = 2 * n_i - 2;
                let m = idx.rem_euclid(period);
                if m < n_i {
                    m
                } else {
                    period - m
                }
            }
        }
        Boundary::Wrap => idx.rem_euclid(n_i),
    };
    Some(mapped as usize)
}

/// 沿 `axis` 做一维卷积 `out[i] = sum_x kernel(x) * src(i - x)`, 其中 `x` 取值于
/// `[-r, r]`, `r = kernel.len() / 2`. 数据范围外的取值由 `boundary` 决定.
///
/// 数据以 `f32` 存储, 以 `f64` 计算.
pub fn convolve_axis(
    src: ArrayView3<f32>,
    axis: Axis,
    kernel: &[f64],
    boundary: Boundary,
) -> Array3<f32> {
    let r = (kernel.len() / 2) as isize;
    let cval = match boundary {
        Boundary::Constant(c) => c,
        _ => 0.0,
    };
    let mut dst = Array3::<f32>::zeros(src.dim());
    zip_lanes_mut(&mut dst, src, axis, |mut out, lane| {
        let line: Vec<f64> = lane.iter().map(|v| *v as f64).collect();
        let n = line.len();
        for (i, o) in out.iter_mut().enumerate() {
            let acc: f64 = kernel
                .iter()
                .enumerate()
                .map(|(j, k)| {
                    let idx = i as isize - (j as isize - r);
                    k * extend_index(idx, n, boundary).map_or(cval, |p| line[p])
                })
                .sum();
            *o = acc as f32;
        }
    });
    dst
}

/// 依次沿三个轴以 `orders` 阶高斯导数核卷积, 即求 `src` 在尺度 `sigma` 下的
/// 高斯偏导数 `d^(o0 + o1 + o2) / (dz^o0 dH^o1 dW^o2)`.
pub fn gaussian_derivative(
    src: ArrayView3<f32>,
    sigma: f64,
    orders: [usize; 3],
    truncate: f64,
    boundary: Boundary,
) -> Array3<f32> {
    let radius = kernel_radius(sigma, truncate);
    let mut cur = src.to_owned();
    for (axis, order) in orders.into_iter().enumerate() {
        let kernel = gaussian_kernel_1d(sigma, order, radius);
        cur = convolve_axis(cur.view(), Axis(axis), &kernel, boundary);
    }
    cur
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_shape() {
        assert_eq!(kernel_radius(1.0, 4.0), 4);
        assert_eq!(kernel_radius(1.5, 4.0), 6);

        let k0 = gaussian_kernel_1d(2.0, 0, 8);
        assert_eq!(k0.len(), 17);
        assert!((k0.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((k0[0] - k0[16]).abs() < 1e-15);

        // 1 阶核反对称, 2 阶核对称.
        let k1 = gaussian_kernel_1d(2.0, 1, 8);
        assert!(k1.iter().zip(k1.iter().rev()).all(|(a, b)| (a + b).abs() < 1e-15));
        assert!(k1[0] > 0.0);
        let k2 = gaussian_kernel_1d(2.0, 2, 8);
        assert!(k2.iter().zip(k2.iter().rev()).all(|(a, b)| (a - b).abs() < 1e-15));
        assert!(k2[8] < 0.0);
    }

    #[test]
    fn test_extend_index() {
        let n = 4;
        let map = |b: Boundary| -> Vec<Option<usize>> {
            [-3, -2, -1, 4, 5].iter().map(|i| extend_index(*i, n, b)).collect()
        };
        assert_eq!(map(Boundary::Constant(0.0)), vec![None; 5]);
        assert_eq!(map(Boundary::Nearest), [0, 0, 0, 3, 3].map(Some).to_vec());
        assert_eq!(map(Boundary::Reflect), [2, 1, 0, 3, 2].map(Some).to_vec());
        assert_eq!(map(Boundary::Mirror), [3, 2, 1, 2, 1].map(Some).to_vec());
        assert_eq!(map(Boundary::Wrap), [1, 2, 3, 0, 1].map(Some).to_vec());
        assert_eq!(extend_index(-5, 1, Boundary::Mirror), Some(0));
    }

    #[test]
    fn test_derivative_of_ramp() {
        // f(w) = w, 沿 W 方向的 1 阶导数应为 1.
        let src = Array3::from_shape_fn((1, 1, 41), |(_, _, w)| w as f32);
        let d = gaussian_derivative(src.view(), 2.0, [0, 0, 1], 4.0, Boundary::Nearest);
        assert!((d[(0, 0, 20)] - 1.0).abs() < 5e-3, "{}", d[(0, 0, 20)]);

        // f(z) = (z - 20)^2, 2 阶导数应为 2.
        let src = Array3::from_shape_fn((41, 1, 1), |(z, _, _)| (z as f32 - 20.0).powi(2));
        let d = gaussian_derivative(src.view(), 2.0, [2, 0, 0], 4.0, Boundary::Nearest);
        assert!((d[(20, 0, 0)] - 2.0).abs() < 5e-2, "{}", d[(20, 0, 0)]);
    }

    #[test]
    fn test_smoothing_preserves_constant() {
        let src = Array3::<f32>::from_elem((5, 6, 7), 3.0);
        for b in [Boundary::Nearest, Boundary::Reflect, Boundary::Mirror, Boundary::Wrap] {
            let d = gaussian_derivative(src.view(), 1.0, [0, 0, 0], 4.0, b);
            assert!(d.iter().all(|v| (v - 3.0).abs() < 1e-5));
        }
        let d = gaussian_derivative(src.view(), 1.0, [0, 0, 0], 4.0, Boundary::Constant(0.0));
        assert!(d[(0, 0, 0)] < 3.0);
        assert!((d[(2, 3, 3)] - 3.0).abs() < 0.1);
    }
}
