//! 3D 形态学操作.
//!
//! 所有操作都以 `(z, H, W)` 排列的 `u8` 二值体数据为输入, 非零体素视为前景,
//! 并生成新的数组 (不就地修改输入).

use crate::consts::gray::*;
use crate::error::{SegmentError, SegmentResult};
use crate::Idx3d;
use ndarray::{Array3, ArrayView3};
use std::collections::VecDeque;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod distance;
mod erode;
mod label;

pub use distance::{binary_closing_ball, binary_dilation_ball, binary_erosion_ball, squared_edt};
pub use erode::{binary_erosion_box, binary_erosion_ellipse_2d, ellipse_kernel_2d};
pub use label::{label, Labeling};

/// 体素连通规则.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Connectivity {
    /// 6-邻接 (前后上下左右, 钻石型).
    Face,

    /// 18-邻接 (共面或共棱).
    Edge,

    /// 26-邻接 (完整 3x3x3 邻域).
    #[default]
    Vertex,
}

impl Connectivity {
    /// 获取该规则下所有邻居相对偏移, 按行优先排列.
    pub fn offsets(&self) -> Vec<[isize; 3]> {
        let max_hops = match self {
            Connectivity::Face => 1,
            Connectivity::Edge => 2,
            Connectivity::Vertex => 3,
        };
        let mut ans = Vec::with_capacity(26);
        for dz in -1..=1isize {
            for dh in -1..=1isize {
                for dw in -1..=1isize {
                    let hops = dz.abs() + dh.abs() + dw.abs();
                    if hops != 0 && hops <= max_hops {
                        ans.push([dz, dh, dw]);
                    }
                }
            }
        }
        ans
    }

    /// 邻居个数.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Connectivity::Face => 6,
            Connectivity::Edge => 18,
            Connectivity::Vertex => 26,
        }
    }
}

/// 获取 `pos` 按 `offsets` 偏移后的所有邻居坐标.
///
/// 在数据范围 `shape` 外的坐标会被过滤掉, 不会包含在返回值中.
#[inline]
pub(crate) fn neighbours<'a>(
    shape: Idx3d,
    (z, h, w): Idx3d,
    offsets: &'a [[isize; 3]],
) -> impl Iterator<Item = Idx3d> + 'a {
    let (len_z, len_h, len_w) = shape;
    offsets.iter().filter_map(move |[dz, dh, dw]| {
        let nz = z.checked_add_signed(*dz)?;
        let nh = h.checked_add_signed(*dh)?;
        let nw = w.checked_add_signed(*dw)?;
        (nz < len_z && nh < len_h && nw < len_w).then_some((nz, nh, nw))
    })
}

/// 将 `(x, y, z)` 形式、允许负数 (从末尾倒数) 的种子点解析为 `(z, h, w)` 索引.
///
/// 越界时返回 `Err`.
pub fn resolve_seed(seed: [isize; 3], shape: Idx3d) -> SegmentResult<Idx3d> {
    let (len_z, len_h, len_w) = shape;
    let resolve = |v: isize, len: usize| -> Option<usize> {
        let v = if v < 0 {
            len.checked_sub(v.unsigned_abs())?
        } else {
            v as usize
        };
        (v < len).then_some(v)
    };
    let [x, y, z] = seed;
    match (resolve(z, len_z), resolve(y, len_h), resolve(x, len_w)) {
        (Some(z), Some(h), Some(w)) => Ok((z, h, w)),
        _ => Err(SegmentError::InvalidSeed { seed, shape }),
    }
}

/// 种子区域生长 (连通阈值填充).
///
/// 从 `seeds` 出发, 按 `connectivity` 广度优先遍历所有取值落在闭区间
/// `[lower, upper]` 内的体素. 返回的体数据中, 被生长到的体素为 1, 其余为 0.
/// 本身取值不在区间内的种子点不会生长.
///
/// # 注意
///
/// `seeds` 中所有坐标都必须在数据范围内, 否则程序 panic.
/// 使用 [`resolve_seed`] 获取合法的种子.
pub fn region_grow(
    src: ArrayView3<u8>,
    seeds: &[Idx3d],
    (lower, upper): (u8, u8),
    connectivity: Connectivity,
) -> Array3<u8> {
    let shape = src.dim();
    let offsets = connectivity.offsets();
    let within = |p: u8| (lower..=upper).contains(&p);

    // `grown` 同时充当 visited 集合.
    let mut grown = Array3::<u8>::zeros(shape);
    let mut bfs_q: VecDeque<Idx3d> = VecDeque::with_capacity(1024);

    for &seed in seeds {
        if within(src[seed]) && is_background(grown[seed]) {
            grown[seed] = MASK_FOREGROUND;
            bfs_q.push_back(seed);
        }
    }
    while let Some(cur_pos) = bfs_q.pop_front() {
        for neigh in neighbours(shape, cur_pos, &offsets) {
            if is_background(grown[neigh]) && within(src[neigh]) {
                grown[neigh] = MASK_FOREGROUND;
                bfs_q.push_back(neigh);
            }
        }
    }
    grown
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};

    #[test]
    fn test_connectivity_offsets() {
        for c in [Connectivity::Face, Connectivity::Edge, Connectivity::Vertex] {
            let offsets = c.offsets();
            assert_eq!(offsets.len(), c.len());
            assert!(!offsets.contains(&[0, 0, 0]));
        }
        assert!(Connectivity::Face.offsets().contains(&[0, 0, -1]));
        assert!(!Connectivity::Face.offsets().contains(&[0, 1, 1]));
        assert!(Connectivity::Edge.offsets().contains(&[0, 1, 1]));
        assert!(!Connectivity::Edge.offsets().contains(&[1, 1, 1]));
    }

    #[test]
    fn test_neighbours_clip_to_bounds() {
        let offsets = Connectivity::Vertex.offsets();
        assert_eq!(neighbours((3, 3, 3), (0, 0, 0), &offsets).count(), 7);
        assert_eq!(neighbours((3, 3, 3), (1, 1, 1), &offsets).count(), 26);
        assert_eq!(neighbours((1, 1, 1), (0, 0, 0), &offsets).count(), 0);
    }

    #[test]
    fn test_resolve_seed() {
        let shape = (4, 5, 6);
        assert_eq!(resolve_seed([0, 0, 0], shape).unwrap(), (0, 0, 0));
        // (maxX - 1, maxY - 1, 0)
        assert_eq!(resolve_seed([-1, -1, 0], shape).unwrap(), (0, 4, 5));
        assert_eq!(resolve_seed([2, 3, -2], shape).unwrap(), (2, 3, 2));
        assert!(resolve_seed([6, 0, 0], shape).is_err());
        assert!(resolve_seed([0, -6, 0], shape).is_err());
    }

    #[test]
    fn test_region_grow_stops_at_wall() {
        // 中间一堵墙 (值为 1) 将 w 方向分成两半.
        let mut src = Array3::<u8>::zeros((3, 4, 7));
        src.slice_mut(s![.., .., 3]).fill(1);

        let grown = region_grow(src.view(), &[(0, 0, 0)], (0, 0), Connectivity::Face);
        assert_eq!(grown.iter().filter(|p| **p == 1).count(), 3 * 4 * 3);
        assert!(grown.slice(s![.., .., 3..]).iter().all(|p| *p == 0));

        let both = region_grow(
            src.view(),
            &[(0, 0, 0), (0, 3, 6)],
            (0, 0),
            Connectivity::Face,
        );
        assert_eq!(both.iter().filter(|p| **p == 1).count(), 3 * 4 * 6);
    }

    #[test]
    fn test_region_grow_seed_out_of_range_value() {
        let src = Array3::<u8>::ones((2, 2, 2));
        let grown = region_grow(src.view(), &[(0, 0, 0)], (0, 0), Connectivity::Vertex);
        assert!(grown.iter().all(|p| *p == 0));
    }

    #[test]
    fn test_region_grow_diagonal_leak() {
        // 两个体素仅通过顶点相接.
        let mut src = Array3::<u8>::ones((2, 2, 2));
        src[(0, 0, 0)] = 0;
        src[(1, 1, 1)] = 0;
        let face = region_grow(src.view(), &[(0, 0, 0)], (0, 0), Connectivity::Face);
        assert_eq!(face[(1, 1, 1)], 0);
        let vertex = region_grow(src.view(), &[(0, 0, 0)], (0, 0), Connectivity::Vertex);
        assert_eq!(vertex[(1, 1, 1)], 1);
    }
}
