use super::{neighbours, Connectivity};
use crate::consts::gray::*;
use ndarray::{Array3, ArrayView3};
use std::collections::VecDeque;

/// 3D 连通域标记结果.
///
/// 背景标记为 0, 连通域从 1 开始按行优先扫描顺序中首次出现的先后编号.
#[derive(Debug, Clone)]
pub struct Labeling {
    labels: Array3<u32>,

    /// `counts[i]` 为标记 `i + 1` 的体素个数.
    counts: Vec<usize>,
}

/// 按 `connectivity` 标记 `src` 中所有前景连通域, 同时统计各连通域大小.
///
/// 只扫描一遍数据: 每遇到一个未标记的前景体素, 就以它为起点广度优先地填充一个新连通域.
pub fn label(src: ArrayView3<u8>, connectivity: Connectivity) -> Labeling {
    let shape = src.dim();
    let offsets = connectivity.offsets();
    let mut labels = Array3::<u32>::zeros(shape);
    let mut counts = Vec::new();
    let mut bfs_q = VecDeque::with_capacity(1024);

    for (start, p) in src.indexed_iter() {
        if is_background(*p) || labels[start] != 0 {
            continue;
        }
        let cur = counts.len() as u32 + 1;
        let mut count = 1;
        labels[start] = cur;
        bfs_q.push_back(start);
        while let Some(pos) = bfs_q.pop_front() {
            for neigh in neighbours(shape, pos, &offsets) {
                if labels[neigh] == 0 && is_foreground(src[neigh]) {
                    labels[neigh] = cur;
                    count += 1;
                    bfs_q.push_back(neigh);
                }
            }
        }
        counts.push(count);
    }
    Labeling { labels, counts }
}

impl Labeling {
    /// 连通域个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// 是否不存在任何连通域?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// 标记数据.
    #[inline]
    pub fn labels(&self) -> ArrayView3<'_, u32> {
        self.labels.view()
    }

    /// 各连通域大小, 第 `i` 项对应标记 `i + 1`.
    #[inline]
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// 标记 `label` 的体素个数. 不存在时返回 `None`.
    #[inline]
    pub fn count_of(&self, label: u32) -> Option<usize> {
        let idx = (label as usize).checked_sub(1)?;
        self.counts.get(idx).copied()
    }

    /// 返回体素个数最多的连通域的标记. 不存在任何连通域时返回 `None`.
    ///
    /// 若多个连通域同样大, 取标记最小者, 即扫描时最先发现者. 这只是一个约定,
    /// 没有特别的几何含义.
    pub fn largest(&self) -> Option<u32> {
        let mut best: Option<(usize, usize)> = None;
        for (i, c) in self.counts.iter().copied().enumerate() {
            // 严格大于: 平局保留先出现者.
            if best.map_or(true, |(_, bc)| c > bc) {
                best = Some((i, c));
            }
        }
        best.map(|(i, _)| i as u32 + 1)
    }

    /// 只保留标记为 `label` 的连通域, 生成二值掩膜.
    pub fn select(&self, label: u32) -> Array3<u8> {
        self.labels.mapv(|l| {
            if l == label && l != 0 {
                MASK_FOREGROUND
            } else {
                MASK_BACKGROUND
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    #[test]
    fn test_label_counts_sum_to_foreground() {
        let src = Array3::from_shape_fn((6, 7, 8), |(z, h, w)| u8::from((z * 3 + h * 5 + w) % 7 < 2));
        for c in [Connectivity::Face, Connectivity::Edge, Connectivity::Vertex] {
            let lab = label(src.view(), c);
            let fg = src.iter().filter(|p| **p != 0).count();
            assert_eq!(lab.counts().iter().sum::<usize>(), fg);
            assert!(lab.labels().iter().all(|l| (*l as usize) <= lab.len()));
        }
    }

    #[test]
    fn test_label_connectivity_matters() {
        let mut src = Array3::<u8>::zeros((3, 3, 3));
        src[(0, 0, 0)] = 1;
        src[(1, 1, 0)] = 1; // 共棱
        src[(2, 2, 1)] = 1; // 与 (1, 1, 0) 共顶点
        assert_eq!(label(src.view(), Connectivity::Face).len(), 3);
        assert_eq!(label(src.view(), Connectivity::Edge).len(), 2);
        assert_eq!(label(src.view(), Connectivity::Vertex).len(), 1);
    }

    #[test]
    fn test_largest_and_tie_break() {
        let mut src = Array3::<u8>::zeros((1, 5, 9));
        src.slice_mut(s![.., 0..2, 0..2]).fill(1); // 4
        src.slice_mut(s![.., 0..3, 4..6]).fill(1); // 6
        src.slice_mut(s![.., 0..2, 7..9]).fill(1); // 4
        let lab = label(src.view(), Connectivity::Vertex);
        assert_eq!(lab.counts(), &[4, 6, 4]);
        assert_eq!(lab.largest(), Some(2));
        assert_eq!(lab.select(2).sum(), 6);
        assert_eq!(lab.count_of(3), Some(4));
        assert_eq!(lab.count_of(0), None);

        // 两个同样大的连通域, 取先扫描到的.
        let mut tie = Array3::<u8>::zeros((1, 3, 7));
        tie.slice_mut(s![.., 0..2, 0..2]).fill(1);
        tie.slice_mut(s![.., 0..2, 4..6]).fill(1);
        let lab = label(tie.view(), Connectivity::Face);
        assert_eq!(lab.counts(), &[4, 4]);
        assert_eq!(lab.largest(), Some(1));
        assert_eq!(lab.select(1)[(0, 0, 0)], 1);
        assert_eq!(lab.select(1)[(0, 0, 4)], 0);
    }

    #[test]
    fn test_empty_labeling() {
        let lab = label(Array3::<u8>::zeros((2, 2, 2)).view(), Connectivity::Vertex);
        assert!(lab.is_empty());
        assert_eq!(lab.largest(), None);
    }
}
