//! 沿某一轴对 3D 数据的每条 1D lane 逐一处理. 可分离滤波 (距离变换, 盒式腐蚀,
//! 高斯导数卷积) 都基于这里的两个函数.
//!
//! 打开 `rayon` feature 时各 lane 并行处理. 每条 lane 的计算互不依赖,
//! 所以结果与串行执行逐位一致.

use ndarray::{Array3, ArrayView1, ArrayView3, ArrayViewMut1, Axis, Zip};

/// 沿 `axis` 对 `data` 的每条 lane 就地实施 `op`.
pub(crate) fn for_each_lane_mut<A, F>(data: &mut Array3<A>, axis: Axis, op: F)
where
    A: Send + Sync,
    F: Fn(ArrayViewMut1<A>) + Send + Sync,
{
    let lanes = Zip::from(data.lanes_mut(axis));
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            lanes.par_for_each(op);
        } else {
            lanes.for_each(op);
        }
    }
}

/// 沿 `axis` 同步遍历 `dst` 与 `src` 的对应 lane, 以 `src` 为输入向 `dst` 写出.
///
/// # 注意
///
/// `dst` 与 `src` 形状必须一致, 否则程序 panic.
pub(crate) fn zip_lanes_mut<A, B, F>(dst: &mut Array3<A>, src: ArrayView3<B>, axis: Axis, op: F)
where
    A: Send + Sync,
    B: Send + Sync,
    F: Fn(ArrayViewMut1<A>, ArrayView1<B>) + Send + Sync,
{
    let lanes = Zip::from(dst.lanes_mut(axis)).and(src.lanes(axis));
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            lanes.par_for_each(op);
        } else {
            lanes.for_each(op);
        }
    }
}
