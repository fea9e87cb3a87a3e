#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 对 nifti 格式的 3D 胸部 CT 扫描进行肺野分割和肺血管分割.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 所有体数据在内存中按 `(z, h, w)` 排列, 即 nifti 的 `(x, y, z)` 轴序反转.
//!   空间元信息 ([`Geometry`]) 仍然按物理 `(x, y, z)` 给出.
//! 2. 所有可预期的失败都以 [`SegmentError`] 返回. 批处理时单个文件的失败不会影响其它文件.
//!
//! # 开发计划
//!
//! ### nifti 读写与空间元信息保持 ✅
//!
//! 读入时按 `scl_slope`/`scl_inter` 换算 HU 值; 写出的掩膜与输入扫描的分辨率,
//! 原点和方向矩阵一致.
//!
//! 实现位于 `lung-berry/src/data`.
//!
//! ### 三维形态学操作 ✅
//!
//! 区域生长, 连通域标记, 基于欧氏距离变换的球形膨胀/腐蚀/闭运算,
//! 可分离的长方体腐蚀, 逐切片椭圆腐蚀.
//!
//! 实现位于 `lung-berry/src/data/morph_3d`.
//!
//! ### CT window 视图 ✅
//!
//! 提供一个独立的 CT 窗口对象, 以便将 CT HU 值转换为 8-bit 灰度值.
//!
//! 实现位于 `lung-berry/src/data/window.rs`.
//!
//! ### 肺野分割 ✅
//!
//! 空气阈值 -> 体外区域生长 -> 体内空腔 -> 球形闭运算 -> 最大连通域.
//!
//! 实现位于 `lung-berry/src/segment/lung.rs`.
//!
//! ### 肺血管分割 ✅
//!
//! 逐切片加窗 -> 肺野腐蚀 -> sigmoid 对比度增强 -> 多尺度 Frangi 滤波 ->
//! 自适应分位数阈值.
//!
//! 1. Hessian 矩阵由高斯导数卷积得到, 支持 5 种边界延拓. ✅
//! 2. 特征值采用解析解, 不依赖 LAPACK. ✅
//! 3. 中间结果可以全部导出为 nifti 文件, 便于调参. ✅
//!
//! 实现位于 `lung-berry/src/segment/vessel`.
//!
//! ### 批处理 ✅
//!
//! 目录级批处理, 输出已存在时跳过, 单文件失败隔离, 耗时统计.
//!
//! 实现位于 `lung-berry/src/dataset`.
//!
//! ### toml 配置文件 ✅
//!
//! 所有参数均可通过 toml 文件覆盖 (需要 `serde` feature).
//!
//! ### 完善代码文档 ✅
//!
//! 给每个 public API 提供文档, 并视情况给 private
//! API 提供文档.

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 3D CT nii 文件基础数据结构.
mod data;

pub use data::{save_f32_like, save_u8_like, BinaryMask, CtVolume, CtWindow, Geometry, VolumeAttr};

pub use data::morph_3d;

pub mod config;
pub mod consts;
pub mod dataset;
pub mod error;
pub mod prelude;
pub mod segment;

pub use config::{FrangiConfig, LungConfig, SegmentConfig, VesselConfig};
pub use error::{SegmentError, SegmentResult, Stage};
pub use segment::{LungFieldSegmenter, VesselEnhancer, VesselStages};
