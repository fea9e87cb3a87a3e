//! 肺野与肺血管分割算法.
//!
//! 两个分割器都是无状态的: 构造时检查并持有配置, 之后可以对任意多个体数据
//! (包括在多个线程中) 重复调用.

pub mod lung;
pub mod vessel;

pub use lung::LungFieldSegmenter;
pub use vessel::{VesselEnhancer, VesselStages};
