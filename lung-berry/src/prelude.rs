//! 🫁欢迎光临🩸
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::data::{BinaryMask, CtVolume, CtWindow, Geometry, VolumeAttr};

pub use crate::config::{
    Boundary, ErosionKernel, FrangiConfig, LungConfig, SegmentConfig, SliceAxis, VesselConfig,
};
pub use crate::error::{SegmentError, SegmentResult, Stage};

pub use crate::consts::gray::{MASK_BACKGROUND, MASK_FOREGROUND};

pub use crate::morph_3d::Connectivity;
pub use crate::segment::{LungFieldSegmenter, VesselEnhancer, VesselStages};

pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::{self, BatchReport, LungBatch, VesselBatch};
