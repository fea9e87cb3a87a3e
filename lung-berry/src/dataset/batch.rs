//! 目录级批处理.
//!
//! 每个输入文件独立处理: 单个文件出错只会被记录, 不会中断整个批次.
//! 输出文件已存在时跳过该输入. 打开 `rayon` feature 时多个文件并行处理.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{LungConfig, VesselConfig};
use crate::data::VolumeAttr;
use crate::dataset::list_volumes;
use crate::dataset::naming::{find_companion, lung_mask_name, vessel_mask_name, volume_stem};
use crate::error::{SegmentError, SegmentResult, Stage};
use crate::segment::{LungFieldSegmenter, VesselEnhancer};
use crate::{BinaryMask, CtVolume};

#[cfg(feature = "rayon")]
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

/// 单个文件的处理结果.
#[derive(Debug)]
pub enum Outcome {
    /// 处理成功, 附带耗时.
    Processed {
        /// 该文件的处理耗时 (含读写).
        elapsed: Duration,
    },

    /// 输出文件已存在, 跳过.
    Skipped,

    /// 处理失败.
    Failed(SegmentError),
}

/// 单个输入文件的记录.
#[derive(Debug)]
pub struct FileReport {
    /// 输入文件.
    pub input: PathBuf,

    /// 输出文件. 无法从输入文件名推出时为 `None`.
    pub output: Option<PathBuf>,

    /// 处理结果.
    pub outcome: Outcome,
}

/// 一次批处理的汇总.
#[derive(Debug)]
pub struct BatchReport {
    stage: Stage,
    files: Vec<FileReport>,
    elapsed: Duration,
}

impl BatchReport {
    /// 批处理阶段.
    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// 所有文件记录, 与输入顺序一致.
    #[inline]
    pub fn files(&self) -> &[FileReport] {
        &self.files
    }

    /// 整个批次的墙钟耗时.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// 输入文件个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// 是否没有任何输入文件?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// 处理成功的文件个数.
    pub fn processed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, Outcome::Processed { .. }))
            .count()
    }

    /// 跳过的文件个数.
    pub fn skipped(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, Outcome::Skipped))
            .count()
    }

    /// 失败的文件个数.
    #[inline]
    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// 所有失败的文件及其错误.
    pub fn failures(&self) -> impl Iterator<Item = (&Path, &SegmentError)> {
        self.files.iter().filter_map(|f| match &f.outcome {
            Outcome::Failed(e) => Some((f.input.as_path(), e)),
            _ => None,
        })
    }

    fn processing_times(&self) -> impl Iterator<Item = (&Path, Duration)> {
        self.files.iter().filter_map(|f| match f.outcome {
            Outcome::Processed { elapsed } => Some((f.input.as_path(), elapsed)),
            _ => None,
        })
    }

    /// 所有成功文件的处理耗时之和 (并行时大于墙钟耗时).
    pub fn busy_time(&self) -> Duration {
        self.processing_times().map(|(_, d)| d).sum()
    }

    /// 成功文件的平均处理耗时. 没有成功文件时返回 `None`.
    pub fn average_time(&self) -> Option<Duration> {
        let n = self.processed();
        (n != 0).then(|| self.busy_time() / n as u32)
    }

    /// 耗时最长的成功文件.
    pub fn slowest(&self) -> Option<(&Path, Duration)> {
        self.processing_times().max_by_key(|(_, d)| *d)
    }
}

/// 一类批处理任务: 由输入文件名决定输出文件名, 并完成单个文件的处理.
pub trait BatchJob: Sync {
    /// 任务所属阶段.
    fn stage(&self) -> Stage;

    /// 输入文件 `input` 对应的输出文件.
    fn output_for(&self, input: &Path) -> Option<PathBuf>;

    /// 处理单个文件, 结果写入 `output`.
    fn process(&self, input: &Path, output: &Path) -> SegmentResult<()>;
}

fn run_one<J: BatchJob + ?Sized>(job: &J, input: &Path) -> FileReport {
    let Some(output) = job.output_for(input) else {
        let err = io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot derive output name from `{}`", input.display()),
        );
        log::error!("[{}] {err}", job.stage());
        return FileReport {
            input: input.to_path_buf(),
            output: None,
            outcome: Outcome::Failed(err.into()),
        };
    };

    let outcome = if output.exists() {
        log::warn!(
            "[{}] skip `{}`: `{}` already exists",
            job.stage(),
            input.display(),
            output.display()
        );
        Outcome::Skipped
    } else {
        let since = Instant::now();
        match job.process(input, &output) {
            Ok(()) => {
                let elapsed = since.elapsed();
                log::info!(
                    "[{}] `{}` -> `{}` in {elapsed:.2?}",
                    job.stage(),
                    input.display(),
                    output.display()
                );
                Outcome::Processed { elapsed }
            }
            Err(e) => {
                log::error!("[{}] `{}` failed: {e}", job.stage(), input.display());
                Outcome::Failed(e)
            }
        }
    };
    FileReport {
        input: input.to_path_buf(),
        output: Some(output),
        outcome,
    }
}

/// 依次 (或并行地) 对 `inputs` 中每个文件执行 `job`.
pub fn run_batch<J: BatchJob + ?Sized>(job: &J, inputs: &[PathBuf]) -> BatchReport {
    let since = Instant::now();
    log::info!("[{}] {} input files", job.stage(), inputs.len());
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            let files = inputs.par_iter().map(|p| run_one(job, p)).collect();
        } else {
            let files = inputs.iter().map(|p| run_one(job, p)).collect();
        }
    }
    BatchReport {
        stage: job.stage(),
        files,
        elapsed: since.elapsed(),
    }
}

/// 肺野批处理: `input_dir/X.nii.gz` -> `output_dir/X_lung_mask.nii.gz`.
#[derive(Debug, Clone)]
pub struct LungBatch {
    input_dir: PathBuf,
    output_dir: PathBuf,
    segmenter: LungFieldSegmenter,
}

impl LungBatch {
    /// 检查配置并创建批处理任务.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(
        input_dir: P,
        output_dir: Q,
        config: LungConfig,
    ) -> SegmentResult<Self> {
        Ok(Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            segmenter: LungFieldSegmenter::new(config)?,
        })
    }

    /// 处理 `input_dir` 下的所有 CT 扫描. 必要时创建 `output_dir`.
    ///
    /// 只有列出输入目录或创建输出目录失败时才返回 `Err`.
    pub fn run(&self) -> SegmentResult<BatchReport> {
        fs::create_dir_all(&self.output_dir)?;
        let inputs = list_volumes(&self.input_dir)?;
        Ok(run_batch(self, &inputs))
    }
}

impl BatchJob for LungBatch {
    #[inline]
    fn stage(&self) -> Stage {
        Stage::Lung
    }

    fn output_for(&self, input: &Path) -> Option<PathBuf> {
        let stem = volume_stem(input)?;
        Some(self.output_dir.join(lung_mask_name(stem)))
    }

    fn process(&self, input: &Path, output: &Path) -> SegmentResult<()> {
        let volume = CtVolume::open(input)?;
        log::info!(
            "[{}] `{}`: shape {:?}, spacing {:?}",
            self.stage(),
            input.display(),
            volume.shape(),
            volume.spacing()
        );
        let mask = self.segmenter.segment(&volume)?;
        log::info!(
            "[{}] lung volume {:.1} ml, mean {:.1} HU",
            self.stage(),
            mask.volume_mm3() / 1000.0,
            volume.mean_hu_within(&mask)?.unwrap_or(f64::NAN)
        );
        mask.save(output)
    }
}

/// 肺血管批处理: `input_dir/X.nii.gz` + 肺野掩膜 -> `output_dir/X_vessel_mask.nii.gz`.
///
/// 肺野掩膜在 `mask_dir` 下查找, 规则见 [`find_companion`].
#[derive(Debug, Clone)]
pub struct VesselBatch {
    input_dir: PathBuf,
    mask_dir: PathBuf,
    output_dir: PathBuf,
    enhancer: VesselEnhancer,
    dump_dir: Option<PathBuf>,
}

impl VesselBatch {
    /// 检查配置并创建批处理任务.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>, R: Into<PathBuf>>(
        input_dir: P,
        mask_dir: Q,
        output_dir: R,
        config: VesselConfig,
    ) -> SegmentResult<Self> {
        Ok(Self {
            input_dir: input_dir.into(),
            mask_dir: mask_dir.into(),
            output_dir: output_dir.into(),
            enhancer: VesselEnhancer::new(config)?,
            dump_dir: None,
        })
    }

    /// 同时将所有中间结果写入 `dir`.
    pub fn with_stage_dump<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// 处理 `input_dir` 下的所有 CT 扫描. 必要时创建输出目录.
    ///
    /// 只有列出输入目录或创建输出目录失败时才返回 `Err`.
    pub fn run(&self) -> SegmentResult<BatchReport> {
        fs::create_dir_all(&self.output_dir)?;
        if let Some(d) = &self.dump_dir {
            fs::create_dir_all(d)?;
        }
        let inputs = list_volumes(&self.input_dir)?;
        Ok(run_batch(self, &inputs))
    }
}

impl BatchJob for VesselBatch {
    #[inline]
    fn stage(&self) -> Stage {
        Stage::Vessel
    }

    fn output_for(&self, input: &Path) -> Option<PathBuf> {
        let stem = volume_stem(input)?;
        Some(self.output_dir.join(vessel_mask_name(stem)))
    }

    fn process(&self, input: &Path, output: &Path) -> SegmentResult<()> {
        let mask_path = find_companion(&self.mask_dir, input)?;
        let volume = CtVolume::open(input)?;
        let lung = BinaryMask::open(&mask_path)?;
        log::debug!(
            "[{}] `{}` paired with `{}`",
            self.stage(),
            input.display(),
            mask_path.display()
        );

        let stages = self.enhancer.segment_with_stages(&volume, &lung)?;
        if let (Some(dir), Some(stem)) = (&self.dump_dir, volume_stem(input)) {
            let written = stages.save_all(&volume, dir, stem)?;
            log::debug!("[{}] dumped {} stage files", self.stage(), written.len());
        }
        log::info!(
            "[{}] {} vessel voxels ({:.1} ml), threshold {:.4}",
            self.stage(),
            stages.mask.count(),
            stages.mask.volume_mm3() / 1000.0,
            stages.threshold
        );
        stages.mask.save(output)
    }
}
