//! 命令行参数与程序运行函数.

use clap::{Args, Parser, Subcommand};
use lung_berry::dataset::{BatchReport, LungBatch, VesselBatch};
use lung_berry::{SegmentConfig, SegmentResult};
use std::io;
use std::path::{Path, PathBuf};
use utils::loader;

/// 3D 胸部 CT 肺野与肺血管分割.
#[derive(Parser, Debug)]
#[command(name = "segment", version, about, long_about = None)]
pub struct Cli {
    /// toml 配置文件. 未给出的字段取默认值.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 并行处理的线程数. 默认等于可用核心数.
    ///
    /// 每个线程同时处理一个文件. 血管阶段每个文件需要约 `40 * 体素数` 字节内存
    /// (例如 512x512x400 的扫描约 4 GB, 其中 Hessian 约 2.5 GB),
    /// 内存有限时应调小该值.
    #[arg(short = 'j', long, global = true)]
    pub threads: Option<usize>,

    /// 输出调试日志.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// 日志级别.
    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}

/// 子命令.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// 肺野分割: 对每个 `X.nii.gz` 输出 `X_lung_mask.nii.gz`.
    Lung(LungArgs),

    /// 肺血管分割: 需要先有肺野掩膜. 对每个 `X.nii.gz` 输出 `X_vessel_mask.nii.gz`.
    Vessel(VesselArgs),

    /// 依次运行肺野分割与肺血管分割.
    All(VesselArgs),
}

/// `lung` 子命令参数.
#[derive(Args, Debug)]
pub struct LungArgs {
    /// CT 扫描目录 [默认: $LUNG_IMG_DIR 或 ~/dataset/lung/img]
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// 肺野掩膜输出目录 [默认: $LUNG_MASK_DIR 或 ~/dataset/lung/lung_mask]
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// `vessel` 与 `all` 子命令参数.
#[derive(Args, Debug)]
pub struct VesselArgs {
    /// CT 扫描目录 [默认: $LUNG_IMG_DIR 或 ~/dataset/lung/img]
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// 肺野掩膜目录 [默认: $LUNG_MASK_DIR 或 ~/dataset/lung/lung_mask]
    #[arg(short, long)]
    pub mask: Option<PathBuf>,

    /// 血管掩膜输出目录 [默认: $LUNG_VESSEL_DIR 或 ~/dataset/lung/vessel]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 将血管阶段的所有中间结果写入该目录.
    #[arg(long, value_name = "DIR")]
    pub dump_stages: Option<PathBuf>,
}

/// 命令行给出的目录优先, 否则使用默认目录.
fn resolve_dir(
    given: &Option<PathBuf>,
    fallback: fn() -> Option<PathBuf>,
    what: &str,
) -> SegmentResult<PathBuf> {
    given.clone().or_else(fallback).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no {what} directory given and home directory unavailable"),
        )
        .into()
    })
}

fn load_config(path: Option<&Path>) -> SegmentResult<SegmentConfig> {
    let config = match path {
        Some(p) => {
            log::info!("loading config from `{}`", p.display());
            SegmentConfig::from_toml_file(p)?
        }
        None => SegmentConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run_lung(args: &LungArgs, config: &SegmentConfig) -> SegmentResult<BatchReport> {
    let input = resolve_dir(&args.input, loader::img_dir_from_env_or_home, "input")?;
    let output = resolve_dir(&args.output, loader::mask_dir_from_env_or_home, "output")?;
    log::info!("lung: `{}` -> `{}`", input.display(), output.display());
    LungBatch::new(input, output, config.lung.clone())?.run()
}

fn run_vessel(args: &VesselArgs, config: &SegmentConfig) -> SegmentResult<BatchReport> {
    let input = resolve_dir(&args.input, loader::img_dir_from_env_or_home, "input")?;
    let mask = resolve_dir(&args.mask, loader::mask_dir_from_env_or_home, "mask")?;
    let output = resolve_dir(&args.output, loader::vessel_dir_from_env_or_home, "output")?;
    log::info!(
        "vessel: `{}` + `{}` -> `{}`",
        input.display(),
        mask.display(),
        output.display()
    );
    let mut batch = VesselBatch::new(input, mask, output, config.vessel.clone())?;
    if let Some(d) = &args.dump_stages {
        batch = batch.with_stage_dump(d);
    }
    batch.run()
}

/// 实际运行. 返回每个阶段的批处理报告.
///
/// 单个文件的失败记录在报告中; 只有配置错误或目录不可用时返回 `Err`.
pub fn run(cli: &Cli) -> SegmentResult<Vec<BatchReport>> {
    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Command::Lung(args) => Ok(vec![run_lung(args, &config)?]),
        Command::Vessel(args) => Ok(vec![run_vessel(args, &config)?]),
        Command::All(args) => {
            let lung_args = LungArgs {
                input: args.input.clone(),
                output: args.mask.clone(),
            };
            let lung = run_lung(&lung_args, &config)?;
            if lung.processed() + lung.skipped() == 0 && !lung.is_empty() {
                log::warn!("no lung mask produced, vessel stage will find no companions");
            }
            let vessel = run_vessel(args, &config)?;
            Ok(vec![lung, vessel])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsString;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_all() {
        let cli = Cli::try_parse_from([
            "segment", "all", "-i", "img", "-m", "masks", "-o", "out", "--dump-stages", "st", "-j",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.threads, Some(2));
        match cli.command {
            Command::All(a) => {
                assert_eq!(a.input, Some(PathBuf::from("img")));
                assert_eq!(a.mask, Some(PathBuf::from("masks")));
                assert_eq!(a.dump_stages, Some(PathBuf::from("st")));
            }
            c => panic!("unexpected command {c:?}"),
        }
    }

    #[test]
    fn test_run_on_empty_dir() {
        let root = tempfile::tempdir().unwrap();
        let img = root.path().join("img");
        std::fs::create_dir(&img).unwrap();
        let out = root.path().join("out");
        let args: Vec<OsString> = vec![
            "segment".into(),
            "lung".into(),
            "-i".into(),
            img.clone().into_os_string(),
            "-o".into(),
            out.clone().into_os_string(),
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        let reports = run(&cli).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_empty());
        assert!(out.is_dir());
    }
}
