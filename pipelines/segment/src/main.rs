//! 肺野与肺血管分割批处理程序.
//!
//! ```bash
//! # 肺野分割, 目录取环境变量或 $HOME/dataset/lung 下的默认值
//! segment lung
//!
//! # 指定目录与配置文件, 运行两个阶段, 并导出血管阶段的中间结果
//! segment --config lung.toml all -i ./img -m ./lung_mask -o ./vessel --dump-stages ./stages
//! ```

use clap::Parser;
use std::process::ExitCode;

mod result;
mod runner;

use runner::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(cli.log_level())
        .init()
    {
        eprintln!("logger init failed: {e}");
    }

    let threads = cli.threads.unwrap_or_else(utils::cpus);
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        log::warn!("cannot resize global thread pool: {e}");
    }
    log::debug!("running with {} worker threads", rayon::current_num_threads());

    match runner::run(&cli) {
        Ok(reports) => {
            result::summarize(&reports);
            if reports.iter().any(|r| r.failed() != 0) {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
