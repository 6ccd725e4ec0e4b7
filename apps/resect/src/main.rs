//! 切除腔体提取命令行工具.
//!
//! 读取外部工具 (偏置场校正、颅骨剥离、脑区分割、配准) 已准备好的文件,
//! 输出原始术前分辨率下的切除腔体掩膜 `<output_dir>/<prefix>_resection_mask.nii.gz`.

mod args;
mod config;
mod report;
mod runner;

use std::process::ExitCode;

use args::{Args, USAGE};
use config::AppConfig;

fn main() -> ExitCode {
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
    {
        eprintln!("failed to initialise logging: {e}");
    }

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match AppConfig::load().and_then(|cfg| runner::run(&args, &cfg)) {
        Ok(report) => {
            if let Err(e) = report.print() {
                log::warn!("Cannot print the run report: {e}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
