//! 从受试者数据目录构建 MRI/MRE 多维数组仓库, 或打开已保存的仓库并打印摘要.

mod result;
mod runner;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// 命令行参数.
#[derive(Parser, Debug)]
#[command(name = "build-xr")]
#[command(about = "Assemble aligned MRI/MRE volumes into a labeled array store")]
#[command(version)]
pub struct Cli {
    /// 受试者数据目录. 默认取 `$MRE_DATA_DIR` 或 `$HOME/dataset/mre`.
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// TOML 配置文件. 省略时使用默认配置.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// 打开已保存的仓库并打印摘要, 不运行流水线.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["data_dir", "config"])]
    pub from_file: Option<PathBuf>,

    /// 肝脏分割预测器权重 (npz).
    #[arg(short, long, value_name = "FILE")]
    pub weights: Option<PathBuf>,

    /// 每个受试者的切片定位诊断图输出目录.
    #[arg(long, value_name = "DIR")]
    pub diagnostics: Option<PathBuf>,

    /// 只用几何关系配准, 不做轴向平移搜索.
    #[arg(long)]
    pub geometric: bool,

    /// 更详细的日志. 可重复.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// 只输出警告和错误.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    fn log_level(&self) -> log::LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => log::LevelFilter::Warn,
            (false, 0) => log::LevelFilter::Info,
            (false, 1) => log::LevelFilter::Debug,
            (false, _) => log::LevelFilter::Trace,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(cli.log_level())
        .init()
    {
        eprintln!("无法初始化日志: {e}");
    }

    match runner::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
