//! 程序运行函数.

use crate::result::{describe_store, describe_summary};
use crate::Cli;
use log::{info, warn};
use mre_berry::prelude::*;
use std::io;
use utils::{loader, sep};

/// 实际运行.
pub fn run(cli: &Cli) -> MreResult<()> {
    let data_dir = match &cli.data_dir {
        Some(d) => Some(d.clone()),
        None if cli.from_file.is_none() => loader::data_dir_from_env_or_home(),
        None => None,
    };
    let config = match &cli.from_file {
        Some(_) => None,
        None => Some(loader::config_or_default(cli.config.as_ref())?),
    };

    match XrSource::from_options(data_dir, config, cli.from_file.clone())? {
        XrSource::FromFile(path) => {
            info!("打开仓库 {}", path.display());
            let store = open_store(&path)?;
            sep();
            describe_store(&store, io::stdout().lock())?;
        }
        XrSource::Build { data_dir, config } => {
            if !data_dir.is_dir() {
                return Err(MreError::Config(format!(
                    "数据目录 {} 不存在",
                    data_dir.display()
                )));
            }
            let weights = cli.weights.as_ref().ok_or_else(|| {
                MreError::Predictor("构建仓库需要肝脏分割预测器权重 (--weights)".into())
            })?;
            let predictor = Box::new(Conv3dPredictor::open(weights)?);
            let registration: Box<dyn Registration> = if cli.geometric {
                Box::new(GeometricRegistration)
            } else {
                Box::new(AxialShiftRegistration)
            };

            let mut pipeline = MreToXr::new(data_dir, config, predictor, registration)?;
            info!("共 {} 个受试者", pipeline.subjects().len());
            let summary = pipeline.run()?;

            if let Some(dir) = &cli.diagnostics {
                std::fs::create_dir_all(dir)?;
                for report in summary.reports() {
                    let path = dir.join(format!("{}_std.png", report.subject));
                    if let Err(e) = report.save_plot(&path) {
                        warn!("无法写入诊断图 {}: {e}", path.display());
                    }
                }
            }
            sep();
            describe_summary(&summary, io::stdout().lock())?;
        }
    }
    Ok(())
}
