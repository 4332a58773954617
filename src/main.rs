use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use xray_stats_setup::patch_file;

/// 为 Xray 配置开启流量统计 API (原地修改)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 服务器配置文件路径 (允许以 `-` 开头)
    #[arg(allow_hyphen_values = true)]
    config: PathBuf,
}

fn main() -> Result<()> {
    // 缺少参数时以 1 退出, --help / --version 照常以 0 退出
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };

    // 初始化日志
    // 优先使用环境变量 RUST_LOG, 默认只输出警告及以上
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let outcome = patch_file(&args.config)
        .with_context(|| format!("无法更新配置文件: {}", args.config.display()))?;

    debug!(
        "来源: {:?}, 生效规则: {:?}",
        outcome.origin, outcome.report.applied
    );

    Ok(())
}
