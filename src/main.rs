//! Orchestron 命令行入口
//!
//! 加载 .env 与配置、装配框架，然后执行 list / run / chain / agent 并以 JSON 打印结果。
//! 任何校验或执行失败都打印到 stderr 并以非零码退出。

use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use orchestron::cli::{self, Cli};
use orchestron::config::load_config;
use orchestron::core::FrameworkBuilder;
use orchestron::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    observability::init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let run_timeout = config.app.run_timeout_secs;

    let mut builder = FrameworkBuilder::new(config);
    if let Some(dir) = &cli.units_dir {
        builder = builder.with_units_dir(dir);
    }
    let framework = builder.build();

    let task = cli::execute(cli.command, &builder, &framework);
    let output = match run_timeout {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), task)
            .await
            .map_err(|_| anyhow!("run timed out after {secs}s"))??,
        None => task.await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
