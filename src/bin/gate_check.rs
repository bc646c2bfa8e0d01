//! 准入检查工具
//!
//! 按配置构造 Gatekeeper，对指定地址连续发起生成请求检查并打印结果。
//!
//! 用法: `gate_check [--config <file>] [--commit] <ip> [count]`

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tiergate::prelude::*;
use tiergate::StoreFactory;

struct Args {
    config: Option<PathBuf>,
    commit: bool,
    addr: String,
    count: u32,
}

fn parse_args() -> Result<Args> {
    let mut config = None;
    let mut commit = false;
    let mut positional = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config 需要一个文件路径")?;
                config = Some(PathBuf::from(path));
            }
            "--commit" => commit = true,
            "--help" | "-h" => {
                println!("用法: gate_check [--config <file>] [--commit] <ip> [count]");
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("未知参数: {}", other),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let addr = positional.next().context("缺少客户端地址参数")?;
    let count = match positional.next() {
        Some(n) => n.parse().with_context(|| format!("无效的次数: {}", n))?,
        None => 11,
    };

    Ok(Args {
        config,
        commit,
        addr,
        count,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(feature = "telemetry")]
    tiergate::init_tracing("tiergate=info");

    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => GateConfig::from_file(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => GateConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;

    let gate = StoreFactory::gatekeeper(&config).await?.build();
    println!(
        "=== 准入检查 backend={} fallback={} ===",
        gate.backend_name(),
        config.fallback
    );

    let request = RequestContext::new().with_header("x-real-ip", &args.addr);
    for i in 1..=args.count {
        match gate.admit_generation(&request, None).await {
            Ok(admission) => {
                let headers = admission
                    .headers()
                    .into_iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "#{:<3} 200 {}{}",
                    i,
                    headers,
                    if admission.degraded() { " (degraded)" } else { "" }
                );
                if args.commit {
                    gate.commit_generation(&admission).await?;
                }
            }
            Err(rejection) => {
                let body = serde_json::to_string(&rejection.body())?;
                println!("#{:<3} {} {}", i, rejection.status(), body);
            }
        }
    }

    Ok(())
}
