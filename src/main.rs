//! Hive 命令行入口
//!
//! 用法：`hive <expert-key> <query>`。加载配置与 experts 文件，运行到结束，打印事件与最终回复。

use std::sync::Arc;

use anyhow::{bail, Context};
use hive::config::{load_config, load_experts};
use hive::engine::Engine;
use hive::llm::create_adapter;
use hive::model::{CheckpointStatus, EngineEvent, RuntimeEventKind};
use hive::observability;
use hive::storage::InMemoryStorage;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (expert_key, query) = match args.as_slice() {
        [expert, rest @ ..] if !rest.is_empty() => (expert.clone(), rest.join(" ")),
        _ => bail!("usage: hive <expert-key> <query>"),
    };

    let config = load_config(None).context("Failed to load config")?;
    let experts = load_experts(&config.app.experts_file)
        .with_context(|| format!("Failed to load experts from {}", config.app.experts_file.display()))?;
    let setting = config.run_setting(&expert_key, &query, experts)?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::Run(event) => {
                    eprintln!("[{}] step {} {}", event.expert_key, event.step_number, event.name());
                }
                EngineEvent::Runtime(event) => {
                    if let RuntimeEventKind::StreamRunResult { delta } = event.kind {
                        eprint!("{delta}");
                    }
                }
            }
        }
    });

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let engine = Engine::new(create_adapter(&setting.provider_config))
        .with_storage(Arc::new(InMemoryStorage::new()))
        .with_listener(tx)
        .with_streaming(true)
        .with_cancellation(cancel)
        .with_tool_timeout(std::time::Duration::from_secs(config.run.tool_timeout_secs));

    let result = engine.run(setting, None).await;
    drop(engine);
    let _ = printer.await;

    let checkpoint = result.context("Run failed")?;
    match checkpoint.status {
        CheckpointStatus::Completed => {
            println!("{}", checkpoint.final_text().unwrap_or_default());
            Ok(())
        }
        status => bail!("run stopped with status {status}"),
    }
}
