//! `tts`, `chat` and `run` commands.
//!
//! Spawns the requested nodes on an in-process bus and drives them from
//! stdin through the [`Console`]. On end of input the session lingers until
//! every submitted line has been answered, or [`EOF_GRACE`] runs out.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ailinker_bus::MemoryHub;
use ailinker_core::BusPort;

use super::console::{CONSOLE_NODE, CONSOLE_TOPICS, Console, Feed, parse_line};
use crate::bootstrap::CliContext;

/// How long to wait for outstanding replies after stdin closes.
pub const EOF_GRACE: Duration = Duration::from_secs(30);

type NodeTask = JoinHandle<Result<()>>;

pub async fn execute(ctx: &CliContext, feed: Feed) -> Result<()> {
    let hub = MemoryHub::new();
    let shutdown = CancellationToken::new();
    let tasks = spawn_nodes(ctx, &hub, feed, &shutdown)?;

    let bus = hub.connect(CONSOLE_NODE, &CONSOLE_TOPICS);
    bus.start_transport().context("Failed to start console endpoint")?;
    let mut console = Console::new(bus, feed);

    let tick = Duration::from_millis(ctx.config.node.tick_ms.max(1));
    let result = drive(&mut console, tick).await;

    shutdown.cancel();
    for task in tasks {
        task.await.context("Node task panicked")??;
    }
    console.drain();
    result
}

fn spawn_nodes(ctx: &CliContext, hub: &MemoryHub, feed: Feed, shutdown: &CancellationToken) -> Result<Vec<NodeTask>> {
    let mut tasks: Vec<NodeTask> = Vec::with_capacity(2);

    if matches!(feed, Feed::ChatOnly | Feed::Pipeline) {
        let mut node = ctx.chat_node(hub)?;
        let token = shutdown.clone();
        tasks.push(tokio::spawn(async move { Ok(node.run(token).await?) }));
    }

    if matches!(feed, Feed::Pipeline | Feed::Speech) {
        let mut node = ctx.tts_node(hub)?;
        let token = shutdown.clone();
        tasks.push(tokio::spawn(async move { Ok(node.run(token).await?) }));
    }

    Ok(tasks)
}

async fn drive(console: &mut Console, tick: Duration) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut deadline: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("Interrupted");
                break;
            }
            line = lines.next_line(), if deadline.is_none() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        if !console.submit(parse_line(&line)) {
                            break;
                        }
                    }
                    None => deadline = Some(tokio::time::Instant::now() + EOF_GRACE),
                }
            }
            () = tokio::time::sleep(tick) => {
                console.drain();
                if let Some(deadline) = deadline {
                    if console.pending() == 0 {
                        break;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        tracing::warn!(pending = console.pending(), "Gave up waiting for replies");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}
