//! # Quorum Node
//!
//! Runs a coordinator and a pool of validator workers, and turns
//! newline-delimited JSON transaction requests on stdin into one verdict
//! line each on stdout.
//!
//! With `QG_BROKER=amqp` the node talks to a network broker, and `QG_ROLE`
//! can split the deployment: `coordinator` nodes serve stdin, `worker` nodes
//! only validate until Ctrl-C.
//!
//! ```text
//! stdin ──TransactionRequest──→ Coordinator ──fanout──→ Workers (xN)
//!                                    ↑                      │
//! stdout ←─{transaction_id,      reply queue ←──responses───┘
//!           is_compliant}
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, then `QG_*` environment overrides)
//! 2. Start the in-process broker, or resolve the network one
//! 3. Subscribe the workers, each on its own connection
//! 4. Start the coordinator
//! 5. Read requests until EOF or Ctrl-C

use anyhow::{Context, Result};
use node_runtime::{handle_line, load_config, NodeContainer};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config().context("Invalid configuration")?;
    info!(
        role = %config.role,
        broker = ?config.broker,
        quorum_threshold = config.coordinator.quorum_threshold,
        deadline_ms = config.coordinator.deadline.as_millis() as u64,
        workers = config.workers.count,
        "[node] Configuration loaded"
    );

    let node = NodeContainer::start(&config).await?;
    let Some(coordinator) = node.coordinator() else {
        info!("[node] Worker node running. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("[node] Interrupted");
        node.shutdown().await;
        return Ok(());
    };

    info!("[node] Reading requests from stdin. Press Ctrl+C to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut submissions = JoinSet::new();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let coordinator = coordinator.clone();
                        submissions.spawn(async move {
                            handle_line(coordinator.as_ref(), &line).await
                        });
                    }
                    Ok(None) => {
                        info!("[node] End of input");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "[node] Failed to read stdin");
                        break;
                    }
                }
            }
            Some(joined) = submissions.join_next(), if !submissions.is_empty() => {
                print_outcome(joined);
            }
            _ = &mut interrupted => {
                info!("[node] Interrupted");
                submissions.abort_all();
                break;
            }
        }
    }

    while let Some(joined) = submissions.join_next().await {
        print_outcome(joined);
    }

    node.shutdown().await;
    Ok(())
}

fn print_outcome(
    joined: Result<Option<node_runtime::SubmissionOutput>, tokio::task::JoinError>,
) {
    match joined {
        Ok(Some(output)) => match serde_json::to_string(&output) {
            Ok(line) => println!("{line}"),
            Err(e) => error!(error = %e, "[node] Failed to encode output"),
        },
        Ok(None) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!(error = %e, "[node] Submission task failed"),
    }
}
