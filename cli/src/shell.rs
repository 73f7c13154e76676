//! Interactive command loop.
//!
//! Runs on the main task and multiplexes two inputs: lines typed on stdin
//! and events surfaced by the node. File transfers are spawned so the prompt
//! stays responsive while chunks move.

use std::io::Write;
use std::path::PathBuf;

use lanlink_core::delivery::Delivery;
use lanlink_core::events::NodeEvent;
use lanlink_core::node::NodeHandle;
use lanlink_core::transfer::TransferOutcome;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use crate::terminal::{print, progress};

pub async fn run(node: NodeHandle, mut events: UnboundedReceiver<NodeEvent>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_command(&node, line.trim()).await {
                            break;
                        }
                        prompt();
                    }
                    // stdin closed
                    None => break,
                }
            }

            event = events.recv() => {
                match event {
                    Some(event) => {
                        show_event(event);
                        prompt();
                    }
                    None => break,
                }
            }
        }
    }

    info!("shutting down");
    node.shutdown();
    Ok(())
}

/// Returns false when the shell should exit.
async fn handle_command(node: &NodeHandle, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }

    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "peers" | "devices" => print::peer_table(&node.peers()),
        "talk" => talk(node, rest.trim()).await,
        "send" | "sendfile" => send(node, rest.trim()),
        "help" => print::usage(),
        "quit" | "exit" => return false,
        other => {
            warn!("unknown command `{other}`");
            print::usage();
        }
    }
    true
}

async fn talk(node: &NodeHandle, rest: &str) {
    let Some((peer, body)) = rest.split_once(' ') else {
        warn!("usage: talk <peer> <message>");
        return;
    };

    match node.talk(peer, body).await {
        Ok(Delivery::Delivered) => info!("message delivered to {peer}"),
        Ok(Delivery::Rejected(reason)) => warn!("{peer} rejected the message: {reason}"),
        Ok(Delivery::Exhausted) => error!("no confirmation from {peer}, giving up"),
        Err(e) => error!("{e:#}"),
    }
}

fn send(node: &NodeHandle, rest: &str) {
    let Some((peer, path)) = rest.split_once(' ') else {
        warn!("usage: send <peer> <path>");
        return;
    };

    let node = node.clone();
    let peer = peer.to_string();
    let path = PathBuf::from(path);

    tokio::spawn(async move {
        let bar = progress::transfer_bar(&path);
        let result = node
            .send_file(&peer, &path, |delivered, total| {
                bar.set_length(total as u64);
                bar.set_position(delivered as u64);
            })
            .await;
        bar.finish_and_clear();

        match result {
            Ok(TransferOutcome::Completed { chunks }) => {
                info!("{} delivered to {peer} ({chunks} chunks)", path.display());
            }
            Ok(TransferOutcome::Rejected { reason }) => {
                warn!("{peer} rejected the transfer: {reason}");
            }
            Ok(TransferOutcome::Exhausted) => {
                error!("transfer to {peer} got no confirmation, giving up");
            }
            Err(e) => error!("{e:#}"),
        }
    });
}

fn show_event(event: NodeEvent) {
    match event {
        NodeEvent::Message { from, body } => print::message(&from, &body),
        NodeEvent::TransferStarted {
            from,
            file_name,
            size,
        } => info!("receiving {file_name} ({size} bytes) from {from}"),
        NodeEvent::TransferFinished {
            from,
            file_name,
            path,
        } => info!("{file_name} from {from} saved to {}", path.display()),
        NodeEvent::TransferFailed {
            from,
            file_name,
            reason,
        } => warn!("transfer of {file_name} from {from} failed: {reason}"),
        NodeEvent::PeerLost { name } => info!("peer {name} timed out"),
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
