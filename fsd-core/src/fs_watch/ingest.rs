use std::path::Path;
use std::sync::Arc;

use notify::Event;
use notify::event::{EventKind, ModifyKind, RenameMode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::fs_watch::WatchStreams;
use crate::ipc::{Broadcaster, FsdOp, Message, OpSet};

/// Translate one watcher event into bus messages, one per path.
///
/// A rename reported with both ends yields `Rename(old)` then `Create(new)`;
/// the arriving end of a split rename is a `Create`. Kinds without any known
/// operation bits come back as [`FsdOp::Invalid`] for the caller to drop.
pub fn messages_from_event(event: &Event) -> Vec<Message> {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            vec![
                Message::new(path_name(&event.paths[0]), FsdOp::Rename),
                Message::new(path_name(&event.paths[1]), FsdOp::Create),
            ]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .map(|path| Message::new(path_name(path), FsdOp::Create))
            .collect(),
        ref kind => {
            let op = FsdOp::from_op_set(OpSet::from_event_kind(kind));
            event
                .paths
                .iter()
                .map(|path| Message::new(path_name(path), op))
                .collect()
        }
    }
}

fn path_name(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Single reader of the watcher streams. Publishes every valid message and
/// logs watcher errors; returns when cancelled or when either stream closes.
pub async fn run_ingest(
    cancel: CancellationToken,
    mut streams: WatchStreams,
    broadcaster: Arc<Broadcaster>,
) {
    info!("fs ingest started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("fs ingest cancelled");
                break;
            }
            event = streams.events.recv() => {
                let Some(event) = event else {
                    debug!("fs event stream closed");
                    break;
                };
                for msg in messages_from_event(&event) {
                    if msg.operation == FsdOp::Invalid {
                        trace!(kind = ?event.kind, path = %msg.name, "ignoring unsupported fs event");
                        continue;
                    }
                    broadcaster.broadcast(msg).await;
                }
            }
            err = streams.errors.recv() => {
                let Some(err) = err else {
                    debug!("fs error stream closed");
                    break;
                };
                warn!("fs watcher error: {}", err);
            }
        }
    }

    info!("fs ingest stopped");
}
