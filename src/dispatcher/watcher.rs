//! The inbox filesystem watcher: watches the durable inbox
//! directory and signals a job id for every file *creation*, deliberately
//! ignoring modification events so platforms that fire both for a single
//! new file don't get the same job dispatched twice. Grounded on
//! `original_source/plastron-stomp/.../inbox_watcher.py`'s explicit
//! avoidance of duplicate processing, and on the `notify`-based watcher
//! pattern used elsewhere in the example pack (`config/src/watch.rs`).

use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Owns the OS-level watch handle for as long as the dispatcher is
/// running; dropping it stops the watch.
pub struct InboxWatcher {
    _watcher: RecommendedWatcher,
}

impl InboxWatcher {
    /// Start watching `dir`, sending the job id implied by each newly
    /// created file's name to `tx`. The caller recovers the job id from
    /// the encoded filename itself (see `boxes::MessageBox::job_ids`),
    /// since a raw `notify` event only carries a path.
    pub fn watch(dir: &Path, tx: UnboundedSender<std::path::PathBuf>) -> notify::Result<Self> {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_)) {
                        return;
                    }
                    for path in event.paths {
                        if path.extension().is_some_and(|ext| ext == "tmp") {
                            continue;
                        }
                        debug!(path = %path.display(), "inbox watcher observed a new file");
                        if tx.send(path).is_err() {
                            warn!("inbox watcher channel closed; dispatcher may be shutting down");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "inbox watch error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(Self { _watcher: watcher })
    }
}
