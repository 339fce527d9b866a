//! Daemon startup and shutdown.
//!
//! Startup prepares the watch root and database, subscribes every task to
//! the bus, starts ingest and binds the HTTP listener. Any failure there is
//! fatal. Shutdown cancels the root token, gives the HTTP server a bounded
//! grace period, closes the watcher and waits for tasks to drain.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fsd_config::Config;
use fsd_core::{
    Broadcaster, Database, FsWatcher, FsdError, RuntimeSettings, TaskContext, TaskKind,
    TaskRegistry, run_ingest,
};

use crate::infra::AppState;
use crate::routes::create_router;

pub const HTTP_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
pub const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to prepare watch root {path}")]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to open database {path}")]
    Database {
        path: PathBuf,
        #[source]
        source: FsdError,
    },
    #[error("failed to start filesystem watcher")]
    Watcher(#[source] FsdError),
    #[error("failed to start task runtime")]
    Tasks(#[source] FsdError),
    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("HTTP server failed")]
    Serve(#[source] io::Error),
}

/// Make `watch_dir` absolute and create it if missing.
pub fn prepare_root(watch_dir: &Path) -> io::Result<PathBuf> {
    let root = std::path::absolute(watch_dir)?;
    if !root.exists() {
        info!(path = %root.display(), "watch root does not exist, creating");
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }
        builder.create(&root)?;
    }
    Ok(root)
}

/// A running daemon.
pub struct Daemon {
    root: PathBuf,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    db: Database,
    watcher: Arc<FsWatcher>,
    broadcaster: Arc<Broadcaster>,
    server: JoinHandle<io::Result<()>>,
    tasks: JoinSet<TaskKind>,
    ingest: JoinHandle<()>,
}

impl fmt::Debug for Daemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Daemon")
            .field("root", &self.root)
            .field("local_addr", &self.local_addr)
            .field("running_tasks", &self.tasks.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Daemon {
    pub async fn start(config: Arc<Config>) -> Result<Self, StartupError> {
        let root = prepare_root(&config.watch_dir).map_err(|source| StartupError::Root {
            path: config.watch_dir.clone(),
            source,
        })?;
        info!(root = %root.display(), "watching");

        let db = open_database(config.db_path()).await?;

        let (watcher, streams) = FsWatcher::new().map_err(StartupError::Watcher)?;
        let watcher = Arc::new(watcher);
        let broadcaster = Arc::new(Broadcaster::new(config.broadcast_buffer_depth));

        let ctx = TaskContext {
            root: root.clone(),
            broadcaster: Arc::clone(&broadcaster),
            db: db.clone(),
            watcher: watcher.clone(),
            settings: RuntimeSettings {
                metadata_update_interval: config.metadata_update_interval,
                compaction_interval: config.compaction_interval,
                ..RuntimeSettings::default()
            },
        };
        let registry = TaskRegistry::init(&ctx, &TaskKind::ALL)
            .await
            .map_err(StartupError::Tasks)?;

        watcher.add(&root).map_err(StartupError::Watcher)?;

        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|source| StartupError::Bind {
                addr: config.listen_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| StartupError::Bind {
            addr: config.listen_addr.clone(),
            source,
        })?;

        let cancel = CancellationToken::new();
        let tasks = registry.run(&cancel);
        let ingest = tokio::spawn(run_ingest(
            cancel.child_token(),
            streams,
            Arc::clone(&broadcaster),
        ));

        let app = create_router(AppState::new(db.clone(), Arc::clone(&config), root.clone()));
        let server_stop = cancel.clone().cancelled_owned();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_stop)
                .await
        });
        info!(addr = %local_addr, "http server listening");

        Ok(Self {
            root,
            local_addr,
            cancel,
            db,
            watcher,
            broadcaster,
            server,
            tasks,
            ingest,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Run until `shutdown` resolves or the HTTP server stops on its own,
    /// then shut everything down.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()> + Send,
    {
        let server_result = tokio::select! {
            _ = shutdown => {
                info!("shutdown requested");
                None
            }
            joined = &mut self.server => Some(joined),
        };

        match server_result {
            None => {
                self.shutdown().await;
                Ok(())
            }
            Some(joined) => {
                error!("http server exited unexpectedly");
                self.stop_background().await;
                match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(StartupError::Serve(err)),
                    Err(err) => Err(StartupError::Serve(io::Error::other(err))),
                }
            }
        }
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();

        match tokio::time::timeout(HTTP_SHUTDOWN_GRACE, &mut self.server).await {
            Ok(Ok(Ok(()))) => info!("http server shut down"),
            Ok(Ok(Err(err))) => error!(error = %err, "http server shutdown failed"),
            Ok(Err(err)) => error!(error = %err, "http server task failed"),
            Err(_) => {
                warn!("http server did not stop within grace period, aborting");
                self.server.abort();
            }
        }

        self.stop_background().await;
    }

    async fn stop_background(mut self) {
        self.cancel.cancel();
        self.watcher.close();

        let drained = tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, async {
            while let Some(joined) = self.tasks.join_next().await {
                match joined {
                    Ok(kind) => info!(task = %kind, "task stopped"),
                    Err(err) => error!(error = %err, "task panicked"),
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = self.tasks.len(),
                "tasks did not stop in time, aborting"
            );
            self.tasks.abort_all();
        }

        if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, &mut self.ingest)
            .await
            .is_err()
        {
            warn!("fs ingest did not stop in time, aborting");
            self.ingest.abort();
        }

        self.db.close().await;
        info!("shutdown complete");
    }
}

async fn open_database(path: &Path) -> Result<Database, StartupError> {
    let to_err = |source: FsdError| StartupError::Database {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| to_err(err.into()))?;
    }
    let db = Database::open(path).await.map_err(to_err)?;
    db.initialize_schema().await.map_err(to_err)?;
    Ok(db)
}
