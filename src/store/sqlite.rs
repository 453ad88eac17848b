//! SQLite-backed key/value adapter.
//!
//! rusqlite connections are not `Send`, so a dedicated worker thread owns
//! the connection and callers hand it closures over an mpsc channel,
//! getting results back on a oneshot.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

use super::kv::KeyValueStore;

type KvTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum KvCommand {
    Execute(KvTask),
    Shutdown,
}

struct SqliteKvInner {
    sender: mpsc::Sender<KvCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SqliteKvInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(KvCommand::Shutdown) {
                error!("Failed to send shutdown to KV thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join KV thread: {join_err:?}");
            }
        }
    }
}

#[derive(Clone)]
pub struct SqliteKv {
    inner: Arc<SqliteKvInner>,
    db_path: Arc<PathBuf>,
}

impl SqliteKv {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create storage directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<KvCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("webtrail-kv".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite storage")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result = conn
                    .execute(
                        "CREATE TABLE IF NOT EXISTS swt_kv (
                             key TEXT PRIMARY KEY,
                             value TEXT NOT NULL
                         )",
                        [],
                    )
                    .map(|_| ())
                    .context("failed to initialize KV schema");
                if ready_tx.send(init_result).is_err() {
                    error!("KV initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        KvCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        KvCommand::Shutdown => break,
                    }
                }

                info!("KV thread shutting down");
            })
            .with_context(|| "failed to spawn KV worker thread")?;

        ready_rx
            .recv()
            .context("KV worker exited before signaling readiness")??;

        info!("KV storage initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(SqliteKvInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = KvCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("KV caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to KV thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("KV thread terminated unexpectedly"))?
    }
}

#[async_trait]
impl KeyValueStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare("SELECT value FROM swt_kv WHERE key = ?1")?;
            let mut rows = stmt.query(params![key])?;
            if let Some(row) = rows.next()? {
                Ok(Some(row.get::<_, String>(0)?))
            } else {
                Ok(None)
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO swt_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| "failed to upsert KV entry")?;
            Ok(())
        })
        .await
    }
}
