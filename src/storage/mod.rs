use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use log::{error, info};
use tokio::sync::oneshot;

use crate::error::{TrackerError, TrackerResult};

pub(crate) mod files;
pub mod index;
pub mod masks;
pub mod sessions;


pub use index::RebuildReport;

const SESSIONS_DIR: &str = "sessions";
const MASKS_DIR: &str = "masks";
const INDEX_DIR: &str = "index";
const INDEX_FILE: &str = "index.json";

/// Where every persisted record lives under the data root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    sessions_dir: PathBuf,
    masks_dir: PathBuf,
    index_path: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            sessions_dir: root.join(SESSIONS_DIR),
            masks_dir: root.join(MASKS_DIR),
            index_path: root.join(INDEX_DIR).join(INDEX_FILE),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    pub fn masks_dir(&self) -> &Path {
        &self.masks_dir
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn session_path(&self, session_id: &str, date: NaiveDate) -> PathBuf {
        self.sessions_dir
            .join(date.format("%Y-%m-%d").to_string())
            .join(format!("{session_id}.json"))
    }

    pub fn mask_path(&self, session_id: &str, date: NaiveDate) -> PathBuf {
        self.masks_dir
            .join(format!("{session_id}_{}.json", date.format("%Y-%m-%d")))
    }

    fn create_dirs(&self) -> anyhow::Result<()> {
        for dir in [
            &self.sessions_dir,
            &self.masks_dir,
            &self.root.join(INDEX_DIR),
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

type StorageTask = Box<dyn FnOnce(&StorageLayout) + Send + 'static>;

enum StorageCommand {
    Execute(StorageTask),
    Shutdown,
}

struct StorageInner {
    sender: mpsc::Sender<StorageCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StorageCommand::Shutdown) {
                error!("Failed to send shutdown to storage thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join storage thread: {join_err:?}");
            }
        }
    }
}

/// Handle to the single storage writer.
///
/// Every read and write runs on one dedicated thread in submission order, so
/// two saves of the same session never interleave and the index file is only
/// ever read-modified-written by one task at a time.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
    layout: Arc<StorageLayout>,
}

impl Storage {
    pub fn open(layout: StorageLayout) -> anyhow::Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<StorageCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let layout_for_thread = layout.clone();

        let worker = thread::Builder::new()
            .name("pomatrack-storage".into())
            .spawn(move || {
                let init_result = layout_for_thread.create_dirs();
                let failed = init_result.is_err();
                if ready_tx.send(init_result).is_err() {
                    error!("Storage initialization receiver dropped before ready signal");
                    return;
                }
                if failed {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StorageCommand::Execute(task) => {
                            task(&layout_for_thread);
                        }
                        StorageCommand::Shutdown => break,
                    }
                }

                info!("Storage thread shutting down");
            })
            .with_context(|| "failed to spawn storage worker thread")?;

        ready_rx
            .recv()
            .context("storage worker exited before signaling readiness")??;

        info!("Storage initialized at {}", layout.root().display());

        Ok(Self {
            inner: Arc::new(StorageInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            layout: Arc::new(layout),
        })
    }

    pub fn layout(&self) -> &StorageLayout {
        self.layout.as_ref()
    }

    pub async fn execute<F, T>(&self, task: F) -> TrackerResult<T>
    where
        F: FnOnce(&StorageLayout) -> TrackerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StorageCommand::Execute(Box::new(move |layout| {
            let result = task(layout);
            if reply_tx.send(result).is_err() {
                error!("Storage caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to storage thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| TrackerError::from(anyhow!("storage thread terminated unexpectedly")))?
    }
}
