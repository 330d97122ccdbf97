//! Single writer thread for SQLite mutations.
//!
//! Every job runs inside an immediate transaction on the writer thread, so a
//! job either commits completely or not at all.

use diesel::sqlite::SqliteConnection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use migraineme_core::errors::{DatabaseError, Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(Result<&mut SqliteConnection>) + Send + 'static>;

/// Application error or a diesel error raised while managing the transaction.
enum TxError {
    App(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

impl From<TxError> for Error {
    fn from(err: TxError) -> Self {
        match err {
            TxError::App(e) => e,
            TxError::Diesel(e) => StorageError::from(e).into(),
        }
    }
}

#[derive(Clone)]
pub struct WriteHandle {
    sender: mpsc::UnboundedSender<Job>,
}

impl WriteHandle {
    /// Runs `job` on the writer thread inside an immediate transaction.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let boxed: Job = Box::new(move |conn| {
            let result = conn.and_then(|conn| {
                conn.immediate_transaction::<T, TxError, _>(|tx_conn| {
                    job(tx_conn).map_err(TxError::App)
                })
                .map_err(Error::from)
            });
            let _ = reply_tx.send(result);
        });

        self.sender.send(boxed).map_err(|_| writer_stopped())?;
        reply_rx.await.map_err(|_| writer_stopped())?
    }
}

fn writer_stopped() -> Error {
    Error::Database(DatabaseError::Internal(
        "SQLite writer is not running".to_string(),
    ))
}

/// Spawns the writer thread. It exits once every `WriteHandle` is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

    let spawned = std::thread::Builder::new()
        .name("sqlite-writer".to_string())
        .spawn(move || {
            while let Some(job) = receiver.blocking_recv() {
                match pool.get() {
                    Ok(mut conn) => job(Ok(&mut *conn)),
                    Err(e) => job(Err(StorageError::from(e).into())),
                }
            }
        });

    if let Err(e) = spawned {
        error!("[Storage] Failed to spawn SQLite writer thread: {}", e);
    }

    WriteHandle { sender }
}
