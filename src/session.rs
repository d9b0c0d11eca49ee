//! Process-wide remover session
//!
//! Loading a segmentation model is expensive, so the remover is built once
//! and shared. Concurrent first callers wait on the same initialization.

use crate::error::{PackshotError, Result};
use crate::inference::BackgroundRemover;
use instant::Instant;
use std::sync::Arc;
use tokio::sync::OnceCell;

type RemoverFactory = Arc<dyn Fn() -> Result<Arc<dyn BackgroundRemover>> + Send + Sync>;

/// Lazily or eagerly initialized shared remover
pub struct RemoverSession {
    cell: OnceCell<Arc<dyn BackgroundRemover>>,
    factory: RemoverFactory,
}

impl std::fmt::Debug for RemoverSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoverSession")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl RemoverSession {
    /// Session that builds its remover on first use
    ///
    /// The factory runs on the blocking thread pool at most once per
    /// successful initialization; a failed attempt is retried by the next caller.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn BackgroundRemover>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Arc::new(factory),
        }
    }

    /// Session around an already constructed remover
    #[must_use]
    pub fn from_remover(remover: Arc<dyn BackgroundRemover>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(remover)),
            factory: Arc::new(|| Err(PackshotError::internal("remover session already initialized"))),
        }
    }

    /// Shared remover, initializing it if this is the first call
    ///
    /// # Errors
    /// - Whatever the factory returns, typically `Model`
    /// - `Internal` when the initialization task panics
    pub async fn get(&self) -> Result<Arc<dyn BackgroundRemover>> {
        let remover = self
            .cell
            .get_or_try_init(|| async {
                let factory = Arc::clone(&self.factory);
                let start = Instant::now();
                let remover = tokio::task::spawn_blocking(move || factory())
                    .await
                    .map_err(|e| {
                        PackshotError::internal(format!("remover initialization task failed: {e}"))
                    })??;
                tracing::info!(
                    remover = remover.name(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Background remover session ready"
                );
                Ok::<_, PackshotError>(remover)
            })
            .await?;
        Ok(Arc::clone(remover))
    }

    /// Whether the remover has been built
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockRemover;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_initializes_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let session = Arc::new(RemoverSession::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(Arc::new(MockRemover::passthrough()) as Arc<dyn BackgroundRemover>)
        }));
        assert!(!session.is_initialized());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                tokio::spawn(async move { session.get().await.map(|r| r.name().to_string()) })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "mock:passthrough");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(session.is_initialized());
    }

    #[tokio::test]
    async fn test_failed_initialization_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let session = RemoverSession::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PackshotError::model("first load fails"))
            } else {
                Ok(Arc::new(MockRemover::passthrough()) as Arc<dyn BackgroundRemover>)
            }
        });

        let Err(err) = session.get().await else {
            panic!("first build should fail");
        };
        assert!(matches!(err, PackshotError::Model(_)));
        assert!(!session.is_initialized());

        assert!(session.get().await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_from_remover_is_ready() {
        let session = RemoverSession::from_remover(Arc::new(MockRemover::chroma_key(250)));
        assert!(session.is_initialized());
        let remover = session.get().await.unwrap();
        assert_eq!(remover.name(), "mock:chroma-key");
    }
}
