/*
 * Meeting Assistant CLI - Rust Edition
 * Copyright (c) 2024 Meeting Assistant Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 *
 * For commercial licensing inquiries, please contact the project maintainers.
 */

//! Replaces the assistant's `lazy_static!` + global `Mutex` singleton
//! pattern for model instances (see spec.md §9, Design Notes: "Global
//! singletons for model instances"). A `ModelHandle<T>` is owned by
//! whatever constructs the Diarizer/Transcriber and passed explicitly —
//! no hidden process-wide state — while still guaranteeing that
//! concurrent first callers block on a single load, not N.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct ModelHandle<T> {
    cell: OnceCell<Arc<T>>,
}

impl<T> Default for ModelHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ModelHandle<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Idempotent warm-up: the first caller runs `init`, all concurrent
    /// and subsequent callers share its result (or its error, which is
    /// not cached — callers can retry a failed load). Delegates to
    /// `OnceCell::get_or_try_init`, which serializes concurrent
    /// initializers internally rather than racing a check-then-set.
    pub async fn get_or_init<F, Fut, E>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = self
            .cell
            .get_or_try_init(|| async { init().await.map(Arc::new) })
            .await?;
        Ok(value.clone())
    }

    pub fn loaded(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_first_callers_load_exactly_once() {
        let handle = Arc::new(ModelHandle::<u32>::new());
        let load_count = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            let load_count = load_count.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .get_or_init(|| async {
                        load_count.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        Ok::<u32, std::convert::Infallible>(42)
                    })
                    .await
                    .unwrap()
            }));
        }

        for t in tasks {
            assert_eq!(*t.await.unwrap(), 42);
        }
        assert_eq!(load_count.load(Ordering::SeqCst), 1);
    }
}
