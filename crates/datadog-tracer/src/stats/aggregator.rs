// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client-side stats computation.
//!
//! Two [`StatsBuffer`]s alternate: producers record into the active one while
//! the flush task swaps the active index and sends the retired buffer. The
//! swap happens under the write side of an `RwLock` that producers only hold
//! in read mode, so once the swap returns no producer is still writing into
//! the retired buffer.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::api::Api;
use crate::config::TracerSettings;
use crate::errors::StatsError;
use crate::span::Span;
use crate::stats::buffer::{ClientStatsPayload, StatsBuffer};

pub struct StatsAggregator {
    api: Arc<dyn Api>,
    buffers: [StatsBuffer; 2],
    active: RwLock<usize>,
    bucket_duration: Duration,
    flush_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl StatsAggregator {
    #[must_use]
    pub fn new(api: Arc<dyn Api>, settings: &TracerSettings, bucket_duration: Duration) -> Self {
        let payload = Arc::new(ClientStatsPayload::new(
            &settings.hostname,
            settings.environment.as_deref().unwrap_or_default(),
            settings.service_version.as_deref().unwrap_or_default(),
            settings.service_name.as_deref().unwrap_or_default(),
        ));
        Self {
            api,
            buffers: [
                StatsBuffer::new(Arc::clone(&payload)),
                StatsBuffer::new(payload),
            ],
            active: RwLock::new(0),
            bucket_duration,
            flush_lock: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            flush_task: Mutex::new(None),
        }
    }

    pub fn bucket_duration(&self) -> Duration {
        self.bucket_duration
    }

    fn active_index(&self) -> usize {
        *self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Buffer currently receiving spans.
    pub fn current_buffer(&self) -> &StatsBuffer {
        &self.buffers[self.active_index()]
    }

    /// Records the top-level and measured spans among `spans`.
    pub fn add(&self, spans: &[Span]) {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        let buffer = &self.buffers[*active];
        for span in spans {
            if span.is_top_level() || span.is_measured() {
                buffer.record(span);
            }
        }
    }

    /// Closes the current window and sends it when it saw any traffic.
    ///
    /// # Errors
    /// Returns [`StatsError::Cancelled`] without touching any buffer when
    /// `cancel` is already cancelled.
    pub async fn flush(&self, cancel: &CancellationToken) -> Result<(), StatsError> {
        if cancel.is_cancelled() {
            return Err(StatsError::Cancelled);
        }

        let _flushing = self.flush_lock.lock().await;

        let retired = {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            let retired = *active;
            *active = 1 - retired;
            self.buffers[*active].begin_window();
            retired
        };
        let buffer = &self.buffers[retired];

        if buffer.has_hits() {
            let duration = i64::try_from(self.bucket_duration.as_nanos()).unwrap_or(i64::MAX);
            if !self.api.send_stats(buffer, duration).await {
                debug!("Stats window dropped after failed send");
            }
            buffer.reset();
        }
        Ok(())
    }

    /// Spawns the periodic flush task.
    pub fn start(self: &Arc<Self>) {
        let aggregator = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(aggregator.bucket_duration);
            interval.tick().await; // first tick is immediate
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = aggregator.flush(&shutdown).await {
                            debug!("Stats flush skipped: {e}");
                        }
                    }
                }
            }
        });

        let mut task = self.flush_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
    }

    /// Stops the periodic task and flushes whatever is still buffered.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self
            .flush_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Stats flush task failed: {e}");
            }
        }

        // both buffers may hold spans if a flush was in progress
        for _ in 0..2 {
            if let Err(e) = self.flush(&CancellationToken::new()).await {
                error!("Final stats flush failed: {e}");
            }
        }
    }
}
