// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::api::{AgentApi, Api};
use crate::config::TracerSettings;
use crate::errors::TransportError;
use crate::span::{encode_traces, Span};
use crate::stats::StatsAggregator;
use crate::transport::strategy;

pub const DEFAULT_MAX_BUFFERED_TRACES: usize = 10_000;

/// Buffers finished traces and ships them to the agent in the background.
pub struct AgentWriter {
    api: Arc<dyn Api>,
    stats: Option<Arc<StatsAggregator>>,
    traces: Mutex<Vec<Vec<Span>>>,
    max_buffered_traces: usize,
    flush_interval: Duration,
    flush_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl AgentWriter {
    #[must_use]
    pub fn new(
        api: Arc<dyn Api>,
        stats: Option<Arc<StatsAggregator>>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            api,
            stats,
            traces: Mutex::new(Vec::new()),
            max_buffered_traces: DEFAULT_MAX_BUFFERED_TRACES,
            flush_interval,
            flush_lock: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            flush_task: Mutex::new(None),
        }
    }

    /// Wires the transport, agent api and (when enabled) stats computation
    /// from settings.
    pub fn from_settings(settings: &TracerSettings) -> Result<Self, TransportError> {
        let (factory, base_url) = if settings.agentless {
            let api_key = settings
                .api_key
                .as_deref()
                .ok_or(TransportError::MissingApiKey)?;
            let base_url = settings
                .direct_intake_uri()
                .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
            (strategy::direct_intake_factory(settings, api_key), base_url)
        } else {
            (strategy::agent_factory(settings), settings.agent_uri.clone())
        };

        let api: Arc<dyn Api> = Arc::new(AgentApi::new(
            &base_url,
            factory,
            settings.partial_flush_enabled,
            settings.stats_computation_enabled,
        )?);

        let stats = settings.stats_computation_enabled.then(|| {
            Arc::new(StatsAggregator::new(
                Arc::clone(&api),
                settings,
                settings.stats_flush_interval,
            ))
        });

        Ok(Self::new(api, stats, settings.trace_flush_interval))
    }

    #[must_use]
    pub fn with_max_buffered_traces(mut self, max_buffered_traces: usize) -> Self {
        self.max_buffered_traces = max_buffered_traces;
        self
    }

    pub fn stats(&self) -> Option<&Arc<StatsAggregator>> {
        self.stats.as_ref()
    }

    pub fn buffered_traces(&self) -> usize {
        self.traces.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Accepts a finished trace. Returns `false` when the buffer is full and
    /// the trace was dropped; stats still account for it.
    pub fn write_trace(&self, trace: Vec<Span>) -> bool {
        if trace.is_empty() {
            return true;
        }
        if let Some(stats) = &self.stats {
            stats.add(&trace);
        }

        let mut traces = self.traces.lock().unwrap_or_else(PoisonError::into_inner);
        if traces.len() >= self.max_buffered_traces {
            warn!(
                "Trace buffer is full ({} traces), dropping trace",
                self.max_buffered_traces
            );
            return false;
        }
        traces.push(trace);
        true
    }

    /// Sends everything buffered so far.
    pub async fn flush(&self) -> bool {
        let _flushing = self.flush_lock.lock().await;
        let traces = std::mem::take(&mut *self.traces.lock().unwrap_or_else(PoisonError::into_inner));
        if traces.is_empty() {
            return true;
        }

        let payload = match encode_traces(&traces) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                error!("Unable to serialize {} traces: {e}", traces.len());
                return false;
            }
        };
        debug!("Flushing {} traces", traces.len());
        self.api.send_traces(payload, traces.len()).await
    }

    /// Spawns the periodic trace flush and, when enabled, the stats timer.
    pub fn start(self: &Arc<Self>) {
        if let Some(stats) = &self.stats {
            stats.start();
        }

        let writer = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(writer.flush_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        writer.flush().await;
                    }
                }
            }
        });

        let mut task = self.flush_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
    }

    /// Stops background tasks after a final flush of traces and stats.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self
            .flush_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Trace flush task failed: {e}");
            }
        }

        self.flush().await;
        if let Some(stats) = &self.stats {
            stats.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::buffer::StatsBuffer;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingApi {
        traces: Mutex<Vec<(usize, Vec<Vec<Span>>)>>,
        stats_calls: Mutex<usize>,
    }

    #[async_trait]
    impl Api for RecordingApi {
        async fn send_stats(&self, _stats: &StatsBuffer, _bucket_duration: i64) -> bool {
            *self.stats_calls.lock().unwrap() += 1;
            true
        }

        async fn send_traces(&self, traces: Bytes, number_of_traces: usize) -> bool {
            let decoded: Vec<Vec<Span>> = rmp_serde::from_slice(&traces).unwrap();
            self.traces.lock().unwrap().push((number_of_traces, decoded));
            true
        }
    }

    fn trace(trace_id: u64) -> Vec<Span> {
        let root = Span::new(trace_id, 1, "web", "http.request");
        let child = Span::child_of(&root, 2, "web", "render");
        vec![root, child]
    }

    #[tokio::test]
    async fn test_flush_sends_buffered_traces() {
        let api = Arc::new(RecordingApi::default());
        let writer = AgentWriter::new(api.clone(), None, Duration::from_secs(1));

        let (first, second) = (trace(1), trace(2));
        assert!(writer.write_trace(first.clone()));
        assert!(writer.write_trace(second.clone()));
        assert!(writer.flush().await);
        assert_eq!(writer.buffered_traces(), 0);

        let sent = api.traces.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 2);
        assert_eq!(sent[0].1, vec![first, second]);
    }

    #[tokio::test]
    async fn test_empty_flush_sends_nothing() {
        let api = Arc::new(RecordingApi::default());
        let writer = AgentWriter::new(api.clone(), None, Duration::from_secs(1));
        assert!(writer.write_trace(Vec::new()));
        assert!(writer.flush().await);
        assert!(api.traces.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_buffer_drops_traces() {
        let api = Arc::new(RecordingApi::default());
        let writer =
            AgentWriter::new(api, None, Duration::from_secs(1)).with_max_buffered_traces(1);
        assert!(writer.write_trace(trace(1)));
        assert!(!writer.write_trace(trace(2)));
        assert_eq!(writer.buffered_traces(), 1);
    }

    #[tokio::test]
    async fn test_traces_feed_stats() {
        let api = Arc::new(RecordingApi::default());
        let stats = Arc::new(StatsAggregator::new(
            api.clone(),
            &TracerSettings::default(),
            Duration::from_secs(10),
        ));
        let writer = AgentWriter::new(api.clone(), Some(Arc::clone(&stats)), Duration::from_secs(1));

        writer.write_trace(trace(1));
        // only the root span is top-level
        assert_eq!(stats.current_buffer().bucket_count(), 1);

        writer.shutdown().await;
        assert_eq!(api.traces.lock().unwrap().len(), 1);
        assert_eq!(*api.stats_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_background_flush() {
        let api = Arc::new(RecordingApi::default());
        let writer = Arc::new(AgentWriter::new(api.clone(), None, Duration::from_millis(20)));
        writer.start();
        writer.write_trace(trace(1));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while api.traces.lock().unwrap().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "no background flush");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        writer.shutdown().await;
    }

    #[test]
    fn test_agentless_requires_api_key() {
        let settings = TracerSettings {
            agentless: true,
            ..TracerSettings::default()
        };
        assert!(matches!(
            AgentWriter::from_settings(&settings),
            Err(TransportError::MissingApiKey)
        ));

        let settings = TracerSettings {
            agentless: true,
            api_key: Some("key".to_string()),
            stats_computation_enabled: true,
            ..TracerSettings::default()
        };
        let writer = AgentWriter::from_settings(&settings).unwrap();
        assert!(writer.stats().is_some());
    }
}
