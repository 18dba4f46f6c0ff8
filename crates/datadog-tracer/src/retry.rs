// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use tracing::{debug, error};

use crate::errors::TransportError;
use crate::transport::{ApiRequest, ApiRequestFactory};

pub const DEFAULT_RETRY_LIMIT: u32 = 5;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub retry_limit: u32,
    /// Sleep after the first failed attempt; doubled after each further one.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

/// Delivers a payload with bounded exponential backoff.
///
/// `send` receives a fresh request per attempt together with a flag telling
/// whether this is the last attempt. It returns `Ok(true)` when the agent
/// accepted the payload, `Ok(false)` for a response with a non-success
/// status, and `Err` when the exchange itself failed.
///
/// A request that cannot be created is not retried: that failure comes from
/// configuration, not from the agent.
pub async fn send_with_retry<F, Fut>(
    factory: &dyn ApiRequestFactory,
    endpoint: &Url,
    policy: RetryPolicy,
    mut send: F,
) -> bool
where
    F: FnMut(Box<dyn ApiRequest>, bool) -> Fut,
    Fut: Future<Output = Result<bool, TransportError>>,
{
    let retry_limit = policy.retry_limit.max(1);
    let mut retry_count = 1;
    let mut backoff = policy.initial_backoff;

    loop {
        let request = match factory.create(endpoint) {
            Ok(request) => request,
            Err(e) => {
                error!(
                    "An error occurred while generating a request to {}: {e}",
                    factory.info(endpoint)
                );
                return false;
            }
        };

        let is_final_try = retry_count >= retry_limit;
        let failure = match send(request, is_final_try).await {
            Ok(true) => return true,
            Ok(false) => None,
            Err(e) => Some(e),
        };

        if is_final_try {
            match failure {
                Some(e) => error!(
                    "An error occurred while sending data to {}: {e}",
                    factory.info(endpoint)
                ),
                None => error!(
                    "Failed to send data to {} after {retry_count} attempts",
                    factory.info(endpoint)
                ),
            }
            return false;
        }

        if let Some(e) = failure.filter(TransportError::is_socket_error) {
            debug!(
                "Unable to communicate with {}: {e}",
                factory.info(endpoint)
            );
        }

        tokio::time::sleep(backoff).await;
        retry_count += 1;
        backoff = backoff.saturating_mul(2);
    }
}
