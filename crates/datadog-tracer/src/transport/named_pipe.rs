// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient};

use crate::transport::stream::StreamFactory;

const PIPE_PREFIX: &str = r"\\.\pipe\";
// Win32 ERROR_PIPE_BUSY: every server instance is serving another client.
const ERROR_PIPE_BUSY: i32 = 231;
const BUSY_RETRY_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct NamedPipeClientStreamFactory {
    pipe_name: String,
    timeout: Duration,
}

impl NamedPipeClientStreamFactory {
    /// `pipe_name` may be given bare (`datadog-apm`) or fully qualified.
    #[must_use]
    pub fn new(pipe_name: &str, timeout: Duration) -> Self {
        let pipe_name = if pipe_name.starts_with(PIPE_PREFIX) {
            pipe_name.to_string()
        } else {
            format!("{PIPE_PREFIX}{pipe_name}")
        };
        Self { pipe_name, timeout }
    }
}

#[async_trait]
impl StreamFactory for NamedPipeClientStreamFactory {
    type Stream = NamedPipeClient;

    async fn connect(&self) -> io::Result<NamedPipeClient> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match ClientOptions::new().open(&self.pipe_name) {
                Ok(client) => return Ok(client),
                Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, e));
                    }
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(BUSY_RETRY_DELAY).await;
        }
    }

    fn info(&self) -> String {
        self.pipe_name.clone()
    }
}
