// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::net::UnixStream;

use crate::transport::stream::StreamFactory;

#[derive(Debug, Clone)]
pub struct UnixDomainSocketStreamFactory {
    path: PathBuf,
}

impl UnixDomainSocketStreamFactory {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

#[async_trait]
impl StreamFactory for UnixDomainSocketStreamFactory {
    type Stream = UnixStream;

    async fn connect(&self) -> io::Result<UnixStream> {
        UnixStream::connect(&self.path).await
    }

    fn info(&self) -> String {
        format!("unix://{}", self.path.display())
    }
}
