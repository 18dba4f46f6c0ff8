// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Container id detection from `/proc/self/cgroup`.
//!
//! Cgroup lines look like `hierarchy:controllers:path`. The id is the last
//! path segment once runtime decorations are removed:
//!
//! ```text
//! 12:pids:/docker/<64 hex>
//! 0::/system.slice/docker-<64 hex>.scope
//! 1:name=systemd:/kubepods/besteffort/pod<uid>/<64 hex>
//! 3:cpu:/ecs/<task id>/<32 hex>-<digits>
//! ```

use std::sync::OnceLock;

use tracing::debug;

const CGROUP_PATH: &str = "/proc/self/cgroup";
const RUNTIME_PREFIXES: &[&str] = &["docker-", "cri-containerd-", "crio-", "libpod-"];

/// Container id of the current process, read once and cached.
pub fn container_id() -> Option<&'static str> {
    static CONTAINER_ID: OnceLock<Option<String>> = OnceLock::new();
    CONTAINER_ID
        .get_or_init(|| match std::fs::read_to_string(CGROUP_PATH) {
            Ok(content) => parse_container_id(&content),
            Err(e) => {
                debug!("Could not read {CGROUP_PATH}: {e}");
                None
            }
        })
        .as_deref()
}

#[must_use]
pub fn parse_container_id(cgroup: &str) -> Option<String> {
    cgroup.lines().find_map(|line| {
        let path = line.splitn(3, ':').nth(2)?;
        let segment = path.rsplit('/').next()?;
        let segment = segment.strip_suffix(".scope").unwrap_or(segment);
        let segment = RUNTIME_PREFIXES
            .iter()
            .find_map(|prefix| segment.strip_prefix(prefix))
            .unwrap_or(segment);
        is_container_id(segment).then(|| segment.to_string())
    })
}

fn is_container_id(candidate: &str) -> bool {
    let hex = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit());

    if candidate.len() == 64 && hex(candidate) {
        return true;
    }

    // uuid form used by some runtimes (e.g. Fargate 1.4+)
    let groups: Vec<&str> = candidate.split('-').collect();
    if groups.len() == 5
        && groups.iter().map(|g| g.len()).eq([8, 4, 4, 4, 12])
        && groups.iter().all(|g| hex(g))
    {
        return true;
    }

    // ECS task containers: 32 hex, a dash, then a numeric suffix
    matches!(
        candidate.split_once('-'),
        Some((id, suffix)) if id.len() == 32 && hex(id) && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit())
    )
}
