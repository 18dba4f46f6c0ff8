// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, error};

use crate::config::TracerSettings;

#[derive(Debug, Error)]
#[error("integration {integration} failed to initialize: {reason}")]
pub struct IntegrationError {
    pub integration: String,
    pub reason: String,
}

pub type IntegrationInit = fn(&TracerSettings) -> Result<(), IntegrationError>;

/// Named initialization hooks, run once at startup in name order.
#[derive(Default)]
pub struct IntegrationRegistry {
    integrations: BTreeMap<String, IntegrationInit>,
}

impl IntegrationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `init` under `name`, replacing any previous hook with that
    /// name. Returns whether a hook was replaced.
    pub fn register(&mut self, name: &str, init: IntegrationInit) -> bool {
        self.integrations.insert(name.to_string(), init).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.integrations.keys().map(String::as_str)
    }

    /// Runs every hook. A failing integration is logged and skipped. Returns
    /// the names that initialized successfully.
    pub fn initialize_all(&self, settings: &TracerSettings) -> Vec<String> {
        let mut initialized = Vec::with_capacity(self.integrations.len());
        for (name, init) in &self.integrations {
            match init(settings) {
                Ok(()) => {
                    debug!("Integration {name} initialized");
                    initialized.push(name.clone());
                }
                Err(e) => error!("{e}"),
            }
        }
        initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(_: &TracerSettings) -> Result<(), IntegrationError> {
        Ok(())
    }

    fn needs_service(settings: &TracerSettings) -> Result<(), IntegrationError> {
        match settings.service_name {
            Some(_) => Ok(()),
            None => Err(IntegrationError {
                integration: "grpc".to_string(),
                reason: "service name is not configured".to_string(),
            }),
        }
    }

    #[test]
    fn test_register_and_names() {
        let mut registry = IntegrationRegistry::new();
        assert!(!registry.register("reqwest", ok));
        assert!(!registry.register("hyper", ok));
        assert!(registry.register("reqwest", ok));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["hyper", "reqwest"]);
    }

    #[test]
    fn test_failures_do_not_stop_initialization() {
        let mut registry = IntegrationRegistry::new();
        registry.register("grpc", needs_service);
        registry.register("hyper", ok);

        let initialized = registry.initialize_all(&TracerSettings::default());
        assert_eq!(initialized, vec!["hyper".to_string()]);

        let settings = TracerSettings {
            service_name: Some("checkout".to_string()),
            ..TracerSettings::default()
        };
        assert_eq!(registry.initialize_all(&settings).len(), 2);
    }
}
