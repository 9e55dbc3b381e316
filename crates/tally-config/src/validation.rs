// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.
//!
//! All violations are collected so a single run reports every problem.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::TallyConfig;

/// Validate a deserialized configuration.
pub fn validate_config(config: &TallyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let host = config.server.host.trim();
    if host.is_empty() {
        fail("server.host must not be empty".to_string());
    } else {
        let is_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_ip && !is_hostname {
            fail(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if let Some(token) = &config.server.bearer_token
        && token.trim().is_empty()
    {
        fail("server.bearer_token must not be blank when set".to_string());
    }

    if !(0.0..=2.0).contains(&config.model.temperature) {
        fail(format!(
            "model.temperature must be between 0.0 and 2.0, got {}",
            config.model.temperature
        ));
    }
    if config.model.max_tokens == 0 {
        fail("model.max_tokens must be greater than 0".to_string());
    }
    if config.model.request_timeout_secs == 0 {
        fail("model.request_timeout_secs must be greater than 0".to_string());
    }

    if config.embedding.dimensions == 0 {
        fail("embedding.dimensions must be greater than 0".to_string());
    }
    if config.embedding.request_timeout_secs == 0 {
        fail("embedding.request_timeout_secs must be greater than 0".to_string());
    }

    if config.memory.collection.trim().is_empty() {
        fail("memory.collection must not be empty".to_string());
    }
    if config.memory.retrieval_limit == 0 {
        fail("memory.retrieval_limit must be greater than 0".to_string());
    }
    if let Some(threshold) = config.memory.similarity_threshold
        && !(-1.0..=1.0).contains(&threshold)
    {
        fail(format!(
            "memory.similarity_threshold must be between -1.0 and 1.0, got {threshold}"
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let pipeline = &config.pipeline;
    if pipeline.categories.is_empty() {
        fail("pipeline.categories must contain at least one category".to_string());
    }
    let mut seen = HashSet::new();
    for category in &pipeline.categories {
        if category.trim().is_empty() {
            fail("pipeline.categories must not contain blank entries".to_string());
        } else if !seen.insert(category.as_str()) {
            fail(format!("pipeline.categories lists `{category}` twice"));
        }
    }
    if pipeline.channel_capacity == 0 {
        fail("pipeline.channel_capacity must be greater than 0".to_string());
    }
    for (key, value) in [
        ("request_timeout_secs", pipeline.request_timeout_secs),
        ("commit_timeout_secs", pipeline.commit_timeout_secs),
        ("reindex_timeout_secs", pipeline.reindex_timeout_secs),
    ] {
        if value == 0 {
            fail(format!("pipeline.{key} must be greater than 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
