// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Client Configuration
//!
//! The client is driven by a JSON document naming its queues, producers and
//! consumers:
//!
//! ```json
//! {
//!   "queues":    { "orders": { "exchange": "events", "routing_key": "orders.*",
//!                              "options": { "durable": true, "args": { "x-message-ttl": 60000 } } } },
//!   "consumers": { "billing": { "queue": "orders", "workers": 4 } },
//!   "producers": { "order-created": { "exchange": "events", "routing_key": "orders.created",
//!                                     "options": { "content_type": "application/json" } } }
//! }
//! ```
//!
//! Decoding normalizes every argument and header table so that whole numbers
//! reach the broker as integers.

use crate::{consumer::ConsumerSpec, errors::AmqpError, publisher::ProducerSpec, queue::QueueSpec};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path};
use tracing::{debug, error};

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub queues: HashMap<String, QueueSpec>,
    pub producers: HashMap<String, ProducerSpec>,
    pub consumers: HashMap<String, ConsumerSpec>,
}

impl Configuration {
    /// Decodes and normalizes a configuration document.
    pub fn from_slice(data: &[u8]) -> Result<Configuration, AmqpError> {
        let mut config: Configuration = serde_json::from_slice(data).map_err(|err| {
            error!(error = err.to_string(), "failure to decode configuration");
            AmqpError::DecodeError(err.to_string())
        })?;
        config.normalize();

        debug!(
            queues = config.queues.len(),
            producers = config.producers.len(),
            consumers = config.consumers.len(),
            "configuration loaded"
        );

        Ok(config)
    }

    /// Reads, decodes and normalizes a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Configuration, AmqpError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|err| {
            error!(error = err.to_string(), path = %path.display(), "failure to read configuration");
            AmqpError::ReadConfigError(path.display().to_string(), err.to_string())
        })?;

        Configuration::from_slice(&data)
    }

    /// Rewrites whole-number floats into integers in queue arguments, consumer
    /// arguments and producer headers. Safe to call more than once.
    pub fn normalize(&mut self) {
        self.queues.values_mut().for_each(QueueSpec::normalize);
        self.consumers.values_mut().for_each(ConsumerSpec::normalize);
        self.producers.values_mut().for_each(ProducerSpec::normalize);
    }

    /// Adds a queue definition.
    pub fn queue(mut self, name: &str, spec: QueueSpec) -> Self {
        self.queues.insert(name.to_owned(), spec);
        self
    }

    /// Adds a consumer definition.
    pub fn consumer(mut self, name: &str, spec: ConsumerSpec) -> Self {
        self.consumers.insert(name.to_owned(), spec);
        self
    }

    /// Adds a producer definition.
    pub fn producer(mut self, name: &str, spec: ProducerSpec) -> Self {
        self.producers.insert(name.to_owned(), spec);
        self
    }
}
