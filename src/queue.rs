// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! This module provides the configured description of a queue: the exchange and
//! routing key it is bound with and the options it is declared with.

use crate::table::{normalize_table, ArgTable, ArgValue};
use lapin::options::{QueueBindOptions, QueueDeclareOptions};
use serde::{Deserialize, Serialize};

/// Options a queue is declared with.
///
/// The same argument table is sent with the declare and with the binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclareOptions {
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub args: ArgTable,
}

/// Definition of a queue and its binding.
///
/// Usually decoded from the configuration document, but it also implements the
/// builder pattern for programmatic construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSpec {
    pub exchange: String,
    pub routing_key: String,
    pub options: DeclareOptions,
}

impl QueueSpec {
    /// Creates a new queue definition with default options.
    ///
    /// # Parameters
    /// * `exchange` - The exchange the queue is bound to
    /// * `routing_key` - The binding key
    ///
    /// # Returns
    /// A new queue definition that is not durable, not exclusive and kept when unused
    pub fn new(exchange: &str, routing_key: &str) -> QueueSpec {
        QueueSpec {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            options: DeclareOptions::default(),
        }
    }

    /// Makes the queue durable, persisting across broker restarts.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn durable(mut self) -> Self {
        self.options.durable = true;
        self
    }

    /// Sets the queue to auto-delete when no longer used.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn auto_delete(mut self) -> Self {
        self.options.auto_delete = true;
        self
    }

    /// Makes the queue exclusive to the connection.
    ///
    /// Exclusive queues can only be accessed by the declaring connection
    /// and are deleted when that connection closes.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn exclusive(mut self) -> Self {
        self.options.exclusive = true;
        self
    }

    /// Declares and binds without waiting for the broker reply.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn no_wait(mut self) -> Self {
        self.options.no_wait = true;
        self
    }

    /// Adds a single declare argument.
    ///
    /// # Parameters
    /// * `key` - The argument name, e.g. `x-message-ttl` or `x-max-length`
    /// * `value` - The argument value
    ///
    /// # Returns
    /// Self for method chaining
    pub fn arg(mut self, key: &str, value: ArgValue) -> Self {
        self.options.args.insert(key.to_owned(), value);
        self
    }

    pub(crate) fn normalize(&mut self) {
        normalize_table(&mut self.options.args);
    }

    /// Converts the definition into lapin declare options. Never passive.
    pub(crate) fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: self.options.durable,
            exclusive: self.options.exclusive,
            auto_delete: self.options.auto_delete,
            nowait: self.options.no_wait,
        }
    }

    pub(crate) fn bind_options(&self) -> QueueBindOptions {
        QueueBindOptions {
            nowait: self.options.no_wait,
        }
    }
}
