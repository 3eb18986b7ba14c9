// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! This module provides the consumer side of the configuration, the [`Message`]
//! handed to user handlers and the [`MessageHandler`] trait those handlers implement.

use crate::{
    channel::Delivery,
    errors::AmqpError,
    table::{normalize_table, ArgTable},
};
use async_trait::async_trait;
use lapin::{options::BasicConsumeOptions, BasicProperties};
use serde::{Deserialize, Serialize};

/// Definition of a named consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSpec {
    pub auto_ack: bool,
    pub exclusive: bool,
    pub no_local: bool,
    pub no_wait: bool,
    pub args: ArgTable,
    /// Name of the queue to consume from.
    pub queue: String,
    /// Number of concurrent workers, `0` means one.
    pub workers: usize,
    /// Optional channel prefetch limit applied before consuming.
    pub prefetch_count: Option<u16>,
}

impl ConsumerSpec {
    /// Creates a consumer reading `queue` with a single worker.
    pub fn new(queue: &str) -> ConsumerSpec {
        ConsumerSpec {
            queue: queue.to_owned(),
            ..Default::default()
        }
    }

    /// Sets the number of concurrent workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Lets the broker consider messages acknowledged once delivered.
    pub fn auto_ack(mut self) -> Self {
        self.auto_ack = true;
        self
    }

    /// Limits the number of unacknowledged messages on the consumer channel.
    pub fn prefetch(mut self, count: u16) -> Self {
        self.prefetch_count = Some(count);
        self
    }

    /// Returns the number of workers to spawn, never less than one.
    pub fn workers_count(&self) -> usize {
        self.workers.max(1)
    }

    pub(crate) fn normalize(&mut self) {
        normalize_table(&mut self.args);
    }

    pub(crate) fn consume_options(&self) -> BasicConsumeOptions {
        BasicConsumeOptions {
            no_local: self.no_local,
            no_ack: self.auto_ack,
            exclusive: self.exclusive,
            nowait: self.no_wait,
        }
    }
}

/// A message delivered to a [`MessageHandler`].
///
/// When the consumer is not configured with `auto_ack` the handler is
/// responsible for calling [`Message::ack`], [`Message::nack`] or [`Message::reject`].
pub struct Message {
    delivery: Delivery,
}

impl Message {
    pub fn new(delivery: Delivery) -> Self {
        Message { delivery }
    }

    pub fn body(&self) -> &[u8] {
        &self.delivery.data
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery.delivery_tag
    }

    pub fn exchange(&self) -> &str {
        &self.delivery.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.delivery.routing_key
    }

    pub fn redelivered(&self) -> bool {
        self.delivery.redelivered
    }

    pub fn properties(&self) -> &BasicProperties {
        &self.delivery.properties
    }

    pub async fn ack(&self) -> Result<(), AmqpError> {
        self.delivery.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> Result<(), AmqpError> {
        self.delivery.acker.nack(requeue).await
    }

    pub async fn reject(&self, requeue: bool) -> Result<(), AmqpError> {
        self.delivery.acker.reject(requeue).await
    }
}

/// Handles messages received by a consumer's workers.
///
/// Plain closures taking a [`Message`] implement this trait.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message);
}

#[async_trait]
impl<F> MessageHandler for F
where
    F: Fn(Message) + Send + Sync,
{
    async fn handle(&self, message: Message) {
        self(message)
    }
}
