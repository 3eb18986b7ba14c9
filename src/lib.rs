// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod dispatcher;
mod otel;
mod topology;

#[cfg(test)]
mod fake;

pub mod channel;
pub mod client;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod publisher;
pub mod queue;
pub mod table;

pub use client::{Client, ConnectionState};
pub use config::Configuration;
pub use consumer::{ConsumerSpec, Message, MessageHandler};
pub use errors::AmqpError;
pub use publisher::{ProducerSpec, PublishProfile};
pub use queue::{DeclareOptions, QueueSpec};
pub use table::{ArgTable, ArgValue};
