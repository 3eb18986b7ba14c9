// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the RabbitMQ Client
//!
//! This module provides the single error type returned by every client operation.
//! The `AmqpError` enum covers configuration decoding, connection lifecycle misuse,
//! unknown configuration names and every failure surfaced by the broker.

use thiserror::Error;

/// Represents errors that can occur while configuring or driving the client.
///
/// Lifecycle and lookup variants are raised by the client itself. The remaining
/// variants wrap failures reported by the broker and can be recognised as a group
/// through [`AmqpError::is_transport`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// The configuration document is malformed or has incompatible types
    #[error("failure to decode configuration `{0}`")]
    DecodeError(String),

    /// The configuration file could not be read
    #[error("failure to read configuration file `{0}`: {1}")]
    ReadConfigError(String, String),

    /// `open` was called on a client that is already open
    #[error("connection already opened")]
    AlreadyOpenError,

    /// The operation requires an open connection
    #[error("connection not opened")]
    NotOpenError,

    /// The client was closed and can not be opened again
    #[error("connection closed, create a new client to reconnect")]
    ClosedError,

    /// No queue with the given name is configured
    #[error("queue `{0}` not found")]
    UnknownQueueError(String),

    /// No consumer with the given name is configured
    #[error("consumer `{0}` not found")]
    UnknownConsumerError(String),

    /// No producer with the given name is configured
    #[error("producer `{0}` not found")]
    UnknownProducerError(String),

    /// The consumer already has running workers
    #[error("consumer `{0}` is already running")]
    ConsumerAlreadyRunningError(String),

    /// The consumer has no running workers
    #[error("consumer `{0}` is not running")]
    ConsumerNotRunningError(String),

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error registering a consumer on a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error receiving a message
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error rejecting a message
    #[error("failure to reject message")]
    RejectMessageError,

    /// Error closing a channel or the connection
    #[error("failure to close `{0}`")]
    CloseError(String),
}

impl AmqpError {
    /// Returns true when the error was surfaced by the broker rather than
    /// raised by the client's own checks.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AmqpError::ConnectionError
                | AmqpError::ChannelError
                | AmqpError::DeclareQueueError(_)
                | AmqpError::BindingExchangeToQueueError(..)
                | AmqpError::BindingConsumerError(_)
                | AmqpError::QoSDeclarationError(_)
                | AmqpError::PublishingError
                | AmqpError::ConsumerError(_)
                | AmqpError::AckMessageError
                | AmqpError::NackMessageError
                | AmqpError::RejectMessageError
                | AmqpError::CloseError(_)
        )
    }
}
