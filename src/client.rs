// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Client
//!
//! The [`Client`] owns a single broker connection and the frozen configuration.
//! Opening the connection declares every configured queue; consumers and
//! producers are then addressed by name for the lifetime of the connection.
//!
//! ## Locking
//!
//! Independent locks guard the control paths:
//!
//! - `lifecycle`: serializes the `open` and `close` sequences
//! - `state`: the `Unopened -> Open -> Closed` value, held only to read or
//!   assign it, so `is_open` never waits on the broker or on a worker
//! - `declare`: queue declarations, never interleaved with each other
//! - `consumers`: consumer setup and the registry of running consumers
//! - `publish`: every publish, across every producer
//!
//! The live connection handle sits in a separate slot that is written only while
//! `lifecycle` is held and is never held across a broker call. When locks are
//! nested the order is `lifecycle`, then `declare` or `consumers`, then the
//! slot, then `state`; declare, consume and publish never take `lifecycle`.
//!
//! `close` empties the slot and the registry under the `consumers` guard, so a
//! consume racing the close either registers first and is stopped, or finds
//! the client closed.

use crate::{
    channel::{Broker, BrokerConnection, LapinBroker},
    config::Configuration,
    consumer::{ConsumerSpec, MessageHandler},
    dispatcher::{self, ConsumerHandle},
    errors::AmqpError,
    publisher::{self, ProducerSpec},
    queue::QueueSpec,
    topology,
};
use std::{collections::HashMap, path::Path, sync::Arc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

/// Lifecycle of the client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Open,
    Closed,
}

/// Configuration-driven RabbitMQ client.
///
/// Share it between tasks behind an `Arc`; every operation takes `&self`.
pub struct Client {
    broker: Arc<dyn Broker>,
    config: Configuration,
    lifecycle: Mutex<()>,
    state: RwLock<ConnectionState>,
    conn: RwLock<Option<Arc<dyn BrokerConnection>>>,
    declare: Mutex<()>,
    consumers: Mutex<HashMap<String, ConsumerHandle>>,
    publish: Mutex<()>,
}

impl Default for Client {
    fn default() -> Self {
        Client::new(Configuration::default())
    }
}

impl Client {
    /// Creates a client talking to RabbitMQ through lapin.
    pub fn new(config: Configuration) -> Client {
        Client::with_broker(config, Arc::new(LapinBroker::new()))
    }

    /// Creates a client on top of any [`Broker`] implementation.
    pub fn with_broker(config: Configuration, broker: Arc<dyn Broker>) -> Client {
        Client {
            broker,
            config,
            lifecycle: Mutex::new(()),
            state: RwLock::new(ConnectionState::Unopened),
            conn: RwLock::new(None),
            declare: Mutex::new(()),
            consumers: Mutex::new(HashMap::new()),
            publish: Mutex::new(()),
        }
    }

    /// Creates a client from a JSON configuration document.
    pub fn from_slice(data: &[u8]) -> Result<Client, AmqpError> {
        Ok(Client::new(Configuration::from_slice(data)?))
    }

    /// Creates a client from a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Client, AmqpError> {
        Ok(Client::new(Configuration::from_file(path)?))
    }

    pub fn queues(&self) -> &HashMap<String, QueueSpec> {
        &self.config.queues
    }

    pub fn producers(&self) -> &HashMap<String, ProducerSpec> {
        &self.config.producers
    }

    pub fn consumers(&self) -> &HashMap<String, ConsumerSpec> {
        &self.config.consumers
    }

    /// Connects to `uri` and declares every configured queue.
    ///
    /// If any declaration fails the fresh connection is closed, the client stays
    /// unopened and the declaration error is returned.
    ///
    /// # Parameters
    /// * `uri` - The AMQP URI of the broker
    ///
    /// # Returns
    /// `AlreadyOpenError` or `ClosedError` when the client is not unopened,
    /// otherwise the connect or declaration failure
    pub async fn open(&self, uri: &str) -> Result<(), AmqpError> {
        let _lifecycle = self.lifecycle.lock().await;
        match self.state().await {
            ConnectionState::Open => return Err(AmqpError::AlreadyOpenError),
            ConnectionState::Closed => return Err(AmqpError::ClosedError),
            ConnectionState::Unopened => {}
        }

        let conn = self.broker.connect(uri).await?;

        let declared = {
            let _declare = self.declare.lock().await;
            topology::declare_all(conn.as_ref(), &self.config.queues).await
        };

        if let Err(err) = declared {
            error!(error = err.to_string(), "failure to declare topology, closing connection");
            if let Err(close_err) = conn.close().await {
                error!(error = close_err.to_string(), "failure to close connection after declare failure");
            }
            return Err(err);
        }

        *self.conn.write().await = Some(conn);
        *self.state.write().await = ConnectionState::Open;

        info!(queues = self.config.queues.len(), "amqp connection opened");
        Ok(())
    }

    /// Stops every running consumer and closes the connection.
    ///
    /// The client reports closed as soon as the connection is withdrawn, before
    /// the consumers are stopped; `close` returns once every worker has exited.
    /// The client ends closed even when the broker reports a failure while
    /// closing; that failure is returned.
    pub async fn close(&self) -> Result<(), AmqpError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.state().await != ConnectionState::Open {
            return Err(AmqpError::NotOpenError);
        }

        let (running, conn) = {
            let mut consumers = self.consumers.lock().await;
            let conn = self.conn.write().await.take();
            *self.state.write().await = ConnectionState::Closed;
            (std::mem::take(&mut *consumers), conn)
        };

        for (name, handle) in running {
            if let Err(err) = handle.shutdown().await {
                error!(error = err.to_string(), consumer = name, "failure to stop consumer");
            }
        }

        let result = match conn {
            Some(conn) => conn.close().await,
            None => Ok(()),
        };

        info!("amqp connection closed");
        result
    }

    /// Returns true while the connection is open. Never waits on the broker.
    pub async fn is_open(&self) -> bool {
        self.state().await == ConnectionState::Open
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn connection(&self) -> Result<Arc<dyn BrokerConnection>, AmqpError> {
        self.conn.read().await.clone().ok_or(AmqpError::NotOpenError)
    }

    /// Declares and binds a single configured queue.
    pub async fn declare_queue(&self, name: &str) -> Result<(), AmqpError> {
        let _declare = self.declare.lock().await;
        let conn = self.connection().await?;

        let spec = self
            .config
            .queues
            .get(name)
            .ok_or_else(|| AmqpError::UnknownQueueError(name.to_owned()))?;

        topology::declare_on(conn.as_ref(), name, spec).await
    }

    /// Starts the workers of the consumer `name`, each feeding `handler`.
    ///
    /// A consumer whose workers are still running can not be started again.
    ///
    /// # Parameters
    /// * `name` - The configured consumer name, also the broker consumer tag
    /// * `handler` - The handler invoked for every delivery, shared by the workers
    ///
    /// # Returns
    /// Once the workers are spawned; they keep running in the background
    pub async fn consume<H>(&self, name: &str, handler: H) -> Result<(), AmqpError>
    where
        H: MessageHandler + 'static,
    {
        let mut running = self.consumers.lock().await;
        let conn = self.connection().await?;

        let spec = self
            .config
            .consumers
            .get(name)
            .ok_or_else(|| AmqpError::UnknownConsumerError(name.to_owned()))?;

        if running.get(name).is_some_and(|handle| !handle.is_finished()) {
            return Err(AmqpError::ConsumerAlreadyRunningError(name.to_owned()));
        }

        let handle = dispatcher::start(conn.as_ref(), name, spec, Arc::new(handler)).await?;
        if let Some(finished) = running.insert(name.to_owned(), handle) {
            debug!(consumer = name, "releasing finished consumer");
            if let Err(err) = finished.shutdown().await {
                error!(error = err.to_string(), consumer = name, "failure to release finished consumer");
            }
        }

        Ok(())
    }

    /// Stops the consumer `name` and waits for its workers to exit.
    pub async fn stop_consumer(&self, name: &str) -> Result<(), AmqpError> {
        let handle = self
            .consumers
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| AmqpError::ConsumerNotRunningError(name.to_owned()))?;

        handle.shutdown().await
    }

    /// Number of live workers of the consumer `name`.
    pub async fn running_workers(&self, name: &str) -> usize {
        self.consumers
            .lock()
            .await
            .get(name)
            .map(ConsumerHandle::running_workers)
            .unwrap_or_default()
    }

    /// Publishes `payload` with the profile of the producer `name`.
    ///
    /// Publishes are serialized across every producer.
    ///
    /// # Parameters
    /// * `name` - The configured producer name
    /// * `payload` - The message body
    pub async fn publish(&self, name: &str, payload: &[u8]) -> Result<(), AmqpError> {
        let _publish = self.publish.lock().await;
        let conn = self.connection().await?;

        let spec = self
            .config
            .producers
            .get(name)
            .ok_or_else(|| AmqpError::UnknownProducerError(name.to_owned()))?;

        publisher::publish_on(conn.as_ref(), name, spec, payload).await
    }
}
