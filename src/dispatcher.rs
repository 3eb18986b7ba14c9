// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Dispatcher
//!
//! This module registers a named consumer on its own channel and fans the
//! resulting delivery stream out to a pool of workers. Every worker pulls the
//! next delivery from the shared stream, so each message reaches exactly one
//! worker; ordering across workers is not preserved.
//!
//! A running consumer is represented by a [`ConsumerHandle`] that can stop the
//! workers, release the channel and wait for the workers to exit. When the
//! broker ends the delivery stream the last worker to exit releases the channel
//! itself.

use crate::{
    channel::{BrokerChannel, BrokerConnection, Deliveries},
    consumer::{ConsumerSpec, Message, MessageHandler},
    errors::AmqpError,
    otel,
    table::field_table,
};
use futures_util::{future::join_all, stream::Fuse, StreamExt};
use lapin::options::BasicQosOptions;
use opentelemetry::trace::Span;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

/// State shared by the workers of one consumer.
struct Pool {
    consumer: String,
    deliveries: Mutex<Fuse<Deliveries>>,
    handler: Arc<dyn MessageHandler>,
    channel: Box<dyn BrokerChannel>,
    released: AtomicBool,
    remaining: AtomicUsize,
}

impl Pool {
    /// Closes the consumer channel once; later calls are no-ops.
    async fn release(&self) -> Result<(), AmqpError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.channel.close().await
    }
}

/// Workers and channel of a running consumer.
pub struct ConsumerHandle {
    pool: Arc<Pool>,
    cancel: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl ConsumerHandle {
    /// Number of workers that have not exited yet.
    pub fn running_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// True once every worker has exited.
    pub fn is_finished(&self) -> bool {
        self.running_workers() == 0
    }

    /// Signals the workers, closes the consumer channel and waits for every
    /// worker to exit.
    ///
    /// # Returns
    /// The failure to close the channel, reported after the workers are gone
    pub async fn shutdown(self) -> Result<(), AmqpError> {
        let consumer = self.pool.consumer.as_str();
        debug!(consumer, "stopping consumer");
        // Err only means every worker already exited.
        let _ = self.cancel.send(true);

        let closed = self.pool.release().await;

        for res in join_all(self.workers).await {
            if let Err(err) = res {
                error!(error = err.to_string(), consumer, "worker task failure");
            }
        }

        info!(consumer, "consumer stopped");
        closed
    }
}

/// Opens a channel, registers `name` on the configured queue and spawns
/// `spec.workers_count()` workers feeding `handler`.
///
/// On failure the channel is released and no worker is spawned.
///
/// # Parameters
/// * `conn` - The connection the consumer channel is opened on
/// * `name` - The consumer name, also used as the consumer tag
/// * `spec` - The consumer definition
/// * `handler` - The handler shared by every worker
///
/// # Returns
/// A handle owning the channel and the workers
pub(crate) async fn start(
    conn: &dyn BrokerConnection,
    name: &str,
    spec: &ConsumerSpec,
    handler: Arc<dyn MessageHandler>,
) -> Result<ConsumerHandle, AmqpError> {
    let channel = conn.create_channel().await?;

    let deliveries = match register(channel.as_ref(), name, spec).await {
        Ok(deliveries) => deliveries,
        Err(err) => {
            if let Err(close_err) = channel.close().await {
                warn!(error = close_err.to_string(), consumer = name, "failure to release consumer channel");
            }
            return Err(err);
        }
    };

    let count = spec.workers_count();
    let pool = Arc::new(Pool {
        consumer: name.to_owned(),
        deliveries: Mutex::new(deliveries.fuse()),
        handler,
        channel,
        released: AtomicBool::new(false),
        remaining: AtomicUsize::new(count),
    });
    let (cancel, cancel_rx) = watch::channel(false);

    let workers = (0..count)
        .map(|id| tokio::spawn(work(pool.clone(), id, cancel_rx.clone())))
        .collect::<Vec<_>>();

    info!(
        consumer = name,
        queue = spec.queue,
        workers = workers.len(),
        "consumer started"
    );

    Ok(ConsumerHandle {
        pool,
        cancel,
        workers,
    })
}

async fn register(
    channel: &dyn BrokerChannel,
    name: &str,
    spec: &ConsumerSpec,
) -> Result<Deliveries, AmqpError> {
    if let Some(prefetch) = spec.prefetch_count {
        channel
            .basic_qos(prefetch, BasicQosOptions { global: false })
            .await?;
    }

    channel
        .basic_consume(
            &spec.queue,
            name,
            spec.consume_options(),
            field_table(&spec.args),
        )
        .await
}

async fn work(pool: Arc<Pool>, worker: usize, mut cancel: watch::Receiver<bool>) {
    let consumer = pool.consumer.as_str();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.changed() => break,
            next = async { pool.deliveries.lock().await.next().await } => next,
        };

        match next {
            Some(Ok(delivery)) => {
                let (_ctx, mut span) = otel::consumer_span(&delivery.properties, consumer);
                debug!(consumer, worker, tag = delivery.delivery_tag, "received message");
                pool.handler.handle(Message::new(delivery)).await;
                span.end();
            }
            Some(Err(err)) => error!(error = err.to_string(), consumer, worker, "errors consume msg"),
            None => break,
        }
    }

    info!(consumer, worker, "worker exited: delivery stream closed or consumer stopped");

    if pool.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
        match pool.release().await {
            Ok(()) => debug!(consumer, "consumer channel released"),
            Err(err) => warn!(error = err.to_string(), consumer, "failure to release consumer channel"),
        }
    }
}
