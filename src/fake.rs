// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! In-memory broker for tests.
//!
//! Records declares, binds and publishes, tracks how many channels are open and
//! whether a channel is ever entered by two callers at once, and lets tests push
//! deliveries into registered consumers.

use crate::{
    channel::{
        Acknowledger, Broker, BrokerChannel, BrokerConnection, Deliveries, Delivery,
    },
    errors::AmqpError,
};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use lapin::{
    options::{
        BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Published {
    pub channel: u64,
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub properties: BasicProperties,
}

#[derive(Default)]
struct State {
    fail_connect: AtomicBool,
    fail_declare: Mutex<Option<String>>,
    publish_delay: Mutex<Option<Duration>>,
    connections_open: AtomicUsize,
    connects: AtomicUsize,
    next_channel: AtomicU64,
    channels_open: AtomicUsize,
    publishes_in_flight: AtomicUsize,
    max_publishes_in_flight: AtomicUsize,
    shared_channel_use: AtomicBool,
    declared: Mutex<Vec<String>>,
    bound: Mutex<Vec<(String, String, String)>>,
    published: Mutex<Vec<Published>>,
    acks: AtomicUsize,
    consumers: Mutex<HashMap<String, Vec<(u64, mpsc::UnboundedSender<Delivery>)>>>,
    next_tag: AtomicU64,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBroker {
    state: Arc<State>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(&self) {
        self.state.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn fail_declare_of(&self, queue: &str) {
        *self.state.fail_declare.lock().unwrap() = Some(queue.to_owned());
    }

    pub fn slow_publishes(&self, delay: Duration) {
        *self.state.publish_delay.lock().unwrap() = Some(delay);
    }

    pub fn connections_open(&self) -> usize {
        self.state.connections_open.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn open_channels(&self) -> usize {
        self.state.channels_open.load(Ordering::SeqCst)
    }

    pub fn max_publishes_in_flight(&self) -> usize {
        self.state.max_publishes_in_flight.load(Ordering::SeqCst)
    }

    pub fn channel_was_shared(&self) -> bool {
        self.state.shared_channel_use.load(Ordering::SeqCst)
    }

    pub fn declared(&self) -> Vec<String> {
        self.state.declared.lock().unwrap().clone()
    }

    pub fn bound(&self) -> Vec<(String, String, String)> {
        self.state.bound.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.state.published.lock().unwrap().clone()
    }

    pub fn acks(&self) -> usize {
        self.state.acks.load(Ordering::SeqCst)
    }

    /// Pushes a message to the first consumer registered on `queue`.
    pub fn deliver(&self, queue: &str, body: &[u8]) {
        let consumers = self.state.consumers.lock().unwrap();
        let Some((_, tx)) = consumers.get(queue).and_then(|c| c.first()) else {
            panic!("no consumer registered on {queue}");
        };
        let delivery = Delivery {
            delivery_tag: self.state.next_tag.fetch_add(1, Ordering::SeqCst) + 1,
            exchange: String::new(),
            routing_key: queue.to_owned(),
            redelivered: false,
            properties: BasicProperties::default(),
            data: body.to_vec(),
            acker: Box::new(FakeAcker {
                state: self.state.clone(),
            }),
        };
        tx.send(delivery).unwrap();
    }

    /// Ends every delivery stream registered on `queue`, as a broker-side cancel would.
    pub fn end_stream(&self, queue: &str) {
        self.state.consumers.lock().unwrap().remove(queue);
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn connect(&self, _uri: &str) -> Result<Arc<dyn BrokerConnection>, AmqpError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(AmqpError::ConnectionError);
        }
        self.state.connections_open.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeConnection {
    state: Arc<State>,
    closed: AtomicBool,
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>, AmqpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AmqpError::ChannelError);
        }
        self.state.channels_open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeChannel {
            id: self.state.next_channel.fetch_add(1, Ordering::SeqCst) + 1,
            state: self.state.clone(),
            busy: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), AmqpError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.connections_open.fetch_sub(1, Ordering::SeqCst);
            self.state.consumers.lock().unwrap().clear();
        }
        Ok(())
    }
}

struct FakeChannel {
    id: u64,
    state: Arc<State>,
    busy: AtomicBool,
    closed: AtomicBool,
}

impl FakeChannel {
    fn enter(&self) {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.state.shared_channel_use.store(true, Ordering::SeqCst);
        }
    }

    fn leave(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrokerChannel for FakeChannel {
    async fn queue_declare(
        &self,
        queue: &str,
        _options: QueueDeclareOptions,
        _arguments: FieldTable,
    ) -> Result<(), AmqpError> {
        if self.state.fail_declare.lock().unwrap().as_deref() == Some(queue) {
            return Err(AmqpError::DeclareQueueError(queue.to_owned()));
        }
        self.state.declared.lock().unwrap().push(queue.to_owned());
        Ok(())
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        _options: QueueBindOptions,
        _arguments: FieldTable,
    ) -> Result<(), AmqpError> {
        self.state.bound.lock().unwrap().push((
            queue.to_owned(),
            exchange.to_owned(),
            routing_key.to_owned(),
        ));
        Ok(())
    }

    async fn basic_qos(
        &self,
        _prefetch_count: u16,
        _options: BasicQosOptions,
    ) -> Result<(), AmqpError> {
        Ok(())
    }

    async fn basic_consume(
        &self,
        queue: &str,
        _consumer_tag: &str,
        _options: BasicConsumeOptions,
        _arguments: FieldTable,
    ) -> Result<Deliveries, AmqpError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .consumers
            .lock()
            .unwrap()
            .entry(queue.to_owned())
            .or_default()
            .push((self.id, tx));

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (Ok(delivery), rx))
        })
        .boxed())
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        _options: BasicPublishOptions,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        self.enter();
        let in_flight = self.state.publishes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_publishes_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.state.publish_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.state.published.lock().unwrap().push(Published {
            channel: self.id,
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            payload: payload.to_vec(),
            properties,
        });

        self.state.publishes_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.leave();
        Ok(())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.channels_open.fetch_sub(1, Ordering::SeqCst);
            for consumers in self.state.consumers.lock().unwrap().values_mut() {
                consumers.retain(|(channel, _)| *channel != self.id);
            }
        }
        Ok(())
    }
}

struct FakeAcker {
    state: Arc<State>,
}

#[async_trait]
impl Acknowledger for FakeAcker {
    async fn ack(&self) -> Result<(), AmqpError> {
        self.state.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self, _requeue: bool) -> Result<(), AmqpError> {
        Ok(())
    }

    async fn reject(&self, _requeue: bool) -> Result<(), AmqpError> {
        Ok(())
    }
}
