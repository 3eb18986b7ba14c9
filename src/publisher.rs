// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! This module provides named producer profiles and the publish operation that
//! turns a profile plus a payload into a broker publish. Trace context of the
//! caller is propagated in the message headers.

use crate::{
    channel::BrokerConnection,
    errors::AmqpError,
    otel::RabbitMQTracePropagator,
    table::{normalize_table, wire_map, ArgTable},
};
use chrono::{DateTime, Utc};
use lapin::{
    options::BasicPublishOptions,
    types::{FieldTable, ShortString},
    BasicProperties,
};
use opentelemetry::{global, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Message metadata attached to every publish of a producer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishProfile {
    pub headers: ArgTable,
    pub content_type: String,
    pub content_encoding: String,
    /// Transient (0 or 1) or persistent (2).
    pub delivery_mode: u8,
    pub priority: u8,
    pub correlation_id: String,
    pub reply_to: String,
    pub expiration: String,
    pub message_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: String,
    pub app_id: String,
}

/// Definition of a named producer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerSpec {
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub immediate: bool,
    /// Fills in a UUID v4 message id when the profile has none.
    pub generate_message_id: bool,
    pub options: PublishProfile,
}

impl ProducerSpec {
    /// Creates a producer publishing to `exchange` with `routing_key`.
    pub fn new(exchange: &str, routing_key: &str) -> ProducerSpec {
        ProducerSpec {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            ..Default::default()
        }
    }

    /// Sets the message content type, e.g. `application/json`.
    pub fn content_type(mut self, content_type: &str) -> Self {
        self.options.content_type = content_type.to_owned();
        self
    }

    /// Marks messages as persistent.
    pub fn persistent(mut self) -> Self {
        self.options.delivery_mode = 2;
        self
    }

    /// Stamps every message without a configured `message_id` with a fresh UUID v4.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn generate_message_id(mut self) -> Self {
        self.generate_message_id = true;
        self
    }

    pub(crate) fn normalize(&mut self) {
        normalize_table(&mut self.options.headers);
    }

    pub(crate) fn publish_options(&self) -> BasicPublishOptions {
        BasicPublishOptions {
            mandatory: self.mandatory,
            immediate: self.immediate,
        }
    }

    /// Builds the message properties. Empty strings and zero numbers are left unset.
    pub(crate) fn properties(&self, ctx: &Context) -> BasicProperties {
        let profile = &self.options;
        let mut headers = wire_map(&profile.headers);

        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(ctx, &mut RabbitMQTracePropagator::new(&mut headers))
        });

        let mut props = BasicProperties::default().with_headers(FieldTable::from(headers));

        if !profile.message_id.is_empty() {
            props = props.with_message_id(short(&profile.message_id));
        } else if self.generate_message_id {
            props = props.with_message_id(ShortString::from(Uuid::new_v4().to_string()));
        }
        if !profile.content_type.is_empty() {
            props = props.with_content_type(short(&profile.content_type));
        }
        if !profile.content_encoding.is_empty() {
            props = props.with_content_encoding(short(&profile.content_encoding));
        }
        if profile.delivery_mode != 0 {
            props = props.with_delivery_mode(profile.delivery_mode);
        }
        if profile.priority != 0 {
            props = props.with_priority(profile.priority);
        }
        if !profile.correlation_id.is_empty() {
            props = props.with_correlation_id(short(&profile.correlation_id));
        }
        if !profile.reply_to.is_empty() {
            props = props.with_reply_to(short(&profile.reply_to));
        }
        if !profile.expiration.is_empty() {
            props = props.with_expiration(short(&profile.expiration));
        }
        if let Some(ts) = profile.timestamp.filter(|ts| ts.timestamp() > 0) {
            props = props.with_timestamp(ts.timestamp() as u64);
        }
        if !profile.kind.is_empty() {
            props = props.with_kind(short(&profile.kind));
        }
        if !profile.user_id.is_empty() {
            props = props.with_user_id(short(&profile.user_id));
        }
        if !profile.app_id.is_empty() {
            props = props.with_app_id(short(&profile.app_id));
        }

        props
    }
}

fn short(value: &str) -> ShortString {
    ShortString::from(value.to_owned())
}

/// Publishes `payload` with the producer's profile on a dedicated channel.
///
/// The channel is closed whether or not the publish succeeded.
pub(crate) async fn publish_on(
    conn: &dyn BrokerConnection,
    name: &str,
    spec: &ProducerSpec,
    payload: &[u8],
) -> Result<(), AmqpError> {
    let channel = conn.create_channel().await?;

    debug!(
        producer = name,
        exchange = spec.exchange,
        routing_key = spec.routing_key,
        "publishing message"
    );

    let result = channel
        .basic_publish(
            &spec.exchange,
            &spec.routing_key,
            spec.publish_options(),
            payload,
            spec.properties(&Context::current()),
        )
        .await;

    if let Err(err) = channel.close().await {
        warn!(error = err.to_string(), producer = name, "failure to release publish channel");
    }

    result
}
