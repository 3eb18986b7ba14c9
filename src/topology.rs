// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module declares configured queues and binds them to their exchanges.
//! Each queue is declared on its own short-lived channel which is released on
//! every exit path.

use crate::{
    channel::{BrokerChannel, BrokerConnection},
    errors::AmqpError,
    queue::QueueSpec,
    table::field_table,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Declares `name` with its options and binds it to the configured exchange.
pub(crate) async fn declare_on(
    conn: &dyn BrokerConnection,
    name: &str,
    spec: &QueueSpec,
) -> Result<(), AmqpError> {
    let channel = conn.create_channel().await?;

    let result = declare_and_bind(channel.as_ref(), name, spec).await;

    if let Err(err) = channel.close().await {
        warn!(error = err.to_string(), queue = name, "failure to release declare channel");
    }

    result
}

async fn declare_and_bind(
    channel: &dyn BrokerChannel,
    name: &str,
    spec: &QueueSpec,
) -> Result<(), AmqpError> {
    debug!("creating queue: {}", name);

    channel
        .queue_declare(name, spec.declare_options(), field_table(&spec.options.args))
        .await?;

    debug!(
        "binding queue: {} to the exchange: {} with the key: {}",
        name, spec.exchange, spec.routing_key
    );

    channel
        .queue_bind(
            name,
            &spec.exchange,
            &spec.routing_key,
            spec.bind_options(),
            field_table(&spec.options.args),
        )
        .await?;

    debug!("queue: {} was created", name);
    Ok(())
}

/// Declares every queue, stopping at the first failure.
pub(crate) async fn declare_all(
    conn: &dyn BrokerConnection,
    queues: &HashMap<String, QueueSpec>,
) -> Result<(), AmqpError> {
    for (name, spec) in queues {
        declare_on(conn, name, spec).await?;
    }
    Ok(())
}
