//! Publisher port and its RabbitMQ adapter.
//!
//! The adapter speaks AMQP 0-9-1: one direct exchange, one durable queue per
//! sensor kind, each bound with the kind tag as routing key. The channel runs
//! in confirm mode and messages are published `mandatory`, so a message that
//! reaches no queue comes back as an error instead of being dropped.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{FieldTable, ShortString};
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::error::PublishError;
use crate::models::{NormalizedReading, SensorKind};

// ---

const BROKER_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent delivery mode.
const PERSISTENT: u8 = 2;

/// Republishes stored readings onto a message bus, routed by sensor kind.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, reading: &NormalizedReading) -> Result<(), PublishError>;
}

/// [`Publisher`] backed by a RabbitMQ connection.
pub struct RabbitPublisher {
    // Owns the socket; the channel is only valid while it is open
    _connection: Connection,
    channel: Channel,
    exchange: String,
    queues: BTreeMap<SensorKind, String>,
}

impl RabbitPublisher {
    // ---
    /// Open a connection and a confirm-mode channel.
    pub async fn connect(cfg: &BrokerConfig) -> Result<Self, PublishError> {
        // ---
        tracing::info!("Connecting to RabbitMQ at {}:{}", cfg.host, cfg.port);

        let connection = with_timeout(
            "connect",
            Connection::connect_uri(amqp_uri(cfg), ConnectionProperties::default()),
        )
        .await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        Ok(Self {
            _connection: connection,
            channel,
            exchange: cfg.exchange.clone(),
            queues: cfg.queues.clone(),
        })
    }

    /// Declare the exchange, one durable queue per kind, and their bindings.
    ///
    /// Idempotent; the broker accepts redeclaration with identical settings.
    pub async fn declare_topology(&self) -> Result<(), PublishError> {
        // ---
        tracing::info!("Declaring exchange {}", self.exchange);

        self.channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        for (kind, queue) in &self.queues {
            self.channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..QueueDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;

            self.channel
                .queue_bind(
                    queue,
                    &self.exchange,
                    kind.as_str(),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;

            tracing::info!(
                "Queue {} bound to exchange {} with routing key {}",
                queue,
                self.exchange,
                kind
            );
        }

        Ok(())
    }

    /// Name of the queue bound to `kind`.
    pub fn queue_for(&self, kind: SensorKind) -> &str {
        queue_name(&self.queues, kind)
    }
}

#[async_trait]
impl Publisher for RabbitPublisher {
    // ---
    async fn publish(&self, reading: &NormalizedReading) -> Result<(), PublishError> {
        // ---
        let routing_key = reading.kind.as_str();
        let payload = serde_json::to_vec(reading)?;

        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..BasicPublishOptions::default()
                },
                &payload,
                message_properties(),
            )
            .await?;

        match with_timeout("publish confirm", confirm).await? {
            Confirmation::Ack(None) | Confirmation::NotRequested => {}
            Confirmation::Ack(Some(_)) => {
                return Err(PublishError::Unroutable {
                    routing_key: routing_key.to_string(),
                });
            }
            Confirmation::Nack(_) => {
                return Err(PublishError::Nacked {
                    routing_key: routing_key.to_string(),
                });
            }
        }

        tracing::info!(
            "Published message to {} queue with routing key {}: {}",
            self.queue_for(reading.kind),
            routing_key,
            String::from_utf8_lossy(&payload)
        );
        Ok(())
    }
}

fn amqp_uri(cfg: &BrokerConfig) -> AMQPUri {
    // ---
    AMQPUri {
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: cfg.user.clone(),
                password: cfg.password.clone(),
            },
            host: cfg.host.clone(),
            port: cfg.port,
        },
        vhost: cfg.vhost.clone(),
        ..AMQPUri::default()
    }
}

fn message_properties() -> BasicProperties {
    // ---
    BasicProperties::default()
        .with_content_type(ShortString::from("application/json"))
        .with_delivery_mode(PERSISTENT)
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_timestamp(Utc::now().timestamp().max(0) as u64)
}

fn queue_name(queues: &BTreeMap<SensorKind, String>, kind: SensorKind) -> &str {
    queues.get(&kind).map(String::as_str).unwrap_or("unknown")
}

async fn with_timeout<T>(
    step: &'static str,
    fut: impl Future<Output = lapin::Result<T>>,
) -> Result<T, PublishError> {
    // ---
    match tokio::time::timeout(BROKER_TIMEOUT, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(PublishError::Timeout {
            step,
            after: BROKER_TIMEOUT,
        }),
    }
}
