//! RabbitMQ client for the ember event mesh.
//!
//! Conventions: a single durable topic exchange `ember.events`; routing keys
//! follow `ember.{domain}.{entity}.{action}`; each service owns durable
//! queues named `{service}.{binding}` with consumer tags `{service}-{binding}`.
//! Published messages carry the envelope id as the AMQP message id so
//! consumers can spot redeliveries.

use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    Consumer,
};
use serde::Serialize;

use crate::types::Event;

const EXCHANGE_NAME: &str = "ember.events";

#[derive(Clone)]
pub struct RabbitMQClient {
    channel: Channel,
    service: String,
}

impl RabbitMQClient {
    pub async fn connect(url: &str, service: &str) -> Result<Self, lapin::Error> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;

        // Declare the topic exchange
        channel
            .exchange_declare(
                EXCHANGE_NAME,
                lapin::ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        tracing::info!(url = %url, service = %service, "connected to RabbitMQ");
        Ok(Self {
            channel,
            service: service.to_string(),
        })
    }

    /// Publish an event with a routing key, waiting for broker confirmation.
    pub async fn publish<T: Serialize>(
        &self,
        routing_key: &str,
        event: &Event<T>,
    ) -> Result<(), lapin::Error> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| {
                tracing::error!(error = %e, "failed to serialize event");
                lapin::Error::IOError(std::sync::Arc::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e,
                )))
            })?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2) // persistent
            .with_message_id(event.id.to_string().into())
            .with_app_id(self.service.clone().into())
            .with_timestamp(event.timestamp.timestamp().max(0) as u64);

        self.channel
            .basic_publish(
                EXCHANGE_NAME,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?
            .await?;

        tracing::debug!(
            routing_key = %routing_key,
            event_id = %event.id,
            "event published"
        );

        Ok(())
    }

    /// Durable queue bound to the given routing keys. The queue name and
    /// consumer tag derive from the owning service and the binding label, so
    /// every replica of a service shares one queue.
    pub async fn subscribe(
        &self,
        binding: &str,
        routing_keys: &[&str],
    ) -> Result<Consumer, lapin::Error> {
        let queue_name = format!("{}.{}", self.service, binding);

        self.channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        for key in routing_keys {
            self.channel
                .queue_bind(
                    &queue_name,
                    EXCHANGE_NAME,
                    key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        let consumer = self.channel
            .basic_consume(
                &queue_name,
                &format!("{}-{}", self.service, binding),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(
            queue = %queue_name,
            bindings = ?routing_keys,
            "subscribed to RabbitMQ queue"
        );

        Ok(consumer)
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}
