//! MQTT binding of the benchmark bus.
//!
//! Incoming data, command and task messages are each handed to the
//! [`BusHandler`] on their own blocking worker, so a command handler waiting
//! for the reception barrier never stalls the delivery of further fragments.

use crate::bus::protocol::{ByteReader, Command};
use crate::bus::{BusHandler, MessageBus};
use crate::config::MqttBusConfig;
use crate::core::TaskResult;
use crate::error::{AdapterError, Result};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Topic names derived from the configured prefix.
#[derive(Debug, Clone)]
pub struct Topics {
    pub data: String,
    pub command: String,
    pub task: String,
    pub controller: String,
    pub results: String,
}

impl Topics {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            data: format!("{}/data", prefix),
            command: format!("{}/command", prefix),
            task: format!("{}/task", prefix),
            controller: format!("{}/controller", prefix),
            results: format!("{}/results", prefix),
        }
    }
}

/// MQTT connection shared by the receive loop and the outgoing sinks.
pub struct MqttBus {
    topics: Topics,
    runtime: Arc<Runtime>,
    client: AsyncClient,
    eventloop: Mutex<Option<EventLoop>>,
    should_stop: Arc<AtomicBool>,
    messages_received: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

impl MqttBus {
    pub fn new(config: &MqttBusConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| AdapterError::Transport(format!("cannot build runtime: {}", e)))?;

        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        let (client, eventloop) = AsyncClient::new(options, 100);

        Ok(Self {
            topics: Topics::with_prefix(&config.topic_prefix),
            runtime: Arc::new(runtime),
            client,
            eventloop: Mutex::new(Some(eventloop)),
            should_stop: Arc::new(AtomicBool::new(false)),
            messages_received: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Subscribe to the incoming topics and deliver messages until stopped.
    pub fn run(&self, handler: Arc<dyn BusHandler>) -> Result<()> {
        let mut eventloop = self
            .eventloop
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| AdapterError::Transport("bus is already running".to_string()))?;
        let topics = self.topics.clone();
        let client = self.client.clone();
        let should_stop = Arc::clone(&self.should_stop);
        let received = Arc::clone(&self.messages_received);
        let errors = Arc::clone(&self.errors);

        self.runtime.block_on(async move {
            for topic in [&topics.data, &topics.command, &topics.task] {
                client
                    .subscribe(topic.as_str(), QoS::AtLeastOnce)
                    .await
                    .map_err(|e| AdapterError::Transport(e.to_string()))?;
                info!(topic = %topic, "subscribed");
            }

            while !should_stop.load(Ordering::Relaxed) {
                let notification = match tokio::time::timeout(POLL_INTERVAL, eventloop.poll()).await
                {
                    Ok(notification) => notification,
                    Err(_) => continue,
                };
                match notification {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        received.fetch_add(1, Ordering::Relaxed);
                        let topic = String::from_utf8_lossy(publish.topic.as_ref()).to_string();
                        let payload = publish.payload.to_vec();
                        let handler = Arc::clone(&handler);
                        let topics = topics.clone();
                        let errors = Arc::clone(&errors);
                        tokio::task::spawn_blocking(move || {
                            if let Err(e) = route(&topics, &topic, &payload, handler.as_ref()) {
                                errors.fetch_add(1, Ordering::Relaxed);
                                error!(topic = %topic, error = %e, "dropping message");
                            }
                        });
                    }
                    Ok(other) => debug!(event = ?other, "mqtt event"),
                    Err(e) => {
                        warn!(error = ?e, "mqtt event loop error, reconnecting");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            info!("stop signal received, leaving mqtt loop");
            Ok(())
        })
    }

    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::Relaxed);
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "disconnect request not queued");
        }
    }

    /// Messages received and messages dropped as malformed.
    pub fn metrics(&self) -> (u64, u64) {
        (self.messages_received.load(Ordering::Relaxed), self.errors.load(Ordering::Relaxed))
    }

    fn publish(&self, topic: &str, message: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, message)
            .map_err(|e| AdapterError::Transport(format!("publish to {} failed: {}", topic, e)))
    }
}

/// Hand one incoming message to the matching handler method.
pub fn route(topics: &Topics, topic: &str, payload: &[u8], handler: &dyn BusHandler) -> Result<()> {
    if topic == topics.data {
        handler.receive_generated_data(payload);
    } else if topic == topics.command {
        let (opcode, rest) = payload
            .split_first()
            .ok_or_else(|| AdapterError::Transport("empty command message".to_string()))?;
        handler.receive_command(*opcode, rest);
    } else if topic == topics.task {
        let mut reader = ByteReader::new(payload);
        let task_id = reader.read_string()?;
        handler.receive_generated_task(&task_id, reader.rest());
    } else {
        return Err(AdapterError::Transport(format!("unexpected topic {}", topic)));
    }
    Ok(())
}

impl MessageBus for MqttBus {
    fn send_command(&self, command: Command) -> Result<()> {
        self.publish(&self.topics.controller, command.to_message())
    }

    fn send_result(&self, result: &TaskResult) -> Result<()> {
        self.publish(&self.topics.results, super::protocol::encode_result_message(result))
    }
}
