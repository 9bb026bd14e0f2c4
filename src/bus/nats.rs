// Copyright 2025 Cowboy AI, LLC.

//! NATS client for the discovery event bus

use async_nats::jetstream::{self, Context as JetStreamContext};
use async_nats::{Client, ConnectOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that can occur when working with NATS
#[derive(Debug, Error)]
pub enum NatsError {
    /// Failed to establish connection to NATS server
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Error occurred in JetStream operations
    #[error("JetStream error: {0}")]
    JetStreamError(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl From<NatsError> for crate::errors::DiscoveryError {
    fn from(err: NatsError) -> Self {
        crate::errors::DiscoveryError::Bus(err.to_string())
    }
}

/// Configuration for the NATS client connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL (e.g., "nats://localhost:4222")
    pub url: String,

    /// Optional username for authentication
    pub user: Option<String>,

    /// Optional password for authentication
    pub password: Option<String>,

    /// Whether TLS is required
    pub tls_required: bool,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Reconnect interval in seconds
    pub reconnect_interval_secs: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            user: None,
            password: None,
            tls_required: false,
            connection_timeout_secs: 10,
            reconnect_interval_secs: 5,
        }
    }
}

/// NATS client wrapper with JetStream support
#[derive(Debug)]
pub struct NatsClient {
    /// The underlying NATS client
    client: Client,
    /// JetStream context for persistent messaging
    jetstream: JetStreamContext,
    /// Configuration used to establish the connection
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to the NATS server with the provided configuration
    pub async fn connect(config: NatsConfig) -> Result<Self, NatsError> {
        let reconnect_interval = config.reconnect_interval_secs;
        let mut options = ConnectOptions::new()
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .reconnect_delay_callback(move |_attempts| Duration::from_secs(reconnect_interval))
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Disconnected => warn!("NATS disconnected"),
                    async_nats::Event::Connected => info!("NATS connected"),
                    async_nats::Event::ClientError(err) => error!("NATS client error: {err}"),
                    _ => {}
                }
            });

        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            options = options.user_and_password(user.clone(), password.clone());
        }

        if config.tls_required {
            options = options.require_tls(true);
        }

        let client = options.connect(&config.url).await.map_err(|e| {
            NatsError::ConnectionFailed(format!("Failed to connect to {}: {}", config.url, e))
        })?;

        let jetstream = jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// Get the underlying NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get the JetStream context
    pub fn jetstream(&self) -> &JetStreamContext {
        &self.jetstream
    }

    /// Get the configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    /// Check if the client is connected
    pub async fn is_connected(&self) -> bool {
        self.client.flush().await.is_ok()
    }
}
