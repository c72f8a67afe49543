use crate::connector::{
    router::{self, Router},
    ClientConfig, ClientError, ConnectParams, ConnectionError, ConnectorOptions, HubStatus,
    RefusalReason, RumqttcTransport, Transport, Will,
};
use crate::model::{Device, Entity};
use crate::utils::lock;
use bytes::Bytes;
use rumqttc::QoS;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const ONLINE: &str = "online";
const OFFLINE: &str = "offline";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

pub(crate) struct Inner<T> {
    pub(crate) transport: T,
    pub(crate) config: ClientConfig,
    pub(crate) router: Mutex<Router>,
    pub(crate) hub_status: watch::Sender<HubStatus>,
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) refusal: Mutex<Option<RefusalReason>>,
    devices: RwLock<Arc<[Device]>>,
    connect_time: Mutex<Option<Instant>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(dispatcher) = lock(&self.dispatcher).take() {
            dispatcher.abort();
        }
    }
}

/// A client, publishing entities to the hub.
///
/// Cloning is cheap, all clones share the same connection.
pub struct MqttClient<T: Transport = RumqttcTransport> {
    pub(crate) inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for MqttClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl MqttClient<RumqttcTransport> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, RumqttcTransport::default())
    }
}

impl<T: Transport> MqttClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                router: Mutex::new(Router::default()),
                hub_status: watch::channel(HubStatus::default()).0,
                state: watch::channel(ConnectionState::default()).0,
                refusal: Default::default(),
                devices: RwLock::new(Arc::from(Vec::new())),
                connect_time: Default::default(),
                dispatcher: Default::default(),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// When the last connection attempt was started, `None` if never.
    pub fn connect_time(&self) -> Option<Instant> {
        *lock(&self.inner.connect_time)
    }

    /// Replace the set of devices used by following discovery cycles.
    pub fn set_devices(&self, devices: impl Into<Arc<[Device]>>) {
        *self
            .inner
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner) = devices.into();
    }

    /// A snapshot of the current set of devices.
    pub fn devices(&self) -> Arc<[Device]> {
        self.inner
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Connect to the broker, waiting until the connection is established.
    ///
    /// Does nothing when already connected. Otherwise any previous connection is dropped first,
    /// without a clean disconnect, so that the last will is active for every new session.
    pub async fn connect(&self, options: &ConnectorOptions) -> Result<(), ConnectionError> {
        if self.is_connected() {
            return Ok(());
        }

        self.disconnect();

        *lock(&self.inner.connect_time) = Some(Instant::now());
        *lock(&self.inner.refusal) = None;
        self.inner.state.send_replace(ConnectionState::Connecting);

        let params = ConnectParams {
            client_id: options.client_id(),
            host: options.host.clone(),
            port: options.port(),
            username: options.username.clone(),
            password: options.password.clone(),
            keep_alive: options.keep_alive,
            tls: options.tls,
            last_will: self.inner.config.availability_topic.as_ref().map(|topic| Will {
                topic: topic.clone(),
                payload: Bytes::from_static(OFFLINE.as_bytes()),
                retain: true,
            }),
        };

        log::info!(
            "Connecting to {}@{}:{}",
            params.username.as_deref().unwrap_or_default(),
            params.host,
            params.port
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(router::dispatch(Arc::downgrade(&self.inner), rx));
        *lock(&self.inner.dispatcher) = Some(dispatcher);

        if let Err(err) = self.inner.transport.start(params.clone(), tx) {
            self.fail();
            return Err(err.into());
        }

        let mut retries = self.inner.config.connect_retries;
        while !self.is_connected() {
            let refusal = *lock(&self.inner.refusal);
            if let Some(reason) = refusal {
                log::warn!("Connection refused: {reason}");
                self.fail();
                return Err(ConnectionError::Refused {
                    host: params.host,
                    port: params.port,
                    reason,
                });
            }

            if retries == 0 {
                log::warn!("Gave up waiting for the connection");
                self.fail();
                return Err(ConnectionError::Timeout {
                    username: params.username.unwrap_or_default(),
                    host: params.host,
                    port: params.port,
                });
            }

            retries -= 1;
            tokio::time::sleep(self.inner.config.connect_poll_interval).await;
        }

        log::info!("Connected");
        self.inner.state.send_replace(ConnectionState::Connected);
        self.restore_session().await;

        Ok(())
    }

    fn fail(&self) {
        self.inner.transport.stop();
        if let Some(dispatcher) = lock(&self.inner.dispatcher).take() {
            dispatcher.abort();
        }
        self.inner.state.send_replace(ConnectionState::Failed);
    }

    /// Drop the connection.
    ///
    /// No disconnect is sent to the broker, which then publishes the last will.
    pub fn disconnect(&self) {
        self.inner.transport.stop();
        if let Some(dispatcher) = lock(&self.inner.dispatcher).take() {
            dispatcher.abort();
        }

        let previous = self.inner.state.send_replace(ConnectionState::Disconnected);
        if previous == ConnectionState::Connected {
            log::info!("Disconnected");
        }
    }

    /// Wait until the client is connected.
    pub async fn wait_connected(&self) {
        let mut state = self.inner.state.subscribe();
        // the sender lives as long as we do
        let _ = state
            .wait_for(|state| *state == ConnectionState::Connected)
            .await;
    }

    /// Announce availability and restore all subscriptions, after a new session was established.
    pub(crate) async fn restore_session(&self) {
        if let Some(topic) = &self.inner.config.availability_topic {
            if let Err(err) = self.publish(topic.clone(), ONLINE, QoS::AtLeastOnce, true).await {
                log::warn!("Failed to announce availability: {err}");
            }
        }

        let topics = lock(&self.inner.router).topics();
        for topic in topics {
            if let Err(err) = self.subscribe(&topic).await {
                log::warn!("{err}");
            }
        }
    }

    /// Publish a message. Retained messages are sent with at least [`QoS::AtLeastOnce`].
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), ClientError> {
        let topic = topic.into();
        let qos = match qos {
            QoS::AtMostOnce if retain => QoS::AtLeastOnce,
            qos => qos,
        };

        log::debug!("Publish to {topic} (qos: {qos:?}, retain: {retain})");

        self.inner
            .transport
            .publish(topic.clone(), payload.into(), qos, retain)
            .await
            .map_err(|source| ClientError::Publish { topic, source })
    }

    /// Publish a new state of an entity.
    pub async fn update_state(
        &self,
        entity: &Entity,
        payload: impl Into<Bytes>,
    ) -> Result<(), ClientError> {
        let topic = entity
            .state_topic()
            .ok_or_else(|| ClientError::MissingStateTopic(entity.unique_id().to_string()))?;

        self.publish(topic, payload, QoS::AtLeastOnce, false).await
    }

    /// Publish the attributes of an entity, as JSON document.
    pub async fn send_json_attributes(
        &self,
        entity: &Entity,
        attributes: &impl serde::Serialize,
        retain: bool,
    ) -> Result<(), ClientError> {
        let topic = entity
            .json_attributes_topic()
            .ok_or_else(|| ClientError::MissingAttributesTopic(entity.unique_id().to_string()))?;

        let payload = serde_json::to_vec(attributes)?;
        self.publish(topic, payload, QoS::AtLeastOnce, retain).await
    }

    pub(crate) async fn subscribe(&self, topic: &str) -> Result<(), ClientError> {
        log::debug!("Subscribe to {topic}");
        self.inner
            .transport
            .subscribe(topic.to_string(), QoS::AtLeastOnce)
            .await
            .map_err(|source| ClientError::Subscribe {
                topic: topic.to_string(),
                source,
            })
    }

    pub(crate) async fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        log::debug!("Unsubscribe from {topic}");
        self.inner
            .transport
            .unsubscribe(topic.to_string())
            .await
            .map_err(|source| ClientError::Unsubscribe {
                topic: topic.to_string(),
                source,
            })
    }
}
