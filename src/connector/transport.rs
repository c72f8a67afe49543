use crate::connector::{RefusalReason, TransportError};
use crate::utils::lock;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS,
    TlsConfiguration, Transport as Network,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Delay between reconnect attempts of the event loop.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A message the broker publishes on our behalf when we vanish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectParams {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    pub tls: bool,
    pub last_will: Option<Will>,
}

/// Events delivered by the network side of a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    ConnAck(Result<(), RefusalReason>),
    Message {
        topic: String,
        payload: Bytes,
        retain: bool,
    },
    Disconnected,
}

/// A publish/subscribe client.
///
/// Inbound events are sent to the channel handed over in [`Transport::start`], which is the only
/// way the network side talks back to the application.
pub trait Transport: Send + Sync + 'static {
    /// Start the network loop, connecting in the background.
    fn start(
        &self,
        params: ConnectParams,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError>;

    /// Stop the network loop, without sending a disconnect to the broker.
    fn stop(&self);

    fn is_connected(&self) -> bool;

    fn publish(
        &self,
        topic: String,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn subscribe(
        &self,
        topic: String,
        qos: QoS,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn unsubscribe(&self, topic: String)
        -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A [`Transport`] backed by `rumqttc`.
pub struct RumqttcTransport {
    capacity: usize,
    client: Mutex<Option<AsyncClient>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
}

impl Default for RumqttcTransport {
    fn default() -> Self {
        Self::new(10)
    }
}

impl RumqttcTransport {
    /// Create a new transport, `capacity` being the size of the request queue.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            client: Default::default(),
            event_loop: Default::default(),
            connected: Default::default(),
        }
    }

    fn client(&self) -> Result<AsyncClient, TransportError> {
        lock(&self.client).clone().ok_or(TransportError::NotStarted)
    }
}

fn mqtt_options(params: &ConnectParams) -> MqttOptions {
    let mut options = MqttOptions::new(&params.client_id, &params.host, params.port);
    options.set_keep_alive(params.keep_alive);

    if params.tls {
        options.set_transport(Network::Tls(TlsConfiguration::Native));
    }

    if let Some(username) = &params.username {
        options.set_credentials(username, params.password.as_deref().unwrap_or_default());
    }

    if let Some(will) = &params.last_will {
        options.set_last_will(LastWill::new(
            &will.topic,
            will.payload.to_vec(),
            QoS::AtLeastOnce,
            will.retain,
        ));
    }

    options
}

fn refusal(code: ConnectReturnCode) -> Result<(), RefusalReason> {
    match code {
        ConnectReturnCode::Success => Ok(()),
        ConnectReturnCode::RefusedProtocolVersion => Err(RefusalReason::ProtocolVersion),
        ConnectReturnCode::BadClientId => Err(RefusalReason::ClientId),
        ConnectReturnCode::ServiceUnavailable => Err(RefusalReason::ServerUnavailable),
        ConnectReturnCode::BadUserNamePassword => Err(RefusalReason::BadCredentials),
        ConnectReturnCode::NotAuthorized => Err(RefusalReason::NotAuthorized),
    }
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    connected: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        let event = match event_loop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                let result = refusal(ack.code);
                connected.store(result.is_ok(), Ordering::SeqCst);
                TransportEvent::ConnAck(result)
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => TransportEvent::Message {
                topic: publish.topic,
                payload: publish.payload,
                retain: publish.retain,
            },
            Ok(Event::Incoming(Incoming::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                TransportEvent::Disconnected
            }
            Ok(_) => continue,
            Err(rumqttc::ConnectionError::ConnectionRefused(code)) => {
                connected.store(false, Ordering::SeqCst);
                let _ = events.send(TransportEvent::ConnAck(refusal(code)));
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
            Err(err) => {
                log::warn!("Connection failed: {err}");
                if connected.swap(false, Ordering::SeqCst) {
                    let _ = events.send(TransportEvent::Disconnected);
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        if events.send(event).is_err() {
            log::debug!("Event receiver is gone, stopping the event loop");
            break;
        }
    }
}

impl Transport for RumqttcTransport {
    fn start(
        &self,
        params: ConnectParams,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError> {
        self.stop();

        let (client, event_loop) = AsyncClient::new(mqtt_options(&params), self.capacity);
        let task = tokio::spawn(run_event_loop(event_loop, self.connected.clone(), events));

        *lock(&self.client) = Some(client);
        *lock(&self.event_loop) = Some(task);

        Ok(())
    }

    fn stop(&self) {
        // dropping the event loop closes the socket, without a DISCONNECT packet
        if let Some(task) = lock(&self.event_loop).take() {
            task.abort();
        }
        lock(&self.client).take();
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(
        &self,
        topic: String,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        let client = self.client()?;
        client.publish_bytes(topic, qos, retain, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: String, qos: QoS) -> Result<(), TransportError> {
        let client = self.client()?;
        client.subscribe(topic, qos).await?;
        Ok(())
    }

    async fn unsubscribe(&self, topic: String) -> Result<(), TransportError> {
        let client = self.client()?;
        client.unsubscribe(topic).await?;
        Ok(())
    }
}

impl Drop for RumqttcTransport {
    fn drop(&mut self) {
        self.stop();
    }
}
