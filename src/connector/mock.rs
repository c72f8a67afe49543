//! An in-memory broker, standing in for a real transport in tests.

use crate::connector::{
    ClientConfig, ConnectParams, ConnectorOptions, RefusalReason, Transport, TransportError,
    TransportEvent,
};
use crate::model::Origin;
use crate::utils::{lock, topic_matches};
use bytes::Bytes;
use rumqttc::QoS;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A client configuration with short delays.
pub fn config() -> ClientConfig {
    ClientConfig {
        availability_topic: Some("test/available".into()),
        connect_poll_interval: Duration::from_millis(10),
        prune_settle: Duration::from_millis(100),
        ..ClientConfig::new(Origin::new("Test Origin"))
    }
}

pub fn options() -> ConnectorOptions {
    ConnectorOptions::new("broker").with_credentials("user", "secret")
}

/// How the simulated broker answers a connection attempt.
#[derive(Clone, Debug)]
pub enum Behavior {
    Accept,
    AcceptAfter(Duration),
    Never,
    Refuse(RefusalReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Default)]
struct State {
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    connected: bool,
    subscriptions: Vec<String>,
    retained: BTreeMap<String, Bytes>,

    starts: Vec<ConnectParams>,
    stops: usize,
    published: Vec<Published>,
    subscribed: Vec<String>,
    unsubscribed: Vec<String>,
}

impl State {
    fn send(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

pub struct MockTransport {
    behavior: Behavior,
    state: Arc<Mutex<State>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new(Behavior::Accept)
    }
}

impl MockTransport {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            state: Default::default(),
        }
    }

    /// Preload a retained message, as if published by an earlier run.
    pub fn retain(&self, topic: impl Into<String>, payload: impl Into<Bytes>) {
        lock(&self.state)
            .retained
            .insert(topic.into(), payload.into());
    }

    pub fn retained(&self) -> BTreeMap<String, Bytes> {
        lock(&self.state).retained.clone()
    }

    /// Deliver a message to the client, if it is subscribed to the topic.
    pub fn deliver(&self, topic: &str, payload: impl Into<Bytes>, retain: bool) {
        let state = lock(&self.state);
        if state
            .subscriptions
            .iter()
            .any(|filter| topic_matches(filter, topic))
        {
            state.send(TransportEvent::Message {
                topic: topic.to_string(),
                payload: payload.into(),
                retain,
            });
        }
    }

    /// Simulate a network failure. Subscriptions are lost, like with a clean session.
    pub fn drop_connection(&self) {
        let mut state = lock(&self.state);
        state.connected = false;
        state.subscriptions.clear();
        state.send(TransportEvent::Disconnected);
    }

    /// Simulate the network loop re-establishing a dropped connection.
    pub fn reconnect(&self) {
        let mut state = lock(&self.state);
        state.connected = true;
        state.send(TransportEvent::ConnAck(Ok(())));
    }

    pub fn starts(&self) -> Vec<ConnectParams> {
        lock(&self.state).starts.clone()
    }

    pub fn stops(&self) -> usize {
        lock(&self.state).stops
    }

    pub fn published(&self) -> Vec<Published> {
        lock(&self.state).published.clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<Published> {
        lock(&self.state)
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    pub fn clear_published(&self) {
        lock(&self.state).published.clear();
    }

    pub fn subscribed(&self) -> Vec<String> {
        lock(&self.state).subscribed.clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        lock(&self.state).unsubscribed.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.state).subscriptions.clone()
    }
}

impl Transport for MockTransport {
    fn start(
        &self,
        params: ConnectParams,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.starts.push(params);
        state.events = Some(events);
        state.connected = false;
        state.subscriptions.clear();

        match &self.behavior {
            Behavior::Accept => {
                state.connected = true;
                state.send(TransportEvent::ConnAck(Ok(())));
            }
            Behavior::AcceptAfter(delay) => {
                let delay = *delay;
                let shared = self.state.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let mut state = lock(&shared);
                    if state.events.is_some() {
                        state.connected = true;
                        state.send(TransportEvent::ConnAck(Ok(())));
                    }
                });
            }
            Behavior::Never => {}
            Behavior::Refuse(reason) => {
                state.send(TransportEvent::ConnAck(Err(*reason)));
            }
        }

        Ok(())
    }

    fn stop(&self) {
        let mut state = lock(&self.state);
        state.stops += 1;
        state.events = None;
        state.connected = false;
        state.subscriptions.clear();
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    async fn publish(
        &self,
        topic: String,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if state.events.is_none() {
            return Err(TransportError::NotStarted);
        }

        state.published.push(Published {
            topic: topic.clone(),
            payload: payload.clone(),
            qos,
            retain,
        });

        if retain {
            if payload.is_empty() {
                state.retained.remove(&topic);
            } else {
                state.retained.insert(topic.clone(), payload.clone());
            }
        }

        // live delivery to our own subscriptions never carries the retain flag
        if state
            .subscriptions
            .iter()
            .any(|filter| topic_matches(filter, &topic))
        {
            state.send(TransportEvent::Message {
                topic,
                payload,
                retain: false,
            });
        }

        Ok(())
    }

    async fn subscribe(&self, topic: String, _qos: QoS) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if state.events.is_none() {
            return Err(TransportError::NotStarted);
        }

        state.subscribed.push(topic.clone());
        if !state.subscriptions.contains(&topic) {
            state.subscriptions.push(topic.clone());
        }

        for (retained, payload) in &state.retained {
            if topic_matches(&topic, retained) {
                state.send(TransportEvent::Message {
                    topic: retained.clone(),
                    payload: payload.clone(),
                    retain: true,
                });
            }
        }

        Ok(())
    }

    async fn unsubscribe(&self, topic: String) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if state.events.is_none() {
            return Err(TransportError::NotStarted);
        }

        state.subscriptions.retain(|filter| *filter != topic);
        state.unsubscribed.push(topic);

        Ok(())
    }
}
