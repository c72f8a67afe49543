use crate::connector::{
    client::Inner, ConnectionState, HubStatus, MqttClient, Transport, TransportEvent,
};
use crate::model::{device_id_from_topic, CommandHandler, Device};
use crate::utils::{lock, topic_matches};
use futures_util::FutureExt;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Weak;
use tokio::sync::mpsc;

struct Registration {
    unique_id: String,
    handler: CommandHandler,
}

/// Collects retained discovery topics which are no longer in use.
pub(crate) struct Pruner {
    pub prefix: String,
    pub filters: Vec<String>,
    pub device_ids: HashSet<String>,
    pub keep: HashSet<String>,
    pub stale: mpsc::UnboundedSender<String>,
}

impl Pruner {
    /// Returns `true` if the topic is covered by the pruning subscriptions.
    fn offer(&self, topic: &str, retain: bool) -> bool {
        if !self.filters.iter().any(|filter| topic_matches(filter, topic)) {
            return false;
        }

        // only retained messages are previously published documents
        if !retain || self.keep.contains(topic) {
            return true;
        }

        if let Some(device_id) = device_id_from_topic(&self.prefix, topic) {
            if self.device_ids.contains(device_id) {
                let _ = self.stale.send(topic.to_string());
            }
        }

        true
    }
}

pub(crate) enum Route {
    Command {
        unique_id: String,
        handler: CommandHandler,
        payload: String,
    },
    HubStatus(HubStatus),
    Ignored,
}

/// Maps inbound topics to their receivers.
#[derive(Default)]
pub(crate) struct Router {
    handlers: HashMap<String, Registration>,
    status_topic: Option<String>,
    pruner: Option<Pruner>,
}

impl Router {
    /// Register a command handler, replacing an existing one for the same topic.
    pub fn register(&mut self, topic: String, unique_id: &str, handler: CommandHandler) {
        let registration = Registration {
            unique_id: unique_id.to_string(),
            handler,
        };

        if let Some(previous) = self.handlers.insert(topic.clone(), registration) {
            if previous.unique_id != unique_id {
                log::warn!(
                    "Command handler of '{}' on {topic} replaced by '{unique_id}'",
                    previous.unique_id
                );
            }
        }
    }

    /// All topics which need a subscription for normal operation.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.handlers.keys().cloned().collect();
        topics.sort_unstable();
        topics.extend(self.status_topic.iter().cloned());
        topics
    }

    pub fn set_status_topic(&mut self, topic: Option<String>) {
        self.status_topic = topic;
    }

    pub fn begin_prune(&mut self, pruner: Pruner) {
        self.pruner = Some(pruner);
    }

    pub fn end_prune(&mut self) {
        self.pruner = None;
    }

    pub fn route(&self, topic: &str, payload: &[u8], retain: bool) -> Route {
        if self.status_topic.as_deref() == Some(topic) {
            return Route::HubStatus(HubStatus::from_payload(payload));
        }

        if let Some(pruner) = &self.pruner {
            if pruner.offer(topic, retain) {
                return Route::Ignored;
            }
        }

        let Some(registration) = self.handlers.get(topic) else {
            log::debug!("No handler for {topic}");
            return Route::Ignored;
        };

        match std::str::from_utf8(payload) {
            Ok(payload) => Route::Command {
                unique_id: registration.unique_id.clone(),
                handler: registration.handler.clone(),
                payload: payload.to_string(),
            },
            Err(err) => {
                log::warn!("Dropping command on {topic}, payload is not UTF-8: {err}");
                Route::Ignored
            }
        }
    }
}

fn invoke(unique_id: String, topic: String, handler: CommandHandler, payload: String) {
    match handler {
        CommandHandler::Sync(handler) => {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(payload.clone())));
            report(&unique_id, &topic, &payload, result);
        }
        CommandHandler::Async(handler) => {
            tokio::spawn(async move {
                let result = AssertUnwindSafe(async { handler(payload.clone()).await })
                    .catch_unwind()
                    .await;
                report(&unique_id, &topic, &payload, result);
            });
        }
    }
}

fn report(
    unique_id: &str,
    topic: &str,
    payload: &str,
    result: std::thread::Result<Result<(), crate::model::HandlerError>>,
) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            log::error!(
                "Handler of '{unique_id}' failed on {topic} with payload '{payload}': {err}"
            );
        }
        Err(_) => {
            log::error!("Handler of '{unique_id}' panicked on {topic} with payload '{payload}'");
        }
    }
}

/// Process transport events, until the transport or the client goes away.
pub(crate) async fn dispatch<T: Transport>(
    inner: Weak<Inner<T>>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };

        match event {
            TransportEvent::ConnAck(Ok(())) => {
                // reconnected by the network loop, outside of `connect`
                let reconnected = inner.state.send_if_modified(|state| {
                    if *state == ConnectionState::Disconnected {
                        *state = ConnectionState::Connected;
                        true
                    } else {
                        false
                    }
                });
                if reconnected {
                    log::info!("Reconnected");
                    let client = MqttClient { inner };
                    tokio::spawn(async move { client.restore_session().await });
                }
            }
            TransportEvent::ConnAck(Err(reason)) => {
                *lock(&inner.refusal) = Some(reason);
            }
            TransportEvent::Disconnected => {
                let dropped = inner.state.send_if_modified(|state| {
                    if *state == ConnectionState::Connected {
                        *state = ConnectionState::Disconnected;
                        true
                    } else {
                        false
                    }
                });
                if dropped {
                    log::info!("Connection lost");
                }
            }
            TransportEvent::Message {
                topic,
                payload,
                retain,
            } => {
                let route = lock(&inner.router).route(&topic, &payload, retain);
                match route {
                    Route::Command {
                        unique_id,
                        handler,
                        payload,
                    } => invoke(unique_id, topic, handler, payload),
                    Route::HubStatus(status) => {
                        MqttClient { inner }.update_hub_status(status);
                    }
                    Route::Ignored => {}
                }
            }
        }
    }

    log::debug!("Dispatcher exited");
}

impl<T: Transport> MqttClient<T> {
    /// Register the command handlers of all entities, and subscribe to their topics.
    pub(crate) async fn register_commands(&self, devices: &[Device]) {
        let topics: Vec<String> = {
            let mut router = lock(&self.inner.router);
            devices
                .iter()
                .flat_map(Device::entities)
                .filter_map(|entity| {
                    let command = entity.command()?;
                    let handler = command.handler.clone()?;
                    router.register(command.topic.clone(), entity.unique_id(), handler);
                    Some(command.topic.clone())
                })
                .collect::<HashSet<_>>()
                .into_iter()
                .collect()
        };

        for topic in topics {
            if let Err(err) = self.subscribe(&topic).await {
                log::warn!("{err}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::connector::mock::{config, options, MockTransport};
    use crate::model::{
        Command, DeviceInfo, Entity, EntityBase, HandlerError, Select, Sensor, Switch,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn recorder() -> (CommandHandler, Arc<Mutex<Vec<String>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let handler = CommandHandler::from_fn({
            let received = received.clone();
            move |payload| {
                received.lock().unwrap().push(payload);
                Ok(())
            }
        });
        (handler, received)
    }

    fn select(unique_id: &str, topic: &str, handler: CommandHandler) -> Entity {
        Entity::try_from(Select {
            base: EntityBase {
                unique_id: unique_id.into(),
                state_topic: format!("t/{unique_id}"),
                ..Default::default()
            },
            command: Command::new(topic).with_handler(handler),
            options: vec!["a".into(), "b".into()],
        })
        .unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[test]
    fn test_route() {
        let (handler, _) = recorder();
        let mut router = Router::default();
        router.register("t/cmd".into(), "e1", handler);
        router.set_status_topic(Some("homeassistant/status".into()));

        assert!(matches!(
            router.route("t/cmd", b"on", false),
            Route::Command { unique_id, payload, .. } if unique_id == "e1" && payload == "on"
        ));
        assert!(matches!(router.route("t/other", b"on", false), Route::Ignored));
        assert!(matches!(router.route("t/cmd", &[0xff, 0xfe], false), Route::Ignored));
        assert!(matches!(
            router.route("homeassistant/status", b"online", true),
            Route::HubStatus(HubStatus::Online)
        ));

        assert_eq!(router.topics(), vec!["t/cmd", "homeassistant/status"]);
    }

    #[test]
    fn test_register_replaces() {
        let (first, _) = recorder();
        let (second, _) = recorder();
        let mut router = Router::default();
        router.register("t/cmd".into(), "e1", first);
        router.register("t/cmd".into(), "e2", second);

        assert_eq!(router.topics(), vec!["t/cmd"]);
        assert!(matches!(
            router.route("t/cmd", b"x", false),
            Route::Command { unique_id, .. } if unique_id == "e2"
        ));
    }

    #[test]
    fn test_prune_route() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handler, _) = recorder();
        let mut router = Router::default();
        router.register("t/cmd".into(), "e1", handler);
        router.begin_prune(Pruner {
            prefix: "homeassistant".into(),
            filters: crate::model::device_config_filters("homeassistant", "d1").to_vec(),
            device_ids: HashSet::from(["d1".to_string()]),
            keep: HashSet::from(["homeassistant/device/d1/config".to_string()]),
            stale: tx,
        });

        for (topic, retain) in [
            ("homeassistant/device/d1/config", true),
            ("homeassistant/sensor/d1/old_x/config", true),
            ("homeassistant/sensor/d1/live/config", false),
            ("homeassistant/sensor/d2/other/config", true),
        ] {
            router.route(topic, b"{}", retain);
        }

        // commands still work while pruning
        assert!(matches!(
            router.route("t/cmd", b"x", false),
            Route::Command { .. }
        ));

        router.end_prune();
        assert_eq!(
            rx.try_recv().unwrap(),
            "homeassistant/sensor/d1/old_x/config"
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_command_dispatch() {
        let client = MqttClient::with_transport(config(), MockTransport::default());
        client.connect(&options()).await.unwrap();

        let (handler, received) = recorder();
        let device = Device::with_entities(
            DeviceInfo::new(["d1"]),
            [select("select_1", "t/select_1_set", handler)],
        )
        .unwrap();
        client.register_commands(&[device]).await;

        assert_eq!(client.transport().subscriptions(), vec!["t/select_1_set"]);

        client.transport().deliver("t/select_1_set", "b", false);
        client.transport().deliver("t/unknown", "b", false);
        settle().await;

        assert_eq!(*received.lock().unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_async_handler() {
        let client = MqttClient::with_transport(config(), MockTransport::default());
        client.connect(&options()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = CommandHandler::from_async_fn(move |payload| {
            let tx = tx.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.send(payload)?;
                Ok::<_, HandlerError>(())
            }
        });

        let switch = Entity::try_from(Switch {
            base: EntityBase {
                unique_id: "switch_1".into(),
                state_topic: "t/switch_1".into(),
                ..Default::default()
            },
            command: Command::new("t/switch_1_set").with_handler(handler),
            ..Default::default()
        })
        .unwrap();

        let device = Device::with_entities(DeviceInfo::new(["d1"]), [switch]).unwrap();
        client.register_commands(&[device]).await;
        client.transport().deliver("t/switch_1_set", "ON", false);

        let payload = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(payload.as_deref(), Some("ON"));
    }

    #[tokio::test]
    async fn test_failing_handlers() {
        let client = MqttClient::with_transport(config(), MockTransport::default());
        client.connect(&options()).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let failing = CommandHandler::from_fn(|_| Err(HandlerError::from("nope")));
        let panicking = CommandHandler::from_fn(|_| panic!("boom"));
        let panicking_async = CommandHandler::from_async_fn(|payload: String| async move {
            if !payload.is_empty() {
                panic!("async boom");
            }
            Ok::<_, HandlerError>(())
        });
        let counting = CommandHandler::from_fn({
            let calls = calls.clone();
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let device = Device::with_entities(
            DeviceInfo::new(["d1"]),
            [
                select("s1", "t/s1", failing),
                select("s2", "t/s2", panicking),
                select("s3", "t/s3", panicking_async),
                select("s4", "t/s4", counting),
            ],
        )
        .unwrap();
        client.register_commands(&[device]).await;

        for topic in ["t/s1", "t/s2", "t/s3", "t/s4", "t/s4"] {
            client.transport().deliver(topic, "a", false);
        }
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_resubscribe_on_reconnect() {
        let client = MqttClient::with_transport(config(), MockTransport::default());
        client.connect(&options()).await.unwrap();

        let (handler, received) = recorder();
        let sensor = Entity::try_from(Sensor {
            base: EntityBase {
                unique_id: "sensor_1".into(),
                state_topic: "t/sensor_1".into(),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        let device = Device::with_entities(
            DeviceInfo::new(["d1"]),
            [select("select_1", "t/select_1_set", handler), sensor],
        )
        .unwrap();
        client.register_commands(&[device]).await;

        client.transport().drop_connection();
        settle().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.transport().subscriptions().is_empty());

        client.transport().reconnect();
        settle().await;
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(client.transport().subscriptions(), vec!["t/select_1_set"]);
        assert_eq!(client.transport().published_to("test/available").len(), 2);

        client.transport().deliver("t/select_1_set", "a", false);
        settle().await;
        assert_eq!(*received.lock().unwrap(), vec!["a"]);

        // an explicit connect also restores the subscriptions
        client.disconnect();
        client.connect(&options()).await.unwrap();
        assert_eq!(client.transport().subscriptions(), vec!["t/select_1_set"]);
    }
}
