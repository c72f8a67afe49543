use crate::connector::{router::Pruner, ClientError, DiscoveryMode, MqttClient, Transport};
use crate::model::device_config_filters;
use crate::utils::lock;
use bytes::Bytes;
use rumqttc::QoS;
use std::collections::HashSet;
use tokio::sync::mpsc;

impl<T: Transport> MqttClient<T> {
    /// Publish the discovery information of all current devices.
    ///
    /// Also registers the command handlers of all entities. With `remove_stale`, discovery
    /// information of those devices which is retained by the broker, but no longer published,
    /// gets removed.
    pub async fn publish_discovery_info(&self, remove_stale: bool) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let devices = self.devices();
        self.register_commands(&devices).await;

        let config = self.config();
        let prefix = config.discovery_prefix.as_str();
        let availability_topic = config.availability_topic.as_deref();

        if devices.is_empty() {
            log::info!("No devices");
        }

        let mut documents = Vec::new();
        let mut device_ids = HashSet::new();
        for device in devices.iter() {
            let infos = match config.discovery_mode {
                DiscoveryMode::Device => device
                    .discovery_info(prefix, &config.origin, availability_topic)
                    .into_iter()
                    .collect(),
                DiscoveryMode::Entity => {
                    device.entity_discovery_info(prefix, &config.origin, availability_topic)
                }
            };

            if infos.is_empty() {
                log::info!("Device '{}' has no components, skipping", device.id());
                continue;
            }

            device_ids.insert(device.id().to_string());
            for (topic, document) in infos {
                documents.push((topic, serde_json::to_vec(&document)?));
            }
        }

        let keep: HashSet<String> = documents.iter().map(|(topic, _)| topic.clone()).collect();

        let publish = async {
            for (topic, payload) in documents {
                log::debug!("Discovery information on {topic}");
                if let Err(err) = self.publish(topic, payload, QoS::AtLeastOnce, true).await {
                    log::warn!("{err}");
                }
            }
        };

        if remove_stale {
            tokio::join!(publish, self.remove_discovery_info(device_ids, keep));
        } else {
            publish.await;
        }

        Ok(())
    }

    /// Remove retained discovery information of the devices, which isn't in `keep`.
    ///
    /// The broker delivers all retained messages when subscribing, those are collected until
    /// the configured settle time passes.
    async fn remove_discovery_info(&self, device_ids: HashSet<String>, keep: HashSet<String>) {
        if device_ids.is_empty() {
            return;
        }

        let prefix = self.config().discovery_prefix.clone();
        let filters: Vec<String> = device_ids
            .iter()
            .flat_map(|device_id| device_config_filters(&prefix, device_id))
            .collect();

        let (tx, mut rx) = mpsc::unbounded_channel();
        lock(&self.inner.router).begin_prune(Pruner {
            prefix,
            filters: filters.clone(),
            device_ids,
            keep,
            stale: tx,
        });

        for filter in &filters {
            if let Err(err) = self.subscribe(filter).await {
                log::warn!("{err}");
            }
        }

        let mut removed = HashSet::new();
        let settle = tokio::time::sleep(self.config().prune_settle);
        tokio::pin!(settle);

        loop {
            tokio::select! {
                _ = &mut settle => break,
                Some(topic) = rx.recv() => self.remove_stale(&mut removed, topic).await,
            }
        }

        for filter in &filters {
            if let Err(err) = self.unsubscribe(filter).await {
                log::warn!("{err}");
            }
        }

        lock(&self.inner.router).end_prune();

        while let Ok(topic) = rx.try_recv() {
            self.remove_stale(&mut removed, topic).await;
        }
    }

    async fn remove_stale(&self, removed: &mut HashSet<String>, topic: String) {
        if !removed.insert(topic.clone()) {
            return;
        }

        log::info!("Removing stale discovery information on {topic}");
        if let Err(err) = self
            .publish(topic, Bytes::new(), QoS::AtLeastOnce, true)
            .await
        {
            log::warn!("{err}");
        }
    }
}
