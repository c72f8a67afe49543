use crate::connector::{MqttClient, Transport};
use crate::utils::lock;
use tokio::task::JoinHandle;

/// The last status the hub announced on its status topic.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum HubStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl HubStatus {
    pub fn from_payload(payload: &[u8]) -> Self {
        match payload {
            b"online" => Self::Online,
            b"offline" => Self::Offline,
            _ => Self::Unknown,
        }
    }
}

impl<T: Transport> MqttClient<T> {
    pub fn hub_status(&self) -> HubStatus {
        *self.inner.hub_status.borrow()
    }

    pub(crate) fn update_hub_status(&self, status: HubStatus) {
        let changed = self.inner.hub_status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });

        if changed {
            log::info!("Hub is {status}");
        }
    }

    /// Publish the discovery information every time the hub comes online.
    ///
    /// Waits for the connection, then subscribes to the hub's status topic. The subscription is
    /// restored on every reconnect. The hub announces itself with a retained message, so the
    /// first publish happens right after subscribing. If the hub is known to be online already,
    /// the first publish happens right away.
    ///
    /// Runs until the returned task is aborted.
    pub fn publish_discovery_info_when_online(&self) -> JoinHandle<()> {
        let client = self.clone();
        let topic = self.inner.config.hub_status_topic();
        let mut status = self.inner.hub_status.subscribe();

        lock(&self.inner.router).set_status_topic(Some(topic.clone()));

        tokio::spawn(async move {
            client.wait_connected().await;
            if let Err(err) = client.subscribe(&topic).await {
                log::warn!("{err}");
            }

            // the hub may already be online
            status.mark_changed();
            while status.changed().await.is_ok() {
                let current = *status.borrow_and_update();
                if current != HubStatus::Online {
                    continue;
                }

                log::info!("Publishing discovery information");
                if let Err(err) = client.publish_discovery_info(true).await {
                    log::warn!("Failed to publish discovery information: {err}");
                }
            }
        })
    }
}
