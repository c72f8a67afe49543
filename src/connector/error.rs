/// The reason a broker gave for refusing a connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RefusalReason {
    #[error("incorrect protocol version")]
    ProtocolVersion,
    #[error("invalid client identifier")]
    ClientId,
    #[error("server unavailable")]
    ServerUnavailable,
    #[error("bad username or password")]
    BadCredentials,
    #[error("not authorised")]
    NotAuthorized,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport not started")]
    NotStarted,
    #[error("client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("could not connect to {username}@{host}:{port}")]
    Timeout {
        username: String,
        host: String,
        port: u16,
    },
    #[error("connection to {host}:{port} refused: {reason}")]
    Refused {
        host: String,
        port: u16,
        reason: RefusalReason,
    },
    #[error("failed to start transport")]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,
    #[error("serialization failure")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to publish to {topic}")]
    Publish {
        topic: String,
        #[source]
        source: TransportError,
    },
    #[error("failed to subscribe to {topic}")]
    Subscribe {
        topic: String,
        #[source]
        source: TransportError,
    },
    #[error("failed to unsubscribe from {topic}")]
    Unsubscribe {
        topic: String,
        #[source]
        source: TransportError,
    },
    #[error("entity '{0}' has no state topic")]
    MissingStateTopic(String),
    #[error("entity '{0}' needs a json_attributes_topic")]
    MissingAttributesTopic(String),
}
