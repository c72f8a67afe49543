/// A device or entity violates a construction invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("a device requires at least one identifier")]
    NoIdentifiers,
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("entity '{unique_id}' requires a command_topic of at least two characters")]
    MissingCommandTopic { unique_id: String },
    #[error("select entity '{unique_id}' requires at least one option")]
    MissingOptions { unique_id: String },
    #[error("duplicate component id '{0}'")]
    DuplicateComponent(String),
}
