//! Error taxonomy shared by the pipeline session, presentation loop and host.

/// Errors surfaced by player operations.
///
/// Background engine failures are never returned through this type from the
/// command that triggered them; they land in the session's state machine and
/// show up through later state queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// The decode engine could not be created, initialized or transitioned.
    /// Recoverable by releasing and recreating the session.
    Engine(String),
    /// GPU surface creation, upload or validation failed.
    /// Recoverable by recreating the surface on the next resize or restore.
    Surface(String),
    /// A command arrived in a state that does not permit it.
    /// The session state is left unchanged.
    Protocol(String),
    /// A required engine capability or GPU feature is missing at startup.
    Fatal(String),
}

impl PlayerError {
    /// Returns true unless the error aborts the whole plugin instance.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PlayerError::Fatal(_))
    }

    /// Short machine-friendly kind name, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PlayerError::Engine(_) => "engine",
            PlayerError::Surface(_) => "surface",
            PlayerError::Protocol(_) => "protocol",
            PlayerError::Fatal(_) => "fatal",
        }
    }
}

impl std::fmt::Display for PlayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerError::Engine(msg) => write!(f, "Engine error: {msg}"),
            PlayerError::Surface(msg) => write!(f, "Surface error: {msg}"),
            PlayerError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            PlayerError::Fatal(msg) => write!(f, "Fatal error: {msg}"),
        }
    }
}

impl std::error::Error for PlayerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = PlayerError::Engine("no kmssink".to_string());
        assert_eq!(err.to_string(), "Engine error: no kmssink");

        let err = PlayerError::Protocol("pause before initialize".to_string());
        assert!(err.to_string().contains("pause before initialize"));
    }

    #[test]
    fn test_only_fatal_is_unrecoverable() {
        assert!(PlayerError::Engine(String::new()).is_recoverable());
        assert!(PlayerError::Surface(String::new()).is_recoverable());
        assert!(PlayerError::Protocol(String::new()).is_recoverable());
        assert!(!PlayerError::Fatal(String::new()).is_recoverable());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(PlayerError::Surface("x".into()).kind(), "surface");
        assert_eq!(PlayerError::Fatal("x".into()).kind(), "fatal");
    }
}
