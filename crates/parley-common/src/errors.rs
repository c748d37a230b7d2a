use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Errors returned synchronously to a caller acting on a room.
///
/// These are never retried: capacity and state errors are surfaced to the
/// client as `{ code, message }` and the room is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room is full")]
    RoomFull,

    #[error("room is closed")]
    RoomClosed,

    #[error("another participant is speaking")]
    PttBlocked { active_speaker_id: String },

    #[error("peer is not in this room")]
    NotInRoom,

    #[error("room is unavailable")]
    RoomUnavailable,
}

impl RoomError {
    /// Stable wire code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::RoomFull => "ROOM_FULL",
            RoomError::RoomClosed => "ROOM_CLOSED",
            RoomError::PttBlocked { .. } => "PTT_BLOCKED",
            RoomError::NotInRoom => "NOT_IN_ROOM",
            RoomError::RoomUnavailable => "ROOM_UNAVAILABLE",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("ai error: {0}")]
    Ai(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("context.chars_per_token = 0".into());
        assert_eq!(
            err.to_string(),
            "config validation error: context.chars_per_token = 0"
        );
    }

    #[test]
    fn room_error_codes() {
        assert_eq!(RoomError::RoomFull.code(), "ROOM_FULL");
        assert_eq!(RoomError::RoomClosed.code(), "ROOM_CLOSED");
        assert_eq!(
            RoomError::PttBlocked {
                active_speaker_id: "p1".into()
            }
            .code(),
            "PTT_BLOCKED"
        );
        assert_eq!(RoomError::NotInRoom.code(), "NOT_IN_ROOM");
        assert_eq!(RoomError::RoomUnavailable.code(), "ROOM_UNAVAILABLE");
    }

    #[test]
    fn room_error_display_is_actionable() {
        assert_eq!(RoomError::RoomFull.to_string(), "room is full");
        assert_eq!(
            RoomError::PttBlocked {
                active_speaker_id: "p1".into()
            }
            .to_string(),
            "another participant is speaking"
        );
    }

    #[test]
    fn parley_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: ParleyError = config_err.into();
        assert!(matches!(err, ParleyError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn parley_error_from_room() {
        let err: ParleyError = RoomError::RoomClosed.into();
        assert!(matches!(err, ParleyError::Room(RoomError::RoomClosed)));
        assert_eq!(err.to_string(), "room is closed");
    }

    #[test]
    fn parley_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: ParleyError = io_err.into();
        assert!(matches!(err, ParleyError::Io(_)));
        assert!(err.to_string().contains("port taken"));
    }

    #[test]
    fn parley_error_other_variants() {
        assert_eq!(
            ParleyError::Network("timeout".into()).to_string(),
            "network error: timeout"
        );
        assert_eq!(
            ParleyError::Ai("model unavailable".into()).to_string(),
            "ai error: model unavailable"
        );
        assert_eq!(ParleyError::Other("oops".into()).to_string(), "oops");
    }
}
