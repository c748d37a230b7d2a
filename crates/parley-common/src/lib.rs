pub mod errors;
pub mod id;
pub mod time;

pub use errors::{ConfigError, ParleyError, RoomError};
pub use id::{new_correlation_id, new_id, PeerId};
pub use time::{now_ms, now_rfc3339};

pub type Result<T> = std::result::Result<T, ParleyError>;
