use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Room {0} does not exist")]
    RoomNotFound(String),
    #[error("Malformed request: {0}")]
    Malformed(String),
}

impl SessionError {
    /// Text surfaced to the client in a failure acknowledgement.
    pub fn client_message(&self) -> &'static str {
        match self {
            SessionError::RoomNotFound(_) => "Room does not exist",
            SessionError::Malformed(_) => "Malformed request",
        }
    }
}
