/// Errors that can occur in tunnel transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote endpoint has been torn down and accepts no more messages.
    #[error("port {0} is closed")]
    Closed(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
