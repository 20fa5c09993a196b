//! Broker Errors

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Broker unreachable or refusing writes
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Exchange has no bound queue; the message would be dropped
    #[error("No queue bound to exchange {exchange}")]
    Unroutable { exchange: String },

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    /// Topology definition rejected before declaration
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BrokerError {
    /// Check if a later attempt may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_) | BrokerError::Database(_))
    }
}
