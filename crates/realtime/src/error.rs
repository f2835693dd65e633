use thiserror::Error;

/// Realtime transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
	/// The subscription handshake was refused or timed out.
	#[error("handshake failed: {0}")]
	Handshake(String),
	/// An open subscription broke and cannot be resumed.
	#[error("connection lost: {0}")]
	ConnectionLost(String),
	/// The push-event stream was already taken by another consumer.
	#[error("transport event stream already taken")]
	EventsTaken,
}

/// Raw change event that could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
	#[error("unknown operation {0:?}")]
	UnknownOperation(String),
	#[error("event carries no entity id")]
	MissingEntityId,
	#[error("invalid timestamp {value:?}: {reason}")]
	InvalidTimestamp { value: String, reason: String },
}
