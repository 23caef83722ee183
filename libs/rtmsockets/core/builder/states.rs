/// Type-state markers for the builder pattern
///
/// These types track at compile time whether the handshake provider and
/// the connector have been set, so an incomplete client cannot be started.

use std::marker::PhantomData;

/// Marker trait for handshake state
pub trait HandshakeState {}

/// Handshake provider has not been set
pub struct NoHandshake;
impl HandshakeState for NoHandshake {}

/// Handshake provider has been set
pub struct HasHandshake;
impl HandshakeState for HasHandshake {}

/// Marker trait for connector state
pub trait ConnectorState {}

/// Connector has not been set
pub struct NoConnector;
impl ConnectorState for NoConnector {}

/// Connector has been set
pub struct HasConnector;
impl ConnectorState for HasConnector {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<H, C> {
    _handshake: PhantomData<H>,
    _connector: PhantomData<C>,
}

impl<H, C> TypeState<H, C> {
    pub(crate) fn new() -> Self {
        Self {
            _handshake: PhantomData,
            _connector: PhantomData,
        }
    }
}

impl<H, C> Default for TypeState<H, C> {
    fn default() -> Self {
        Self::new()
    }
}
