pub mod handshake;
pub mod rest;

pub use handshake::RtmStartHandshake;
pub use rest::{PostedMessage, RestClient, RestError};
