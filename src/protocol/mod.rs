//! Protocol types.
//!
//! - **Messages**: the closed set of tagged JSON records exchanged by client,
//!   KDC and service
//! - **Tickets**: the KDC credential with its sealed session key and expiry

mod message;
mod ticket;

pub use message::{
    decode_field, encode_field, Challenge, ChapResult, Claim, ClientHello, ClientResponse,
    Envelope, Failure, HandshakeResponse, Message, Response, SecurePayload, TicketRequest,
    TicketResponse,
};
pub use ticket::{now_millis, Ticket};
