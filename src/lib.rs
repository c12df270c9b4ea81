//! # Ticketgate - ticket-based authentication for TCP services
//!
//! A small Kerberos-style system: a key distribution center (KDC) that
//! authenticates users with CHAP and issues tickets, services that accept
//! those tickets through a mutual authentication handshake, and an encrypted
//! session for the traffic that follows.
//!
//! ## Overview
//!
//! Every principal (user or service) shares one secret with the KDC. Nothing
//! secret ever crosses the wire in the clear:
//! - The user proves its secret to the KDC with a SHA-256 **challenge/response**
//! - The KDC mints a fresh **session key** and seals it twice: under the
//!   service's derived key (inside the **ticket**) and under the user's
//! - The client presents the ticket; service and client each prove they can
//!   open the session key by encrypting the other side's **nonce**
//! - Application messages are sealed with **AES-256-GCM** and carry a nonce
//!   that is checked against a **replay cache**
//!
//! Keys are derived from secrets with scrypt and a salt shared by all parties.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ticketgate::client::{ClientAgent, ServiceHandshake};
//! use ticketgate::crypto::Kdf;
//! use ticketgate::transport::TcpConnection;
//!
//! # async fn run() -> Result<(), ticketgate::AuthError> {
//! let kdf = Kdf::default();
//!
//! // CHAP and ticket request against the KDC
//! let mut kdc = TcpConnection::connect("127.0.0.1:5000").await?;
//! let grant = ClientAgent::new("alice", kdf)
//!     .obtain_ticket(&mut kdc, "pw1", "echo")
//!     .await?;
//!
//! // Handshake with the service, then talk
//! let mut echo = TcpConnection::connect("127.0.0.1:5001").await?;
//! let session = ServiceHandshake::new(&grant).connect(&mut echo).await?;
//! session.send(&mut echo, "hi").await?;
//! assert_eq!(session.receive(&mut echo).await?, "HI");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`crypto`]: Key derivation, AES-GCM, CHAP hashing, nonce cache
//! - [`protocol`]: Wire messages and tickets
//! - [`transport`]: Line-delimited JSON over TCP
//! - [`kdc`]: CHAP authenticator and ticket issuer
//! - [`service`]: Handshake responder and service loop
//! - [`client`]: Client-side counterparts
//! - [`session`]: Encrypted post-handshake channel
//! - [`server`]: Per-connection task dispatcher

pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod kdc;
pub mod protocol;
pub mod secrets;
pub mod server;
pub mod service;
pub mod session;
pub mod transport;

// Re-export commonly used types at the crate root
pub use client::{ClientAgent, ServiceHandshake, TicketGrant};
pub use config::{HostsConfig, KdcConfig, ServiceConfig};
pub use error::AuthError;
pub use kdc::Kdc;
pub use secrets::SecretStore;
pub use server::{ConnectionHandler, Dispatcher};
pub use service::{Echo, PayloadHandler, Service};
pub use session::SecureSession;
