//! # sourceq mock responders
//!
//! Loopback stand-ins for the two kinds of servers `sourceq` talks to, used
//! by the integration tests and handy for trying the client without touching
//! the public master server.
//!
//! ## Game server (`network`)
//! Answers A2S_INFO, A2S_PLAYER and A2S_RULES for a [`game::GameState`].
//! Player and rules requests go through the usual challenge handshake; the
//! info request can be made to require one too. Replies can be delayed, or
//! suppressed entirely to simulate an unreachable host.
//!
//! ## Challenge bookkeeping (`client_manager`)
//! Per-address challenges with expiry and a cap on tracked addresses.
//!
//! ## Master server (`master`)
//! Pages a fixed address list the way the Steam master does: each reply
//! continues after the seed address the client sent, and the final page
//! ends with `0.0.0.0:0`.

pub mod client_manager;
pub mod game;
pub mod master;
pub mod network;
