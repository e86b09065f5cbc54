//! # sourceq
//!
//! Query tool for Source engine game servers. It asks a master server for
//! the servers in a region (or takes addresses from the command line),
//! fetches each server's attributes concurrently over UDP and prints one
//! line per server with the columns the user picked.
//!
//! ## Pipeline
//!
//! 1. **Field spec** (`fieldspec`): the `--fields` expression is resolved
//!    against the field registry (`fields`) before any network activity.
//! 2. **Orchestration** (`query`): targets are dispatched serially or as
//!    one task per server and per attribute. Every fetch runs under the
//!    configured timeout and failures stay attached to the attribute they
//!    belong to.
//! 3. **Collation** (`collate`): completions arrive in any order and are
//!    released in dispatch order. Unreachable servers are counted and
//!    withheld unless asked for; `--limit` caps what is rendered.
//! 4. **Rendering** (`render`): aligned text, a JSON array, or the
//!    per-server detail report.
//!
//! The wire protocol lives behind the [`query::QueryBackend`] trait;
//! [`network::UdpBackend`] is the real implementation and tests substitute
//! their own.
//!
//! ## Example
//!
//! ```no_run
//! use sourceq::fields::Registry;
//! use sourceq::fieldspec::parse_fields;
//!
//! let registry = Registry::standard();
//! let fields = parse_fields("ip=21,name,players", &registry)?;
//! assert_eq!(fields.len(), 3);
//! # Ok::<(), sourceq::error::SpecError>(())
//! ```

pub mod catalog;
pub mod cli;
pub mod collate;
pub mod error;
pub mod fields;
pub mod fieldspec;
pub mod network;
pub mod query;
pub mod record;
pub mod render;

pub use error::{Error, Result};
