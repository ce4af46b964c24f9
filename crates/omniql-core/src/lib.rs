//! omniql core - the engine-independent contract
//!
//! This crate defines what every engine driver must provide and the data
//! that flows across that boundary:
//!
//! - `DatabaseClient` - the capability contract of a live engine connection
//! - `DatabaseDriver` - constructs clients for one engine
//! - `ServerConfig` - the configuration surface of one physical target
//! - Metadata, query, change and alteration types shared by all engines

mod alter;
mod changes;
mod client;
pub mod dialect;
mod driver;
mod error;
mod schema;
mod select;
pub mod security;
mod server;
mod stream;
mod types;

pub use alter::*;
pub use changes::*;
pub use client::*;
pub use driver::*;
pub use error::*;
pub use schema::*;
pub use select::*;
pub use server::*;
pub use stream::*;
pub use types::*;
