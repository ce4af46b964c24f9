//! Transport security settings of a server: SSH tunnels and TLS material

mod ssh_config;
mod tls_config;

pub use ssh_config::*;
pub use tls_config::*;
