//! omniql connection layer
//!
//! Ties engine clients to configured servers: one shared SSH tunnel per server,
//! the connect/disconnect state machine, per-database sessions and SQL templates.

pub mod logging;
mod orchestrator;
mod scripts;
mod server;
mod session;
mod settings;
pub mod ssh;
mod tunnel;

pub use orchestrator::ConnectionOrchestrator;
pub use scripts::{
    render_delete, render_insert, render_select, render_update, table_delete_script,
    table_insert_script, table_select_script, table_update_script,
};
pub use server::Server;
pub use session::DatabaseSession;
pub use settings::{ConnectionSettings, TunnelShutdownPolicy};
pub use ssh::SshTunnelConnector;
pub use tunnel::{Tunnel, TunnelConnector, TunnelHandle};
