//! Port traits for the collaborators the domain talks to.

pub mod config_port;
pub mod execution_port;
pub mod market_data_port;
pub mod profile_store_port;
pub mod report_port;
