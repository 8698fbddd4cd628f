pub mod build_info;
pub mod commands;
pub mod config;
pub mod error;
pub mod importer;
pub mod legacy;
pub mod logging;
pub mod model;
pub mod output;
pub mod reconcile;
pub mod report;
pub mod store;
