pub mod actions;
pub mod archive;
pub mod cleanup;
pub mod commands;
pub mod conflicts;
pub mod download;
pub mod http;
pub mod install;
pub mod ledger;
pub mod manifest;
pub mod runtime;
pub mod services;
pub mod store;
