pub mod cli;
pub mod config;
pub mod discover;
pub mod executor;
pub mod factory;
pub mod gitlab;
pub mod ledger;
pub mod runner;
pub mod service;
pub mod task;
pub mod util;
