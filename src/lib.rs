pub mod codes;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod forwarder;
pub mod pipeline;
pub mod runtime;
pub mod scheduler;
pub mod settings;
pub mod telegram;
pub mod web;
