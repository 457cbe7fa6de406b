pub mod commands;
pub mod connection;
pub mod datapoints;
pub mod entity;
pub mod heatpump;
pub mod output;
pub mod profile;
