//! Command-line front end for the gate

pub mod commands;
