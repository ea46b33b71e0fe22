// ABOUTME: Library crate for wsfleet exposing the fleet, config and CLI for testing and embedding

#![allow(missing_docs)]

pub mod cli;
pub mod config;
pub mod fleet;
