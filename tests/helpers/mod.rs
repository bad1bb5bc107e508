//! Test helpers for on-disk configuration files
#![allow(dead_code)]

pub mod config_fixture;

pub use config_fixture::*;
