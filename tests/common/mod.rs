#![allow(dead_code)]

pub mod fixtures;
pub mod memory_storage;
pub mod setup;
