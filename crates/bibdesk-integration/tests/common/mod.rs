//! Shared test utilities

#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;
