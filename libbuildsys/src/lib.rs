#![doc = include_str!("../README.md")]

pub mod application;
pub mod artifact;
pub mod bom;
pub mod execution;
pub mod layer;
pub mod log;
pub mod sbom;
pub mod zip;
