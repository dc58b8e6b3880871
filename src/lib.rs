//! prefab - download, verify and install prebuilt binary artifacts.
//!
//! Packages ship platform-tagged tarballs named
//! `<name>.v<version>.<triplet>.tar.gz` together with a SHA-256 sidecar.
//! This crate decides whether such an artifact fits the running host
//! ([`platform`]), supervises the external tools that fetch and unpack it
//! ([`collector`], [`engines`]), and drives the idempotent, reversible
//! install lifecycle around content hashing and file manifests
//! ([`install`]).

pub mod collector;
pub mod config;
pub mod engines;
pub mod install;
pub mod platform;
