#![doc = "remuneration-sync-core: core logic library for remuneration-sync."]

//! This crate holds the domain logic of a publication run: index generation
//! for local spreadsheet directories, the collaborator contracts, the default
//! crawl processor and the orchestration of a run.
//! Concrete service clients and CLI glue live in the `remuneration-sync` crate.
//!
//! # Usage
//! Build a [`config::PublishConfig`], construct the collaborators and call
//! [`publish::publish_month`].

pub mod config;
pub mod contract;
pub mod crawl;
pub mod index;
pub mod publish;
