//! mailvault-core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core:
//! - **Domain entities** - `MailSource`, `SyncRun`, `Conversation`, `Label`,
//!   `Participant`, `MessageRecord`, `Attachment`, `DeletionManifest`,
//!   `AuditEntry`
//! - **Port definitions** - Traits adapter crates implement: [`ports::Clock`],
//!   [`ports::RemoteAdapter`], [`ports::Store`]
//! - **Configuration** - [`config::Config`], loaded from YAML with validation
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external
//! dependencies beyond `serde`/`chrono`/`uuid`. Ports define trait interfaces
//! that adapter crates (`mailvault-transport`, `mailvault-provider-json`,
//! `mailvault-provider-mailbox`, `mailvault-store`) implement; `mailvault-ingest`
//! and `mailvault-deletion` orchestrate domain entities through those ports.

pub mod config;
pub mod domain;
pub mod ports;
