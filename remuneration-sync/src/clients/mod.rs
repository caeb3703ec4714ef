//! Concrete collaborator clients wired up by the CLI.
//!
//! Each client implements one contract from
//! [`remuneration_sync_core::contract`]. They are thin: one HTTP request per
//! operation, no retries.

pub mod database;
pub mod notify;
pub mod parser;
pub mod storage;

use remuneration_sync_core::config::PublishConfig;
use remuneration_sync_core::contract::{Clients, CollaboratorInitError};
use std::sync::Arc;

pub use database::DataApiDatabase;
pub use notify::SendgridClient;
pub use parser::ParserServiceClient;
pub use storage::HttpStorage;

/// Every client a publication run needs.
pub struct Collaborators {
    pub clients: Clients,
    pub notifier: SendgridClient,
}

/// Constructs the clients in start-up order: storage, notifier, parser, database.
pub fn build_collaborators(config: &PublishConfig) -> Result<Collaborators, CollaboratorInitError> {
    let storage = HttpStorage::new(&config.storage)?;
    let notifier = SendgridClient::new(&config.notification)?;
    let parser = ParserServiceClient::new(&config.parser_url)?;
    let database = DataApiDatabase::new(&config.database)?;

    Ok(Collaborators {
        clients: Clients {
            storage: Arc::new(storage),
            parser: Arc::new(parser),
            database: Arc::new(database),
        },
        notifier,
    })
}
