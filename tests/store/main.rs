//! Store integration tests.
//!
//! Every test drives a `Store` through the scripted `MockTransport`:
//! - request caching and deduplication
//! - saving, removing and relationship updates
//! - error responses
//! - URL and header construction
//! - pagination and record links
//! - queued (202) creation
//! - `#[derive(Resource)]`

mod support;
mod caching;
mod derive;
mod links;
mod observe;
mod updates;
