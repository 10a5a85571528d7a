//! Test fixtures for interacting with the services of a test case.

pub mod idm_client;
pub mod mail_client;

pub use idm_client::{IdmClient, QueryResult};
pub use mail_client::{Inbox, MailClient};
