//! # Platform Providers
//!
//! One provider per supported issue tracker. Each knows its platform's URL
//! and id forms, its raw JSON dialect, and how platform-native states map
//! into the normalized enums.
//!
//! Status/type mapping tables are provider-local, case-insensitive, and
//! total: anything unmapped becomes `Unknown`.

mod azure_devops;
mod github;
mod jira;
mod linear;
mod monday;
mod trello;

pub use azure_devops::AzureDevOpsProvider;
pub use github::GitHubProvider;
pub use jira::JiraProvider;
pub use linear::LinearProvider;
pub use monday::MondayProvider;
pub use trello::TrelloProvider;
