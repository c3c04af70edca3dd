pub mod client;
pub mod models;
pub mod repo_url;
