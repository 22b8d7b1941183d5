pub mod client;
pub mod commit;
pub mod content;

pub use client::{GitHubClient, GitHubConfig};
