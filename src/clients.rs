//! Clients for the external systems a migration touches.
//!
//! - [`process`]: spawning `git` and `gh`, the only place processes start
//! - [`git`]: branch, patch and push operations on the consumer repository
//! - [`gh`]: secrets, workflow dispatch and pull requests via the GitHub CLI
//! - [`http`]: HTTPS transport with a per-request timeout
//! - [`github`]: typed GitHub REST reads built on [`http`]

pub mod gh;
pub mod git;
pub mod github;
pub mod http;
pub mod process;
