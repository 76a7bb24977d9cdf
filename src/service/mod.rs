//! Service layer
//!
//! - `dashboard`: external dashboard API client
//! - `poller`: per-connection polling loop

pub mod dashboard;
pub mod poller;

pub use dashboard::{DashboardApi, DashboardPage, DashboardQuery, Post, PostId, TumblrDashboard};
pub use poller::{PollTask, advance};
