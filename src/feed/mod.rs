pub mod controller;
pub mod domain;
pub mod planner;
pub mod session;

pub use controller::FeedController;
pub use domain::{FeedPage, FeedPost, FilterSpec, SortMode};
pub use planner::FeedPlanner;
pub use session::{FeedSession, FetchTicket, PageApplied};
