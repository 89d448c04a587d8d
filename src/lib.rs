pub mod cinema;
pub mod config;
pub mod error;
pub mod matching;
pub mod models;
pub mod providers;
pub mod resolver;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod utils;

pub use cinema::Cinema;
pub use config::AppConfig;
pub use error::{CinemaError, Result};
pub use models::{City, Film, Keyword, KeywordKind, Screening, Theatre};
pub use resolver::{KeywordQuery, Resolution};
pub use schedule::{ScheduleQuery, ScheduleTree, ShowTimes};
