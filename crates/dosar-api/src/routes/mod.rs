//! Route handlers, one module per resource.

pub mod events;
pub mod evidence;
pub mod jobs;
pub mod reports;
pub mod search;
pub mod uploads;
