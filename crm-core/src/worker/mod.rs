pub mod reaper;

pub use reaper::TaskReaper;
