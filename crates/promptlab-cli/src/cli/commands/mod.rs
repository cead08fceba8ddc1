pub(crate) mod builder;
pub mod compare;
mod dispatch;
pub(crate) mod report;
pub(crate) mod run;
pub mod runs;
pub mod summary;
pub mod test_set;

pub use dispatch::dispatch;
