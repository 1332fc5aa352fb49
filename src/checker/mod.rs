// Analysis engine abstraction: pluggable similarity checkers.

pub mod jplag;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::report::model::ReportItem;

#[async_trait]
pub trait Checker: Send + Sync {
    /// Compare `new_works` against each other and against `old_works`.
    async fn run(&self, new_works: &[PathBuf], old_works: &[PathBuf]) -> Result<Vec<ReportItem>>;
}
