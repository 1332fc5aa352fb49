// Artifact store, quota, fetching, reconciliation and the worker loop.

pub mod fetcher;
pub mod ledger;
pub mod quota;
pub mod reconcile;
pub mod stats;
pub mod store;
pub mod worker;
