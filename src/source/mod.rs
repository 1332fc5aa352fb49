// Remote collaborators: the task orchestrator and the submission download source.

pub mod http_source;
pub mod rpc_client;
pub mod traits;
