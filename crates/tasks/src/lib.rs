// Taskwire tasks service
//
// Task, comment and audit handling on top of the contract fabric. The store
// is in-memory; the service and resolver only depend on its async API.

pub mod audience;
pub mod service;
pub mod store;

pub use audience::{TaskAudienceResolver, TaskLookup};
pub use service::TasksService;
pub use store::{InMemoryTaskStore, StoreResult, TaskStoreError};
