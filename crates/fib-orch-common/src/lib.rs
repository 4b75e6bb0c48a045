//! State-bus contracts and task machinery shared by the fib daemons.
//!
//! The bus itself (its transport and persistence) is an external
//! collaborator; this crate pins down the semantics the daemons rely on:
//! per-table FIFO with SET-merge and DEL-coalescing on the consumer side, a
//! producer-table contract on the publisher side, and the task status
//! vocabulary handlers use to consume, drop or re-queue entries.

pub mod consumer;
pub mod orch;
pub mod producer;
pub mod task;

pub use consumer::{fvs, Consumer, ConsumerConfig, FieldValue, KeyOpFieldsValues, Operation};
pub use orch::Orch;
pub use producer::{MemResponseChannel, MemTable, ProducerTable, ResponsePublisher};
pub use task::{TaskError, TaskResult, TaskResultExt, TaskStatus};
