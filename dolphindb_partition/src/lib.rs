//! Partition schemes of DolphinDB tables, and the router that keeps every server partition on a
//! single writer worker.

mod router;
mod scheme;

pub use router::{PartitionRouter, Partitioning, RouterError, TableKind};
pub use scheme::{
    HashScheme, ListScheme, PartitionScheme, RangeScheme, RoutingError, SchemeError, ValueScheme,
};
