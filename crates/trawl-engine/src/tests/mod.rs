//! Engine integration tests over in-memory server pools.

mod basic;
mod helpers;
mod lifecycle;
