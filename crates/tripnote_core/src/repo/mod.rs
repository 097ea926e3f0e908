//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the persistent-store contract used by the trip store.
//! - Isolate SQLite and record encoding details from service orchestration.
//!
//! # Invariants
//! - Repository writes must enforce `Trip::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.

pub mod trip_repo;
