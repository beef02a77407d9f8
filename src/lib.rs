//! Permit Desk assembles roofing permit applications for back-office staff.
//!
//! The core pipeline gathers a canonical snapshot of every record needed to
//! fill an application, evaluates the jurisdiction's template against it,
//! diagnoses what is missing, and tracks the permit case through its status
//! lifecycle. Everything outside that pipeline (storage, document rendering)
//! sits behind traits in [`store`] and [`workflows::permits::documents`].

pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod workflows;
