//! # MediaLayer Core
//!
//! Interop primitives shared by the MediaLayer capture stack: the
//! shared-ownership callback shim handed to native engines, the counting
//! semaphore used to wait on worker-thread completion, and the native
//! status/error types.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod semaphore;
pub mod shim;

// Re-export main types
pub use error::{CoreError, CoreResult, NativeError};
pub use semaphore::FinalizeSemaphore;
pub use shim::CallbackShim;
