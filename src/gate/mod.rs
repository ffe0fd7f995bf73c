//! Admission control.
//!
//! - [`AdmissionGate`] caps how many units of work are admitted at once;
//! - [`Ticket`] is the RAII proof of admission, released exactly once.
//!
//! ## Quick wiring
//! ```text
//! acquire(signal, timeout) ──► Ticket ──► [protected work] ──► drop / release()
//!          │
//!          ├─ cancelled  ──► GateError::Cancelled
//!          ├─ timed out  ──► GateError::Busy { waited }
//!          └─ closed     ──► GateError::Closed
//! ```

mod admission;
mod ticket;

pub use admission::AdmissionGate;
pub use ticket::Ticket;
