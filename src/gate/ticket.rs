//! # Admission ticket.
//!
//! A [`Ticket`] owns one unit of gate capacity. Capacity goes back to the gate
//! exactly once: on the first [`Ticket::release`] call or on drop, whichever
//! comes first. Drop also runs while unwinding, so a panic inside the protected
//! region cannot leak capacity.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::OwnedSemaphorePermit;

use super::admission::GateState;

/// Permission to proceed past an [`AdmissionGate`](crate::AdmissionGate).
#[must_use = "dropping a ticket releases the admission immediately"]
pub struct Ticket {
    permit: Option<OwnedSemaphorePermit>,
    state: Arc<GateState>,
}

impl Ticket {
    pub(super) fn new(permit: OwnedSemaphorePermit, state: Arc<GateState>) -> Self {
        state.on_admit();
        Self {
            permit: Some(permit),
            state,
        }
    }

    /// Returns the capacity to the gate. Further calls are no-ops.
    pub fn release(&mut self) {
        if let Some(permit) = self.permit.take() {
            // Counter first, permit second: `in_use` never exceeds the permits held.
            self.state.in_use.fetch_sub(1, Ordering::AcqRel);
            drop(permit);
        }
    }

    /// True once the ticket has been released.
    pub fn is_released(&self) -> bool {
        self.permit.is_none()
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("released", &self.is_released())
            .finish()
    }
}
