//! Intake flow: review an extraction, confirm it into a draft, and submit the
//! pre-filled record form to the Record Store.

mod form;
mod gate;

pub use form::{FormError, RecordForm, Violation};
pub use gate::{Applied, GateError, GateState, ScanSession, Ticket};
