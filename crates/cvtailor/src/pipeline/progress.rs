//! Progress values written at each step of an attempt.
//!
//! Within one attempt progress only moves forward; it returns to
//! [`QUEUED`] when the job goes back to the queue.

pub const QUEUED: u8 = 0;
pub const CLAIMED: u8 = 10;
pub const EXTRACTED: u8 = 50;
pub const TAILORED: u8 = 80;
pub const COMPLETED: u8 = 100;
