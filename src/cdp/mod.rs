//! Hand-maintained catalog of the CDP subset the driver itself issues.
//!
//! Shapes follow the published protocol schema. The transport and
//! multiplexer never depend on anything in here; they move raw frames and
//! method strings only.

pub mod browser_protocol;
pub mod js_protocol;
