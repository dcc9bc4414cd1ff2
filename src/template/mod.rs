//! Notification template engine.
//!
//! This module provides:
//! - Loading a directory of template fragments with a named entry fragment
//! - Helper functions available inside templates (`indent`, `hasTag`, `last`)
//! - Destination templates that compute a recipient address from a payload
//!
//! Templates use minijinja syntax and tolerate missing payload keys.
//!
//! # Example
//!
//! ```ignore
//! let set = TemplateSet::load("/etc/jibber/tpl", "main.tpl", ".tpl")?;
//! let message = set.execute(&payload)?;
//! if message.is_empty() {
//!     // nothing to send
//! }
//! ```

mod helpers;
mod set;
mod types;

pub use helpers::{contains_tag, indent_lines};
pub use set::{environment, DestinationTemplate, TemplateSet};
pub use types::{TemplateError, TemplateResult};
