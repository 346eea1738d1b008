//! Formatting of panic payloads caught from connection tasks.

use std::{any::Any, fmt};

/// Borrowed panic payload that renders as text when logged.
///
/// String payloads are shown as-is; anything else falls back to `Debug`.
///
/// ```
/// use pickle_ingest::panic::format_panic;
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(format_panic(payload.as_ref()).to_string(), "boom");
/// let payload: Box<dyn std::any::Any + Send> = Box::new(5_u32);
/// assert!(format_panic(payload.as_ref()).to_string().contains("Any"));
/// ```
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            self.0.downcast_ref::<String>(),
            self.0.downcast_ref::<&'static str>(),
        ) {
            (Some(s), _) => f.write_str(s),
            (None, Some(s)) => f.write_str(s),
            (None, None) => write!(f, "{:?}", self.0),
        }
    }
}

/// Wrap a caught panic payload for display.
pub fn format_panic(panic: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(panic) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_payloads_are_shown_verbatim() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(format_panic(owned.as_ref()).to_string(), "owned boom");
    }

    #[test]
    fn caught_panics_are_formatted() {
        let caught = std::panic::catch_unwind(|| panic!("bad frame {}", 7))
            .expect_err("closure panics");
        assert_eq!(format_panic(caught.as_ref()).to_string(), "bad frame 7");
    }
}
