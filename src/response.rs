//! The response a completed transaction hands back to its caller.

/// Result of a completed command transaction: whether the final response
/// indicated success, the final response line itself, and any intermediate
/// lines delivered before it, in receipt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtResponse {
    success: bool,
    final_response: String,
    intermediates: Vec<String>,
}

impl AtResponse {
    pub(crate) fn new(success: bool, final_response: String, intermediates: Vec<String>) -> Self {
        Self {
            success,
            final_response,
            intermediates,
        }
    }

    /// `true` if the final response was one of the recognized success
    /// tokens ("OK", "CONNECT").
    pub fn success(&self) -> bool {
        self.success
    }

    /// The final response line, e.g. `"OK"` or `"+CME ERROR: 10"`.
    pub fn final_response(&self) -> &str {
        &self.final_response
    }

    /// Intermediate lines received before the final response, in the order
    /// they arrived.
    pub fn intermediates(&self) -> &[String] {
        &self.intermediates
    }

    /// Extracts the numeric code from a `"+CME ERROR: <n>"` final response.
    ///
    /// Returns `None` if the transaction succeeded, if the final response
    /// does not carry a `+CME ERROR:` prefix, or if the trailing token is
    /// not a valid integer — mirroring the original sentinel value used for
    /// "not a CME error" rather than modeling it as an error itself.
    pub fn cme_error(&self) -> Option<i32> {
        if self.success {
            return None;
        }
        let rest = self.final_response.strip_prefix("+CME ERROR:")?;
        rest.trim().parse().ok()
    }
}
