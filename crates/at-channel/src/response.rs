//! Command responses

use at_protocol::LineTokenizer;

/// Result of one completed command transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub(crate) success: bool,
    pub(crate) final_response: String,
    pub(crate) lines: Vec<String>,
}

/// Error classification of a failed response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmeError {
    /// The final response was not `+CME ERROR: <n>`
    NonCme,
    /// Mobile equipment error code
    Code(i64),
}

impl Response {
    /// Whether the modem answered with `OK` or `CONNECT`
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// The final result line (e.g. `OK`, `+CME ERROR: 10`)
    pub fn final_response(&self) -> &str {
        &self.final_response
    }

    /// Intermediate lines in arrival order
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The first intermediate line, for single-line and numeric commands
    pub fn first_line(&self) -> Option<&str> {
        self.lines.first().map(String::as_str)
    }

    /// Consume the response, returning its intermediate lines
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Error code carried by a failed response; `None` on success
    pub fn cme_error(&self) -> Option<CmeError> {
        if self.success {
            return None;
        }
        if !self.final_response.starts_with("+CME ERROR:") {
            return Some(CmeError::NonCme);
        }

        let code = LineTokenizer::new(&self.final_response).and_then(|mut tok| tok.next_int());
        Some(code.map(CmeError::Code).unwrap_or(CmeError::NonCme))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(success: bool, final_response: &str, lines: &[&str]) -> Response {
        Response {
            success,
            final_response: final_response.to_string(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn test_accessors() {
        let resp = response(true, "OK", &["+CSQ: 17,99"]);
        assert!(resp.is_success());
        assert_eq!(resp.final_response(), "OK");
        assert_eq!(resp.first_line(), Some("+CSQ: 17,99"));
        assert_eq!(resp.into_lines(), vec!["+CSQ: 17,99"]);
    }

    #[test]
    fn test_cme_error_code() {
        assert_eq!(
            response(false, "+CME ERROR: 10", &[]).cme_error(),
            Some(CmeError::Code(10))
        );
    }

    #[test]
    fn test_cme_error_non_cme() {
        assert_eq!(response(false, "ERROR", &[]).cme_error(), Some(CmeError::NonCme));
        assert_eq!(
            response(false, "+CME ERROR: SIM busy", &[]).cme_error(),
            Some(CmeError::NonCme)
        );
    }

    #[test]
    fn test_cme_error_on_success() {
        assert_eq!(response(true, "OK", &[]).cme_error(), None);
    }
}
