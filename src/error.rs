use thiserror::Error;

/// Error type covering both utilities in this crate.
///
/// Transport failures (`Http`, `HttpStatus`) mean the GET itself did not
/// complete; `XmlParse` means a body was fetched but could not be turned
/// into a document. Info-format parsing has no error channel at all:
/// malformed lines are dropped, not reported.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url} - {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Unable to parse response body into XML: {details}")]
    XmlParse { details: String },
}

impl Error {
    /// Whether this error came from the transport rather than the parser.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::HttpStatus { .. })
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let error = Error::HttpStatus {
            url: "http://updates.example.org/release-history".to_string(),
            status: 503,
            message: "HTTP 503: Service Unavailable".to_string(),
        };
        assert!(error.to_string().contains("HTTP status error"));
        assert!(error.to_string().contains("503"));
        assert!(
            error
                .to_string()
                .contains("http://updates.example.org/release-history")
        );
        assert!(error.is_transport());
    }

    #[test]
    fn test_xml_parse_display_carries_prefix() {
        let error = Error::XmlParse {
            details: "Premature end of data in tag a line 1".to_string(),
        };
        assert!(
            error
                .to_string()
                .starts_with("Unable to parse response body into XML: ")
        );
        assert!(error.to_string().contains("Premature end of data"));
        assert!(!error.is_transport());
    }

    #[test]
    fn test_debug_formatting() {
        let error = Error::XmlParse {
            details: "boom".to_string(),
        };
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("XmlParse"));
        assert!(debug_str.contains("boom"));
    }
}
