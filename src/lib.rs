//! # drupal-info Library
//!
//! Two small utilities used when mirroring Drupal project metadata: a
//! parser for Drupal's `.info` configuration format, and an HTTP client
//! that fetches a resource and parses the response body as XML with
//! external entity loading disabled.

pub mod error;
pub mod http_client;
pub mod info;
pub mod libxml2;

pub use error::{Error, Result};
pub use http_client::{HttpClientConfig, RequestOptions, XmlHttpClient};
pub use info::{InfoKey, InfoNode, InfoParser, InfoValue, parse_info_format};
pub use libxml2::{XmlDocument, XmlElement};
