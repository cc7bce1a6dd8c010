//! Testing utilities for the auditor interceptor
//!
//! # Mock Server
//!
//! [`MockServer`] stands in for a remote audit collector. It answers requests
//! according to registered expectations, records everything it receives,
//! and can delay its answers to exercise client timeouts.

pub mod expectation;
pub mod matcher;
pub mod server;

pub use expectation::{Expectation, MockResponse, Times};
pub use matcher::RequestMatcher;
pub use server::{ExpectationBuilder, MockServer, RecordedRequest};
