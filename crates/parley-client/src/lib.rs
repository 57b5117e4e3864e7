//! HTTP adapter for the Parley chat core: implements the backend trait
//! against the console's REST API.

pub mod http;

pub use http::HttpBackend;
