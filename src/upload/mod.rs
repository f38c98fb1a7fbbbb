//! Backend transport for sync batches and the project catalogue.

mod http;

pub use http::HttpUploadClient;
