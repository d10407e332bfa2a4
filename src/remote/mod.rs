//! Remote backend access: the transport seam and the typed REST client.

mod client;
mod http;

pub use client::ApiClient;
pub use http::{ApiRequest, HttpClient, HttpResponse, ReqwestHttpClient};
