pub mod client;
pub mod request;
pub mod transport;

pub use client::{HttpClient, HttpClientBuilder};
pub use request::{HttpMethod, RequestTask};
pub use transport::{Delivery, Transport};
