pub mod client;
pub mod informers;

pub use client::K8sClient;
