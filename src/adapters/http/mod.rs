//! HTTP adapters for outbound calls.

pub mod webhook;

pub use webhook::HttpWebhookAdapter;
