//! HTTP-like request/response protocol over the transport fabric.

pub mod client;
pub mod server;

pub use client::Client;
pub use server::{Handler, Server};
