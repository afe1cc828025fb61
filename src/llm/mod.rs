//! Language model plumbing: prompt construction, the HTTP client and
//! response parsing.

pub mod client;
pub mod parser;
pub mod prompt;

pub use client::{
    invoke_with_retry, ApiKey, ClientSettings, HttpModelClient, InvokeOptions, ModelClient,
    RetryPolicy,
};
pub use parser::parse;
pub use prompt::{build_prompt, Prompt};
