pub mod client;
pub mod types;

pub use client::{manifest_url, HttpTransport, InitOutcome, RpcTransport, ToolHostClient};
pub use types::{merge_tools, CallResult, ManifestContext, ToolDescriptor, ToolInputSchema};
