//! LLM provider implementations and the provider-backed Model Gateway.
//!
//! All providers implement the `toolwright_core::Provider` trait.
//! [`ProviderGateway`] wraps one and implements `ModelGateway` on top.

pub mod gateway;
pub mod openai_compat;

pub use gateway::{ProviderGateway, build_from_config};
pub use openai_compat::OpenAiCompatProvider;
