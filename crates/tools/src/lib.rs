//! Built-in tool implementations for Toolwright.
//!
//! Tools give the agent the ability to act on the world. Each one is a
//! [`ToolSpec`](toolwright_core::tool::ToolSpec) registered once at startup.

pub mod currency;

use toolwright_core::error::ToolError;
use toolwright_core::tool::ToolRegistry;

pub use currency::{
    Conversion, CurrencyConverter, OpenExchangeRates, RateSource, StaticRates,
    convert_currency_spec,
};

/// Create a tool registry with every built-in tool, using live exchange rates.
pub fn default_registry() -> Result<ToolRegistry, ToolError> {
    registry_with_rates(OpenExchangeRates::new())
}

/// Create a tool registry with every built-in tool, using `rates` for
/// currency conversion.
pub fn registry_with_rates(rates: impl RateSource + 'static) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(convert_currency_spec(rates))?;
    Ok(registry)
}
