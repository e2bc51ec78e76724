//! `toolwright tools`: list the registered tools.

use toolwright_core::tool::ToolRegistry;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let registry = toolwright_tools::default_registry()?;
    print!("{}", describe(&registry));
    Ok(())
}

fn describe(registry: &ToolRegistry) -> String {
    let mut out = format!("Registered tools ({}):\n", registry.len());
    for name in registry.names() {
        let Ok(spec) = registry.resolve(name) else {
            continue;
        };
        out.push_str(&format!("\n  {}  {}\n", spec.name, spec.description));
        for (param, decl) in spec.parameters.iter() {
            let required = if decl.required { "required" } else { "optional" };
            out.push_str(&format!(
                "    {param}: {} ({required})  {}\n",
                decl.kind.as_str(),
                decl.description
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolwright_tools::{StaticRates, registry_with_rates};

    #[test]
    fn lists_currency_tool_parameters() {
        let registry = registry_with_rates(StaticRates::new()).unwrap();
        let text = describe(&registry);
        assert!(text.starts_with("Registered tools (1):"));
        assert!(text.contains("convert_currency"));
        assert!(text.contains("amount: number (required)"));
        assert!(text.contains("to_currency: string (required)"));
    }
}
