//! `config` command: print the effective configuration.

use anyhow::Result;

use crate::bootstrap::CliContext;

/// Render the effective configuration as pretty JSON.
pub fn render(ctx: &CliContext) -> Result<String> {
    Ok(serde_json::to_string_pretty(&ctx.config)?)
}

pub fn execute(ctx: &CliContext) -> Result<()> {
    println!("{}", render(ctx)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::bootstrap;

    #[test]
    fn renders_loadable_json() {
        let ctx = bootstrap(None).unwrap();
        let json = render(&ctx).unwrap();
        let parsed: ailinker_core::AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ctx.config);
    }
}
