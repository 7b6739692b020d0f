use anyhow::Result;
use clap::Parser;
use console::style;

/// Validate a configuration file.
#[derive(Parser)]
pub struct CheckCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "disp.toml")]
    pub config: String,
}

impl CheckCommand {
    /// Execute the check command.
    pub fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        let config = super::load_config(&self.config)?;
        config.validate()?;

        println!(
            "{} {} is valid",
            style("✓").green().bold(),
            style(&self.config).cyan()
        );
        println!();
        print!("{}", toml::to_string_pretty(&config)?);
        Ok(())
    }
}
