use crate::cli::parser::Commands;
use crate::config::Config;
use crate::errors::AppResult;
use crate::ui::messages::{error, info, success, warning};

/// Handle the `config` subcommand
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Config {
        print_config,
        check,
    } = cmd
    {
        if *print_config {
            println!("📄 Current configuration:\n");
            println!("{}", serde_yaml::to_string(cfg)?);
        }

        if *check {
            let path = Config::config_file();
            if path.exists() {
                let missing = Config::missing_fields(&path)?;
                if missing.is_empty() {
                    success(format!("{} has every field", path.display()));
                } else {
                    warning(format!(
                        "{} is missing: {} (defaults apply)",
                        path.display(),
                        missing.join(", ")
                    ));
                }
            } else {
                info(format!("{} not found, defaults apply", path.display()));
            }

            match cfg.validate() {
                Ok(()) => success("Configuration is valid."),
                Err(e) => {
                    error(format!("Configuration is invalid: {e}"));
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}
