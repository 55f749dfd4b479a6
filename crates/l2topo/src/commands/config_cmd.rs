//! Config subcommand handlers.

use std::io::BufRead;

use l2topo_config::KEYRING_SERVICE;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands::{config_file, load_config, require_device};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match &args.command {
        ConfigCommand::Path => {
            output::print_output(&config_file(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = load_config(global)?.redacted();
            let toml = cfg.to_toml()?;
            let rendered =
                output::render_single(&global.output, &cfg, |_| toml.clone(), |_| toml.clone())?;
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetToken { device } => {
            let cfg = load_config(global)?;
            require_device(&cfg, device)?;

            let token = read_token(std::io::stdin().lock())?;
            let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{device}/token"))
                .map_err(|e| CliError::Keyring(e.to_string()))?;
            entry
                .set_password(&token)
                .map_err(|e| CliError::Keyring(e.to_string()))?;

            tracing::info!(device = %device, "token stored in keyring");
            output::print_output(
                &format!("Token for '{device}' stored in the system keyring"),
                global.quiet,
            );
            Ok(())
        }
    }
}

/// First line of input, trimmed. Empty input is rejected.
fn read_token(input: impl BufRead) -> Result<String, CliError> {
    let line = input.lines().next().transpose()?.unwrap_or_default();
    let token = line.trim();
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "expected the token on stdin, got nothing".into(),
        });
    }
    Ok(token.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn token_is_first_trimmed_line() {
        let token = read_token("  abc123 \nignored\n".as_bytes()).unwrap();
        assert_eq!(token, "abc123");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            read_token("\n".as_bytes()),
            Err(CliError::Validation { .. })
        ));
        assert!(read_token(&b""[..]).is_err());
    }
}
