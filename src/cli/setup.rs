//! Setup commands
//!
//! `init` writes a default configuration, `set-token` stores the auth token
//! in the system keyring.

use notifier_core::{
    config::{toml_config, toml_config::TomlConfig, NotifierConfig},
    credentials::keyring,
    error::{ConfigError, KeyringError, NotifierError},
    types::AuthToken,
};
use std::io::{self, Write};

/// Write a default configuration for `username`
pub fn run_init(username: &str, force: bool) -> Result<(), NotifierError> {
    if toml_config::config_exists()? && !force {
        println!("⚠️  Existing configuration detected.");
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    let config = TomlConfig::new(NotifierConfig::new(username));
    config.validate()?;

    toml_config::save_config(&config)?;

    println!(
        "✅ Configuration written to {}",
        toml_config::get_config_path()?.display()
    );
    println!();
    println!("Next steps:");
    println!("  notifier set-token   - Store your auth token");
    println!("  notifier candidates  - Show where the client will connect");
    println!("  notifier connect     - Connect");

    Ok(())
}

/// Prompt for the auth token and store it in the keyring
pub fn run_set_token() -> Result<(), NotifierError> {
    let config = toml_config::load_config()?;
    let username = &config.notifier.username;

    println!("🔐 Storing auth token for {}", username);
    println!("It will be kept in your system keyring.");
    println!();

    let token = loop {
        let input = prompt_input("Auth token: ")?;
        let token = AuthToken::new(input);
        if token.is_empty() {
            println!("❌ Token cannot be empty. Please try again.");
            continue;
        }
        break token;
    };

    keyring::store_token(username, &token).map_err(|e| {
        if matches!(e, NotifierError::Keyring(KeyringError::ServiceUnavailable)) {
            println!("❌ Keyring is not available or locked.");
            println!("Please ensure your system keyring is unlocked and available.");
        }
        e
    })?;

    println!("✅ Token stored.");
    Ok(())
}

/// Low-level input prompting
fn prompt_input(prompt: &str) -> Result<String, NotifierError> {
    print!("{}", prompt);
    io::stdout().flush().map_err(NotifierError::Io)?;

    let mut input = String::new();
    let read = io::stdin().read_line(&mut input).map_err(NotifierError::Io)?;
    if read == 0 {
        return Err(NotifierError::Config(ConfigError::MissingField {
            field: "token".to_string(),
        }));
    }

    Ok(input.trim().to_string())
}
