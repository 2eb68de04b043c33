use fieldcheck_core::credentials::CredentialStore;

use crate::cli::AuthCommands;
use crate::error::CliError;

pub fn run_auth(command: AuthCommands, store: &impl CredentialStore) -> Result<(), CliError> {
    match command {
        AuthCommands::SetToken { token } => {
            let token = token.trim();
            if token.is_empty() {
                return Err(CliError::EmptyToken);
            }
            store.save_token(token)?;
            tracing::info!("Stored session token in the system keyring");
            println!("Session token stored");
        }
        AuthCommands::Clear => {
            store.clear_token()?;
            tracing::info!("Cleared session token from the system keyring");
            println!("Session token cleared");
        }
        AuthCommands::Status => {
            if store.load_token()?.is_some() {
                println!("Session token is stored");
            } else {
                println!("No session token stored; uploads will fail until one is set");
            }
        }
    }
    Ok(())
}
