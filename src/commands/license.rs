use std::sync::Arc;

use anyhow::Context;
use corebridge_ping::clienv;
use corebridge_ping::license::{HttpLicenseAuthority, LicenseManager, VALIDATION_TIMEOUT};
use corebridge_ping::{shared_plugin_state, ConfigStore};

use crate::args::LicenseCommands;

pub(crate) async fn cmd_license(command: LicenseCommands) -> anyhow::Result<()> {
    let store = ConfigStore::from_env();
    let authority = HttpLicenseAuthority::new(clienv::license_manager_url(), VALIDATION_TIMEOUT)?;
    let manager = LicenseManager::new(Arc::new(authority), store.clone(), shared_plugin_state());

    match command {
        LicenseCommands::Status => cmd_status(&manager, &store).await,
        LicenseCommands::Configure { key } => cmd_configure(&manager, &store, &key).await,
    }
}

async fn cmd_status(manager: &LicenseManager, store: &ConfigStore) -> anyhow::Result<()> {
    let config = store.load()?;

    println!("Config file:  {}", store.path().display());
    println!("Machine ID:   {}", manager.machine_id());

    match config.license_key.as_deref() {
        Some(key) => println!("License key:  {}", mask(key)),
        None => {
            println!("License key:  (not configured)");
            return Ok(());
        }
    }

    manager.initialize().await;
    let snapshot = manager.status_snapshot().await;
    println!("Status:       {}", snapshot.status);
    if let Some(checked) = snapshot.last_check {
        println!("Last check:   {}", checked.to_rfc3339());
    }
    Ok(())
}

async fn cmd_configure(manager: &LicenseManager, store: &ConfigStore, key: &str) -> anyhow::Result<()> {
    manager
        .configure(key)
        .await
        .context("License key was not accepted")?;

    println!("License configured successfully");
    println!("Stored in {}", store.path().display());
    Ok(())
}

/// Show only the last four characters of a key.
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_last_four() {
        assert_eq!(mask("ABCD-1234-WXYZ"), "**********WXYZ");
        assert_eq!(mask("abc"), "***");
        assert_eq!(mask(""), "");
    }
}
