//! Echo-suppressed password prompting, the terminal-UI
//! collaborator the core pipeline treats as out of scope.

use dialoguer::Password;
use zeroize::Zeroizing;

use vaultar_core::Result;

/// Prompts once with echo suppressed, then again for confirmation,
/// requiring a byte-exact match. Returns the password wrapped so it is
/// zeroized on drop regardless of where the caller's control flow exits.
pub fn prompt_with_confirmation(prompt: &str) -> Result<Zeroizing<Vec<u8>>> {
    let pw = Password::new()
        .with_prompt(prompt)
        .with_confirmation("confirm password", "passwords did not match")
        .interact()
        .map_err(|e| vaultar_core::VaultarError::Config(format!("password prompt failed: {e}")))?;
    Ok(Zeroizing::new(pw.into_bytes()))
}

/// Prompts once, without confirmation, for the restore path (the password
/// only needs to match whatever was used at backup time; there is nothing
/// to confirm it against).
pub fn prompt_once(prompt: &str) -> Result<Zeroizing<Vec<u8>>> {
    let pw = Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| vaultar_core::VaultarError::Config(format!("password prompt failed: {e}")))?;
    Ok(Zeroizing::new(pw.into_bytes()))
}
