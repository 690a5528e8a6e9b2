//! Access tokens in the system keychain, keyed by deployment URL.

use keyring::Entry;

const SERVICE_NAME: &str = "deep-agent-chat";

fn entry(deployment_url: &str) -> keyring::Result<Entry> {
    Entry::new(SERVICE_NAME, deployment_url.trim_end_matches('/'))
}

/// Store the access token for a deployment.
///
/// # Errors
///
/// Returns an error if the keychain is unavailable.
pub fn store_access_token(deployment_url: &str, token: &str) -> anyhow::Result<()> {
    entry(deployment_url)?.set_password(token)?;
    tracing::debug!(deployment_url, "stored access token");
    Ok(())
}

/// Access token for a deployment, if one is stored.
#[must_use]
pub fn get_access_token(deployment_url: &str) -> Option<String> {
    entry(deployment_url).ok()?.get_password().ok()
}

/// Remove the stored token for a deployment.
///
/// # Errors
///
/// Returns an error if the keychain is unavailable or holds no token.
pub fn delete_access_token(deployment_url: &str) -> anyhow::Result<()> {
    entry(deployment_url)?.delete_credential()?;
    Ok(())
}
