//! SSH user lookup by key fingerprint

use tracing::{debug, info};

use crate::coordination::{join_path, Getter, StoreError};

/// Find the user owning the key with `fingerprint`.
///
/// Users live at `{base}/users/<name>/<fingerprint>`. Returns `None` when no
/// user has a matching key.
pub async fn find_ssh_user<G>(store: &G, base: &str, fingerprint: &str) -> Result<Option<String>, StoreError>
where
    G: Getter + ?Sized,
{
    let users = store.get(&join_path(base, "users"), true).await?;
    if !users.dir {
        debug!("{} is not a directory", users.key);
        return Ok(None);
    }

    for user in &users.nodes {
        debug!("checking user {}", user.key);
        if user.nodes.iter().any(|key| key.key.ends_with(fingerprint)) {
            let name = user.name().to_string();
            info!("found user {} for fingerprint {}", name, fingerprint);
            return Ok(Some(name));
        }
    }

    Ok(None)
}
