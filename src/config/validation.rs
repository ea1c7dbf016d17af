use anyhow::{bail, Context, Result};

use super::Config;

/// Hard configuration checks performed at startup (and by
/// `--validate-config`).
pub fn validate_config(config: &Config) -> Result<()> {
    if config.port == 0 {
        bail!("port must be non-zero");
    }

    let identity = &config.identity;
    if identity.jwt_secret.is_none() && identity.anon_key.is_none() && identity.url.is_none() {
        bail!(
            "identity provider is not configured: set SUPABASE_URL, or a jwt secret / anon key \
             for local HS256 verification"
        );
    }
    if let Some(url) = &identity.url {
        url::Url::parse(url).with_context(|| format!("identity url `{url}` is not a valid URL"))?;
    }
    if let Some(url) = &config.cache.url {
        url::Url::parse(url).with_context(|| format!("cache url `{url}` is not a valid URL"))?;
    }

    if !(2..=4).contains(&config.server.default_max_players) {
        bail!(
            "default_max_players must be between 2 and 4, got {}",
            config.server.default_max_players
        );
    }
    if config.websocket.auth_timeout_secs == 0 {
        bail!("auth_timeout_secs must be non-zero");
    }
    if config.websocket.queue_capacity == 0 {
        bail!("queue_capacity must be non-zero");
    }

    Ok(())
}
