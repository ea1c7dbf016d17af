use serde::{Deserialize, Serialize};

/// External identity provider issuing the bearer tokens.
///
/// Filled from `SUPABASE_URL` / `SUPABASE_ANON_KEY` when those variables
/// are present. A configured `jwt_secret` (or the anon key as fallback)
/// selects HS256 verification; otherwise keys are fetched from the
/// provider's JWKS endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}
