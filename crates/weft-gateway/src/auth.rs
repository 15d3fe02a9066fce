use weft_core::config::GatewayConfig;

/// Result of a successful authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthResult {
    /// Key name, for logs.
    pub name: String,
    /// Owner every request on this key acts as.
    pub owner_id: String,
}

/// Bearer key -> configured API key -> owner.
///
/// With no keys configured every request is accepted as the default owner.
/// Returns `None` on auth failure.
pub fn validate_auth(config: &GatewayConfig, bearer: Option<&str>) -> Option<AuthResult> {
    if config.api_keys.is_empty() {
        return Some(AuthResult {
            name: "anonymous".into(),
            owner_id: config.default_owner.clone(),
        });
    }

    let bearer = bearer?;
    config
        .api_keys
        .iter()
        .find(|ak| ak.key == bearer)
        .map(|ak| AuthResult {
            name: ak.name.clone(),
            owner_id: ak.owner_id.clone(),
        })
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::config::ApiKeyConfig;

    fn gateway(api_keys: Vec<ApiKeyConfig>) -> GatewayConfig {
        GatewayConfig {
            api_keys,
            ..GatewayConfig::default()
        }
    }

    fn key(name: &str, key: &str, owner: &str) -> ApiKeyConfig {
        ApiKeyConfig {
            name: name.into(),
            key: key.into(),
            owner_id: owner.into(),
        }
    }

    #[test]
    fn test_no_keys_is_default_owner() {
        let config = gateway(vec![]);
        let auth = validate_auth(&config, None).unwrap();
        assert_eq!(auth.owner_id, "local");
        // A stray header is ignored when auth is off.
        assert!(validate_auth(&config, Some("anything")).is_some());
    }

    #[test]
    fn test_key_maps_to_owner() {
        let config = gateway(vec![key("ci", "wk_ci", "team-a"), key("ops", "wk_ops", "team-b")]);
        assert_eq!(validate_auth(&config, Some("wk_ops")).unwrap().owner_id, "team-b");
        assert_eq!(validate_auth(&config, Some("wk_ci")).unwrap().name, "ci");
    }

    #[test]
    fn test_wrong_or_missing_key_rejected() {
        let config = gateway(vec![key("ci", "wk_ci", "team-a")]);
        assert!(validate_auth(&config, Some("wk_nope")).is_none());
        assert!(validate_auth(&config, None).is_none());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }
}
