use rusty_hub::auth::token::{Claims, JwtSessionResolver, SessionResolver, TokenManager};
use rusty_hub::error::RustyHubError;

const SECRET: &str = "auth-test-signing-key-3e8b51";

#[test]
fn test_jwt_token_creation_and_validation() {
    let token_manager = TokenManager::new(SECRET);

    let mut claims = Claims::new(123, "testuser".to_string(), 7);
    claims.display_name = Some("Test User".to_string());

    let token = token_manager.generate_token(&claims).unwrap();
    assert!(!token.is_empty());

    let validated = token_manager.validate_token(&token).unwrap();
    assert_eq!(validated.claims.sub, "123");
    assert_eq!(validated.claims.username, "testuser");
    assert_eq!(validated.claims.workspace_id, 7);
    assert_eq!(validated.claims.display_name, Some("Test User".to_string()));
}

#[test]
fn test_invalid_token_validation() {
    let token_manager = TokenManager::new(SECRET);
    assert!(token_manager.validate_token("invalid.token.here").is_err());
}

#[test]
fn test_expired_token() {
    let mut claims = Claims::with_expiration(123, "testuser".to_string(), 7, 0);
    claims.exp = claims.iat - 3600;
    assert!(claims.is_expired());

    // Well past the decoder's leeway
    let token = TokenManager::new(SECRET).generate_token(&claims).unwrap();
    assert!(TokenManager::new(SECRET).get_claims(&token).is_err());
}

#[tokio::test]
async fn test_resolver_builds_session_from_claims() {
    let mut claims = Claims::new(42, "grace".to_string(), 3);
    claims.display_name = Some("Grace Hopper".to_string());
    claims.avatar_url = Some("https://cdn.example.com/a/42.png".to_string());
    let token = TokenManager::new(SECRET).generate_token(&claims).unwrap();

    let session = JwtSessionResolver::new(SECRET).resolve(&token).await.unwrap();
    assert_eq!(session.workspace_id, 3);
    assert_eq!(session.profile.id, 42);
    assert_eq!(session.profile.username, "grace");
    assert_eq!(session.profile.shown_name(), "Grace Hopper");
    assert!(session.profile.avatar_url.is_some());
}

#[tokio::test]
async fn test_resolver_rejects_bad_tokens() {
    let resolver = JwtSessionResolver::new(SECRET);

    let foreign = TokenManager::new("another-signing-key-0a7d")
        .generate_token(&Claims::new(1, "mallory".to_string(), 3))
        .unwrap();
    assert!(matches!(
        resolver.resolve(&foreign).await,
        Err(RustyHubError::AuthError(_))
    ));

    assert!(resolver.resolve("bad\ntoken").await.is_err());
    assert!(resolver.resolve(&"a".repeat(10_000)).await.is_err());

    let nameless = Claims::new(1, String::new(), 3);
    let token = TokenManager::new(SECRET).generate_token(&nameless).unwrap();
    assert!(resolver.resolve(&token).await.is_err());
}
