use super::*;
use crate::utils::HubError;

#[tokio::test]
async fn test_allow_all_admits_anonymous() {
    assert_eq!(AllowAll.validate(None).await.unwrap(), None);
    assert_eq!(AllowAll.validate(Some("anything")).await.unwrap(), None);
}

#[tokio::test]
async fn test_jwt_round_trip_yields_identity() {
    let auth = JwtAuthenticator::new("secret", None);
    let token = auth.issue("alice", chrono::Duration::hours(1)).unwrap();
    let identity = auth.validate(Some(&token)).await.unwrap().unwrap();
    assert_eq!(identity.subject, "alice");
    assert_eq!(identity.issuer, None);
}

#[tokio::test]
async fn test_jwt_missing_token_is_denied() {
    let auth = JwtAuthenticator::new("secret", None);
    assert!(matches!(auth.validate(None).await, Err(HubError::Auth(_))));
}

#[tokio::test]
async fn test_jwt_wrong_secret_is_denied() {
    let token = JwtAuthenticator::new("other", None)
        .issue("mallory", chrono::Duration::hours(1))
        .unwrap();
    let auth = JwtAuthenticator::new("secret", None);
    assert!(matches!(auth.validate(Some(&token)).await, Err(HubError::Auth(_))));
    assert!(matches!(
        auth.validate(Some("invalid.token.here")).await,
        Err(HubError::Auth(_))
    ));
}

#[tokio::test]
async fn test_jwt_expired_token_is_denied() {
    let auth = JwtAuthenticator::new("secret", None);
    let token = auth.issue("alice", chrono::Duration::hours(-2)).unwrap();
    assert!(matches!(auth.validate(Some(&token)).await, Err(HubError::Auth(_))));
}

#[tokio::test]
async fn test_jwt_issuer_is_checked() {
    let auth = JwtAuthenticator::new("secret", Some("hubcast".to_string()));
    let good = auth.issue("alice", chrono::Duration::hours(1)).unwrap();
    let identity = auth.validate(Some(&good)).await.unwrap().unwrap();
    assert_eq!(identity.issuer.as_deref(), Some("hubcast"));

    let foreign = JwtAuthenticator::new("secret", Some("elsewhere".to_string()))
        .issue("alice", chrono::Duration::hours(1))
        .unwrap();
    assert!(auth.validate(Some(&foreign)).await.is_err());
}
