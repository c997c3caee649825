//! Authentication integration tests.
//!
//! Drives the real router over HTTP against a mocked identity provider.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use jsonwebtoken::{Algorithm, Header};
use rs_test_utils::*;
use serde_json::{json, Value};

const PROTECTED: &str = "/api/data";

struct TestContext {
    keypair: TestKeypair,
    idp: MockIdentityProvider,
    server: TestServer,
    client: reqwest::Client,
}

impl TestContext {
    async fn new() -> Result<Self> {
        let keypair = TestKeypair::new(1, "signing-key-1");
        let idp = MockIdentityProvider::start(&[&keypair]).await;
        let server = TestServer::spawn(&idp).await?;
        Ok(Self {
            keypair,
            idp,
            server,
            client: reqwest::Client::new(),
        })
    }

    fn claims(&self) -> TestTokenBuilder {
        TestTokenBuilder::new(&self.idp.issuer())
    }

    async fn get_protected(&self, authorization: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self.client.get(format!("{}{}", self.server.url(), PROTECTED));
        if let Some(value) = authorization {
            request = request.header("Authorization", value);
        }
        Ok(request.send().await?)
    }

    async fn get_with_token(&self, token: &str) -> Result<reqwest::Response> {
        self.get_protected(Some(&format!("Bearer {token}"))).await
    }
}

async fn assert_invalid_token(response: reqwest::Response) -> Result<()> {
    assert_eq!(response.status(), 401);

    let challenge = response
        .headers()
        .get("www-authenticate")
        .expect("401 must carry a challenge")
        .to_str()?
        .to_string();
    assert!(challenge.starts_with("Bearer"), "challenge: {challenge}");

    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    assert_eq!(
        body["error"]["message"],
        "The access token is invalid or expired"
    );
    Ok(())
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test]
async fn test_public_data_needs_no_token() -> Result<()> {
    let ctx = TestContext::new().await?;

    let response = ctx
        .client
        .get(format!("{}/api/public-data", ctx.server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"message": "This is public data."}));

    // No token, no reason to contact the IdP
    assert_eq!(ctx.idp.jwks_request_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_protected_data_without_authorization_is_401() -> Result<()> {
    let ctx = TestContext::new().await?;

    let response = ctx.get_protected(None).await?;

    assert_eq!(response.status(), 401);
    assert_eq!(
        response.headers().get("www-authenticate").unwrap(),
        "Bearer realm=\"resource-server\""
    );
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    Ok(())
}

#[tokio::test]
async fn test_protected_data_with_valid_token() -> Result<()> {
    let ctx = TestContext::new().await?;
    let token = ctx.keypair.sign(
        &ctx.claims()
            .for_user("u1")
            .with_name("alice")
            .with_provider_id("p1")
            .with_scopes(&["openid", "profile"])
            .build(),
    );

    let response = ctx.get_with_token(&token).await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "Hello alice, this is protected data.");
    assert_eq!(body["userId"], "u1");
    assert_eq!(body["providerId"], "p1");
    assert_eq!(body["grantedScopes"], "openid, profile");

    let claims = body["claims"].as_array().unwrap();
    assert!(claims.contains(&json!({"type": "sub", "value": "u1"})));
    assert!(claims.contains(&json!({"type": "scope", "value": "openid"})));
    assert!(claims.contains(&json!({"type": "scope", "value": "profile"})));
    Ok(())
}

#[tokio::test]
async fn test_protected_data_with_other_audience_is_401() -> Result<()> {
    let ctx = TestContext::new().await?;
    let token = ctx.keypair.sign(
        &ctx.claims()
            .for_user("u1")
            .with_audience(json!("api://someone-else"))
            .build(),
    );

    assert_invalid_token(ctx.get_with_token(&token).await?).await
}

// ============================================================================
// Response shape
// ============================================================================

#[tokio::test]
async fn test_minimal_token_renders_nulls() -> Result<()> {
    let ctx = TestContext::new().await?;
    let token = ctx.keypair.sign(&ctx.claims().without_claim("sub").build());

    let response = ctx.get_with_token(&token).await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "This is protected data.");
    assert_eq!(body["userId"], Value::Null);
    assert_eq!(body["providerId"], Value::Null);
    assert_eq!(body["grantedScopes"], "");
    Ok(())
}

#[tokio::test]
async fn test_space_delimited_scope_string() -> Result<()> {
    let ctx = TestContext::new().await?;
    let token = ctx
        .keypair
        .sign(&ctx.claims().with_scope_string("read:data write:data").build());

    let body: Value = ctx.get_with_token(&token).await?.json().await?;
    assert_eq!(body["grantedScopes"], "read:data, write:data");
    Ok(())
}

#[tokio::test]
async fn test_audience_array_containing_expected_is_accepted() -> Result<()> {
    let ctx = TestContext::new().await?;
    let token = ctx.keypair.sign(
        &ctx.claims()
            .with_audience(json!(["api://other", TEST_AUDIENCE]))
            .build(),
    );

    assert_eq!(ctx.get_with_token(&token).await?.status(), 200);
    Ok(())
}

// ============================================================================
// Authorization header shapes
// ============================================================================

#[tokio::test]
async fn test_basic_scheme_is_401() -> Result<()> {
    let ctx = TestContext::new().await?;

    let response = ctx.get_protected(Some("Basic dXNlcjpwYXNz")).await?;

    assert_eq!(response.status(), 401);
    assert_eq!(ctx.idp.jwks_request_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_bearer_scheme_is_case_insensitive() -> Result<()> {
    let ctx = TestContext::new().await?;
    let token = ctx.keypair.sign(&ctx.claims().build());

    let response = ctx.get_protected(Some(&format!("bearer {token}"))).await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

// ============================================================================
// Rejected tokens
// ============================================================================

#[tokio::test]
async fn test_expired_token_is_401() -> Result<()> {
    let ctx = TestContext::new().await?;
    // Well past the default 300s clock skew
    let token = ctx.keypair.sign(&ctx.claims().expires_in(-3600).build());

    assert_invalid_token(ctx.get_with_token(&token).await?).await
}

#[tokio::test]
async fn test_oversized_token_is_401_without_idp_traffic() -> Result<()> {
    let ctx = TestContext::new().await?;
    let token = format!("{}.{}.{}", "a".repeat(4000), "b".repeat(4000), "c".repeat(193));
    assert_eq!(token.len(), 8195);

    assert_invalid_token(ctx.get_with_token(&token).await?).await?;
    assert_eq!(ctx.idp.jwks_request_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_alg_none_is_401() -> Result<()> {
    let ctx = TestContext::new().await?;
    let token = unsigned_token(
        &json!({"alg": "none", "typ": "JWT", "kid": ctx.keypair.kid}),
        &ctx.claims().build(),
        "",
    );

    assert_invalid_token(ctx.get_with_token(&token).await?).await?;
    assert_eq!(ctx.idp.jwks_request_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_hs256_token_is_401() -> Result<()> {
    let ctx = TestContext::new().await?;
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(ctx.keypair.kid.clone());
    let token = jsonwebtoken::encode(
        &header,
        &ctx.claims().build(),
        &jsonwebtoken::EncodingKey::from_secret(&ctx.keypair.public_key_bytes),
    )?;

    assert_invalid_token(ctx.get_with_token(&token).await?).await
}

#[tokio::test]
async fn test_unknown_kid_is_401() -> Result<()> {
    let ctx = TestContext::new().await?;
    let stranger = TestKeypair::new(99, "not-published");
    let token = stranger.sign(&ctx.claims().build());

    assert_invalid_token(ctx.get_with_token(&token).await?).await
}

#[tokio::test]
async fn test_known_kid_wrong_key_is_401() -> Result<()> {
    let ctx = TestContext::new().await?;
    // Signed by another key but claiming the published kid
    let impostor = TestKeypair::new(42, &ctx.keypair.kid);
    let token = impostor.sign(&ctx.claims().build());

    assert_invalid_token(ctx.get_with_token(&token).await?).await
}

#[tokio::test]
async fn test_malformed_tokens_are_401() -> Result<()> {
    let ctx = TestContext::new().await?;

    for token in ["not-a-jwt", "a.b", "a.b.c.d", "!!!.???.sig"] {
        assert_invalid_token(ctx.get_with_token(token).await?).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_tampered_payload_is_401() -> Result<()> {
    let ctx = TestContext::new().await?;
    let token = ctx.keypair.sign(&ctx.claims().for_user("u1").build());
    let forged = ctx.keypair.sign(&ctx.claims().for_user("admin").build());

    // Payload of one token with the signature of another
    let parts: Vec<&str> = token.split('.').collect();
    let forged_parts: Vec<&str> = forged.split('.').collect();
    let tampered = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

    assert_invalid_token(ctx.get_with_token(&tampered).await?).await
}

#[tokio::test]
async fn test_rejections_share_one_body() -> Result<()> {
    let ctx = TestContext::new().await?;
    let expired = ctx.keypair.sign(&ctx.claims().expires_in(-3600).build());
    let wrong_issuer = ctx
        .keypair
        .sign(&ctx.claims().with_issuer("https://evil.example").build());

    let first: Value = ctx.get_with_token(&expired).await?.json().await?;
    let second: Value = ctx.get_with_token(&wrong_issuer).await?.json().await?;
    let third: Value = ctx.get_with_token("garbage").await?.json().await?;

    assert_eq!(first, second);
    assert_eq!(second, third);
    Ok(())
}

#[tokio::test]
async fn test_invalid_token_challenge_names_error() -> Result<()> {
    let ctx = TestContext::new().await?;

    let response = ctx.get_with_token("garbage").await?;

    assert_eq!(
        response.headers().get("www-authenticate").unwrap(),
        "Bearer realm=\"resource-server\", error=\"invalid_token\""
    );
    Ok(())
}

// ============================================================================
// Key rotation
// ============================================================================

#[tokio::test]
async fn test_rotated_key_is_picked_up() -> Result<()> {
    let ctx = TestContext::new().await?;
    let first = ctx.keypair.sign(&ctx.claims().build());
    assert_eq!(ctx.get_with_token(&first).await?.status(), 200);

    let rotated = TestKeypair::new(2, "signing-key-2");
    ctx.idp.set_keys(&[&ctx.keypair, &rotated]).await;
    let second = rotated.sign(&ctx.claims().build());

    assert_eq!(ctx.get_with_token(&second).await?.status(), 200);
    assert_eq!(ctx.idp.jwks_request_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_idp_down_before_first_fetch_is_401() -> Result<()> {
    let ctx = TestContext::new().await?;
    ctx.idp.fail_jwks(503).await;
    let token = ctx.keypair.sign(&ctx.claims().build());

    assert_invalid_token(ctx.get_with_token(&token).await?).await
}
