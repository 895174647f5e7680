//! 令牌签发与校验，以及登录接口
//!
//! 令牌为 JWT 结构（`header.claims.signature`，base64url 无填充），HMAC-SHA256 签名。
//! 会话完全无状态，服务端不保存令牌。

use axum::extract::State;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use hospital_core::{HospitalError, LoginName, Principal, PrincipalId, Result, Role};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::password::verify_password;
use crate::response::{ApiJson, ApiResponse, ApiResult};
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: PrincipalId, // 主体ID
    role: Role,       // 角色
    exp: i64,         // 过期时间
    iat: i64,         // 签发时间
    jti: String,      // 令牌ID
}

/// 令牌签发与校验
pub struct TokenIssuer {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &str, lifetime_secs: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            lifetime: Duration::seconds(lifetime_secs),
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| HospitalError::Internal(format!("invalid token secret: {}", e)))
    }

    pub fn issue(&self, principal: Principal) -> Result<String> {
        self.issue_at(principal, Utc::now())
    }

    /// 以给定的签发时间生成令牌
    pub fn issue_at(&self, principal: Principal, now: DateTime<Utc>) -> Result<String> {
        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            sub: principal.id(),
            role: principal.role(),
            exp: (now + self.lifetime).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let message = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let mut mac = self.mac()?;
        mac.update(message.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", message, signature))
    }

    pub fn verify(&self, token: &str) -> Result<Principal> {
        self.verify_at(token, Utc::now())
    }

    /// 先校验签名（常量时间比较），再检查是否过期
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Principal> {
        let invalid = |reason: &str| HospitalError::InvalidToken(reason.to_string());

        let mut parts = token.split('.');
        let (header_b64, claims_b64, signature_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(c), Some(s), None) => (h, c, s),
            _ => return Err(invalid("malformed token")),
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| invalid("malformed signature"))?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid("signature mismatch"))?;

        let header: Header = URL_SAFE_NO_PAD
            .decode(header_b64)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| invalid("malformed header"))?;
        if header.alg != "HS256" {
            return Err(invalid("unsupported algorithm"));
        }

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| invalid("malformed claims"))?;

        if now.timestamp() > claims.exp {
            return Err(HospitalError::Expired);
        }

        Ok(Principal::new(claims.role, claims.sub))
    }
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(deserialize_with = "string_or_number")]
    pub username: String,
    pub password: String,
}

/// 患者常以数字形式提交 cc
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("username must be a string or a number")),
    }
}

const LOGIN_FAILED: &str = "Invalid username or password";

/// 登录处理器：`PUT /user`
pub async fn login_handler(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<String> {
    info!("PUT /user");
    let login = LoginName::parse(&request.username)?;
    debug!("Login attempt for {:?}", login);

    let credential = state.credentials.find_credential(&login).await?;
    let stored = credential.as_ref().map(|c| c.password_hash.clone());
    let password = request.password;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, stored.as_deref()))
        .await
        .map_err(|e| HospitalError::Internal(format!("password verification task failed: {}", e)))?;

    match credential {
        Some(credential) if verified => {
            let token = state.tokens.issue(credential.principal)?;
            info!("{} logged in", credential.principal);
            Ok(ApiResponse(token))
        }
        _ => {
            warn!("Rejected login for {:?}", login);
            Err(HospitalError::unauthorized(LOGIN_FAILED).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hospital_core::ErrorKind;

    const SECRET: &str = "test-secret-test-secret-test-secret!";

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2099, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_issue_then_verify() {
        let issuer = TokenIssuer::new(SECRET, 900);
        for principal in [
            Principal::Patient { cc: 123 },
            Principal::Assistant { id: 4 },
            Principal::Nurse { id: 5 },
            Principal::Doctor { id: 6 },
        ] {
            let token = issuer.issue_at(principal, issued_at()).unwrap();
            assert_eq!(token.split('.').count(), 3);
            let verified = issuer.verify_at(&token, issued_at() + Duration::seconds(899)).unwrap();
            assert_eq!(verified, principal);
        }
    }

    #[test]
    fn test_expired_after_lifetime() {
        let issuer = TokenIssuer::new(SECRET, 900);
        let token = issuer.issue_at(Principal::Patient { cc: 1 }, issued_at()).unwrap();
        assert!(issuer.verify_at(&token, issued_at() + Duration::seconds(900)).is_ok());
        let err = issuer.verify_at(&token, issued_at() + Duration::seconds(901)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);
    }

    #[test]
    fn test_tampered_or_foreign_tokens_are_invalid() {
        let issuer = TokenIssuer::new(SECRET, 900);
        let token = issuer.issue_at(Principal::Patient { cc: 1 }, issued_at()).unwrap();

        let other = TokenIssuer::new("another-secret-another-secret-12345", 900);
        assert_eq!(other.verify_at(&token, issued_at()).unwrap_err().kind(), ErrorKind::Invalid);

        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&serde_json::json!({
                "sub": 1, "role": "assistant", "exp": 4102444800i64, "iat": 0, "jti": "x"
            }))
            .unwrap(),
        );
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert_eq!(issuer.verify_at(&forged, issued_at()).unwrap_err().kind(), ErrorKind::Invalid);

        assert_eq!(issuer.verify_at("abc", issued_at()).unwrap_err().kind(), ErrorKind::Invalid);
        assert_eq!(issuer.verify_at("a.b.c.d", issued_at()).unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_expired_token_with_bad_signature_is_invalid() {
        let issuer = TokenIssuer::new(SECRET, 60);
        let token = issuer.issue_at(Principal::Doctor { id: 2 }, issued_at()).unwrap();
        let tampered = format!("{}x", token);
        let err = issuer.verify_at(&tampered, issued_at() + Duration::hours(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_login_request_accepts_numeric_username() {
        let request: LoginRequest = serde_json::from_str(r#"{"username": 12345, "password": "pw"}"#).unwrap();
        assert_eq!(request.username, "12345");
        let request: LoginRequest =
            serde_json::from_str(r#"{"username": "a@b.pt", "password": "pw"}"#).unwrap();
        assert_eq!(request.username, "a@b.pt");
    }
}
