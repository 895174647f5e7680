//! 访问控制
//!
//! [`Gate`] 作为 `FromRequestParts` 提取器运行，先于请求体解析；
//! 被拒绝的请求不会进入业务逻辑，也不会触及存储。

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use hospital_core::{HospitalError, Principal, PrincipalId, Result, Role};
use std::marker::PhantomData;
use tracing::{debug, warn};

use crate::auth::TokenIssuer;
use crate::response::ApiError;
use crate::state::AppState;

/// 已通过校验的会话
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub principal: Principal,
}

impl Session {
    /// 患者只能访问本人的记录，员工不受此限
    pub fn ensure_patient_self(&self, person_id: PrincipalId) -> Result<()> {
        match self.principal {
            Principal::Patient { cc } if cc != person_id => {
                warn!("{} tried to access records of {}", self.principal, person_id);
                Err(HospitalError::unauthorized("patients may only access their own records"))
            }
            _ => Ok(()),
        }
    }
}

/// 去掉 `Bearer` 前缀（大小写不敏感）；不带前缀时原样返回
fn strip_scheme(raw: &str) -> &str {
    let raw = raw.trim_start();
    match raw.get(..6) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer") => {
            let rest = &raw[6..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                rest
            } else {
                raw
            }
        }
        _ => raw,
    }
}

/// 校验 `Authorization` 头并检查角色
///
/// 接受 `Bearer <token>` 或裸令牌。
pub fn admit(tokens: &TokenIssuer, header: Option<&str>, allowed: &[Role]) -> Result<Session> {
    let token = strip_scheme(header.unwrap_or_default()).trim();
    if token.is_empty() {
        return Err(HospitalError::MissingCredential);
    }

    let principal = tokens.verify(token)?;
    if !allowed.contains(&principal.role()) {
        warn!("{} is not allowed here", principal);
        return Err(HospitalError::unauthorized(format!(
            "role {} is not allowed to perform this operation",
            principal.role()
        )));
    }

    debug!("Admitted {}", principal);
    Ok(Session { principal })
}

/// 端点允许的角色集合
pub trait Policy: Send + Sync + 'static {
    const ROLES: &'static [Role];
}

pub struct PatientOnly;
pub struct AssistantOnly;
pub struct AssistantOrPatient;
pub struct AnyPrincipal;

impl Policy for PatientOnly {
    const ROLES: &'static [Role] = &[Role::Patient];
}

impl Policy for AssistantOnly {
    const ROLES: &'static [Role] = &[Role::Assistant];
}

impl Policy for AssistantOrPatient {
    const ROLES: &'static [Role] = &[Role::Assistant, Role::Patient];
}

impl Policy for AnyPrincipal {
    const ROLES: &'static [Role] = &[Role::Assistant, Role::Nurse, Role::Doctor, Role::Patient];
}

/// 按策略 `P` 放行的请求
pub struct Gate<P> {
    pub session: Session,
    _policy: PhantomData<P>,
}

#[async_trait]
impl<P: Policy> FromRequestParts<AppState> for Gate<P> {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> std::result::Result<Self, Self::Rejection> {
        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| HospitalError::InvalidToken("authorization header is not valid text".into()))?,
            ),
            None => None,
        };

        let session = admit(&state.tokens, header, P::ROLES)?;
        Ok(Gate {
            session,
            _policy: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hospital_core::ErrorKind;

    const SECRET: &str = "gate-secret-gate-secret-gate-secret!";

    #[test]
    fn test_missing_header() {
        let tokens = TokenIssuer::new(SECRET, 900);
        assert_eq!(admit(&tokens, None, PatientOnly::ROLES).unwrap_err().kind(), ErrorKind::MissingCredential);
        assert_eq!(admit(&tokens, Some("  "), PatientOnly::ROLES).unwrap_err().kind(), ErrorKind::MissingCredential);
        assert_eq!(admit(&tokens, Some("Bearer "), PatientOnly::ROLES).unwrap_err().kind(), ErrorKind::MissingCredential);
        assert_eq!(admit(&tokens, Some("Bearer"), PatientOnly::ROLES).unwrap_err().kind(), ErrorKind::MissingCredential);
        assert_eq!(admit(&tokens, Some("bearer   "), PatientOnly::ROLES).unwrap_err().kind(), ErrorKind::MissingCredential);
        assert_eq!(admit(&tokens, Some("BEARER\t"), PatientOnly::ROLES).unwrap_err().kind(), ErrorKind::MissingCredential);
    }

    #[test]
    fn test_bearer_and_bare_tokens() {
        let tokens = TokenIssuer::new(SECRET, 900);
        let token = tokens.issue(Principal::Patient { cc: 9 }).unwrap();

        let session = admit(&tokens, Some(&token), PatientOnly::ROLES).unwrap();
        assert_eq!(session.principal, Principal::Patient { cc: 9 });

        let header = format!("Bearer {}", token);
        assert!(admit(&tokens, Some(&header), AssistantOrPatient::ROLES).is_ok());
        let header = format!("bearer  {} ", token);
        assert!(admit(&tokens, Some(&header), AssistantOrPatient::ROLES).is_ok());
    }

    #[test]
    fn test_role_outside_policy() {
        let tokens = TokenIssuer::new(SECRET, 900);
        let token = tokens.issue(Principal::Nurse { id: 3 }).unwrap();
        let err = admit(&tokens, Some(&token), AssistantOnly::ROLES).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(admit(&tokens, Some(&token), AnyPrincipal::ROLES).is_ok());
    }

    #[test]
    fn test_invalid_token() {
        let tokens = TokenIssuer::new(SECRET, 900);
        assert_eq!(admit(&tokens, Some("garbage"), PatientOnly::ROLES).unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_patient_self_check() {
        let patient = Session { principal: Principal::Patient { cc: 1 } };
        assert!(patient.ensure_patient_self(1).is_ok());
        assert_eq!(patient.ensure_patient_self(2).unwrap_err().kind(), ErrorKind::Unauthorized);

        let assistant = Session { principal: Principal::Assistant { id: 1 } };
        assert!(assistant.ensure_patient_self(2).is_ok());
    }
}
