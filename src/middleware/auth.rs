use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_CURATOR: &str = "curator";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

impl Claims {
    /// The subject as a user id.
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| Error::Unauthorized("invalid_subject".into()))
    }

    /// `None` for admins, who see every student; the curator's own id otherwise.
    pub fn curator_scope(&self) -> Result<Option<Uuid>> {
        if self.has_role(ROLE_ADMIN) {
            return Ok(None);
        }
        if self.has_role(ROLE_CURATOR) {
            return self.user_id().map(Some);
        }
        Err(Error::Forbidden("forbidden".into()))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role
            .as_deref()
            .map_or(false, |r| r.eq_ignore_ascii_case(role))
    }
}

fn reject(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

fn bearer_claims(req: &Request) -> std::result::Result<Claims, Response> {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return Err(reject(StatusCode::UNAUTHORIZED, "missing_authorization"));
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Err(reject(StatusCode::UNAUTHORIZED, "bad_authorization"));
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err(reject(StatusCode::UNAUTHORIZED, "unsupported_scheme"));
    };

    let config = crate::config::get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| reject(StatusCode::UNAUTHORIZED, "invalid_token"))
}

pub async fn require_roles(mut req: Request, next: Next, allowed: &[&str]) -> Response {
    let claims = match bearer_claims(&req) {
        Ok(claims) => claims,
        Err(response) => return response,
    };
    if !allowed.iter().any(|role| claims.has_role(role)) {
        return reject(StatusCode::FORBIDDEN, "forbidden");
    }
    req.extensions_mut().insert(claims);
    next.run(req).await
}

pub async fn require_curator(req: Request, next: Next) -> Response {
    require_roles(req, next, &[ROLE_CURATOR]).await
}

pub async fn require_admin_or_curator(req: Request, next: Next) -> Response {
    require_roles(req, next, &[ROLE_ADMIN, ROLE_CURATOR]).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_compare_case_insensitively() {
        let claims = Claims {
            sub: Uuid::nil().to_string(),
            exp: 0,
            role: Some("Curator".into()),
        };
        assert!(claims.has_role(ROLE_CURATOR));
        assert!(!claims.has_role(ROLE_ADMIN));
        assert_eq!(claims.user_id().unwrap(), Uuid::nil());
    }

    #[test]
    fn curators_are_scoped_to_themselves_and_admins_are_not() {
        let curator_id = Uuid::new_v4();
        let curator = Claims {
            sub: curator_id.to_string(),
            exp: 0,
            role: Some(ROLE_CURATOR.into()),
        };
        assert_eq!(curator.curator_scope().unwrap(), Some(curator_id));

        let admin = Claims {
            sub: "ops".into(),
            exp: 0,
            role: Some(ROLE_ADMIN.into()),
        };
        assert_eq!(admin.curator_scope().unwrap(), None);

        let student = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: 0,
            role: Some("student".into()),
        };
        assert!(matches!(student.curator_scope(), Err(Error::Forbidden(_))));
    }

    #[test]
    fn non_uuid_subject_is_unauthorized() {
        let claims = Claims {
            sub: "someone".into(),
            exp: 0,
            role: None,
        };
        assert!(matches!(claims.user_id(), Err(Error::Unauthorized(_))));
    }
}
