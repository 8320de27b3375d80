use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use url::Url;

use crate::database::Repository;
use crate::error::AppError;
use crate::routes::user::{CurrentUser, IdentityClaims, Profile, User};

pub const USERNAME_HEADER: &str = "x-authentik-username";
pub const NAME_HEADER: &str = "x-authentik-name";
pub const EMAIL_HEADER: &str = "x-authentik-email";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingClaim {
    Username,
    Email,
}

impl MissingClaim {
    /// 重定向地址上携带的错误码
    pub fn code(&self) -> &'static str {
        match self {
            MissingClaim::Username => "missing_username",
            MissingClaim::Email => "missing_email",
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// 身份网关：信任上游认证代理注入的请求头，首次访问时建立用户与资料
pub struct IdentityGateway {
    repo: Arc<dyn Repository>,
    logout_url: Url,
}

impl IdentityGateway {
    pub fn new(repo: Arc<dyn Repository>, logout_url: Url) -> Self {
        Self { repo, logout_url }
    }

    /// 用户名和邮箱必须同时存在，空白值视为缺失
    pub fn claims_from_headers(headers: &HeaderMap) -> Result<IdentityClaims, MissingClaim> {
        let username = header_value(headers, USERNAME_HEADER).ok_or(MissingClaim::Username)?;
        let email = header_value(headers, EMAIL_HEADER).ok_or(MissingClaim::Email)?;
        Ok(IdentityClaims {
            username: username.to_string(),
            email: email.to_string(),
            name: header_value(headers, NAME_HEADER).map(str::to_string),
        })
    }

    /// 重定向到登出地址，让用户重新认证
    pub fn rejection(&self, missing: MissingClaim) -> Response {
        let mut location = self.logout_url.clone();
        location.query_pairs_mut().append_pair("error", missing.code());
        (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
    }

    pub async fn provision(&self, claims: &IdentityClaims) -> Result<CurrentUser, AppError> {
        let repo = self.repo.as_ref();
        let user = User::find_or_create(repo, claims).await?;
        let profile = Profile::ensure_for(repo, &user, claims.name.as_deref()).await?;
        Ok(CurrentUser { user, profile })
    }

    pub async fn handle(self: Arc<Self>, mut req: Request<Body>, next: Next) -> Response {
        let claims = match Self::claims_from_headers(req.headers()) {
            Ok(claims) => claims,
            Err(missing) => {
                tracing::warn!(
                    "Rejecting {} {}: {}",
                    req.method(),
                    req.uri().path(),
                    missing.code()
                );
                return self.rejection(missing);
            }
        };

        match self.provision(&claims).await {
            Ok(current) => {
                tracing::debug!("Request authenticated as {}", current.user.username);
                req.extensions_mut().insert(current);
                next.run(req).await
            }
            Err(e) => e.into_response(),
        }
    }
}

pub async fn identity_gateway(
    State(gateway): State<Arc<IdentityGateway>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    gateway.handle(req, next).await
}
