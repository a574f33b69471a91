/// JWT Authentication Middleware
///
/// Validates the bearer token from the Authorization header, rejects tokens
/// that were logged out, and injects the claims plus the raw token into
/// request extensions for use by route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::AuthService;
use crate::error::{AppError, AuthError};

/// Raw bearer token of the current request, needed to blacklist it on logout
#[derive(Debug, Clone)]
pub struct AccessToken(pub String);

/// JWT middleware for protecting routes
pub struct JwtMiddleware {
    auth: AuthService,
}

impl JwtMiddleware {
    pub fn new(auth: AuthService) -> Self {
        Self { auth }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            auth: self.auth.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    auth: AuthService,
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let auth = self.auth.clone();

        Box::pin(async move {
            let token = match bearer_token(&req) {
                Some(token) => token,
                None => {
                    tracing::warn!(path = %req.path(), "Missing or invalid Authorization header");
                    return Err(AppError::from(AuthError::MissingToken).into());
                }
            };

            match auth.authenticate(&token).await {
                Ok(claims) => {
                    tracing::debug!(user_id = %claims.sub, role = claims.role.as_str(), "JWT validated successfully");
                    req.extensions_mut().insert(claims);
                    req.extensions_mut().insert(AccessToken(token));
                    service.call(req).await
                }
                Err(e @ AppError::Auth(_)) => {
                    tracing::warn!(error = %e, "JWT rejected");
                    Err(e.into())
                }
                Err(e) => {
                    tracing::error!(error = %e, "Token blacklist lookup failed");
                    Err(e.into())
                }
            }
        })
    }
}
