use crate::core::error::{Error, Result};
use axum::{extract::FromRequestParts, http::request::Parts};

/// Authenticated caller, keyed by the identity provider's subject.
#[derive(Clone, Debug)]
pub struct Ctx {
    subject: String,
}

impl Ctx {
    pub fn new(subject: String) -> Self {
        Self { subject }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Ctx>()
            .cloned()
            .ok_or(Error::AuthFailCtxNotInRequestExt)
    }
}

/// Like [`Ctx`], but lets anonymous requests through.
#[derive(Clone, Debug)]
pub struct MaybeCtx(pub Option<Ctx>);

impl<S> FromRequestParts<S> for MaybeCtx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        Ok(MaybeCtx(parts.extensions.get::<Ctx>().cloned()))
    }
}
