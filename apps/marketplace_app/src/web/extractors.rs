// apps/marketplace_app/src/web/extractors.rs

use actix_web::{FromRequest, HttpRequest};
use tracing::warn;
use tradeflow::{Actor, Role};

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Caller identity as asserted by the auth gateway in front of this service.
#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub Actor);

impl AuthenticatedActor {
  pub fn actor(&self) -> &Actor {
    &self.0
  }
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
  req
    .headers()
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
}

impl FromRequest for AuthenticatedActor {
  type Error = AppError;
  type Future = futures_util::future::Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    let Some(user_id) = header(req, USER_ID_HEADER) else {
      warn!("AuthenticatedActor extractor: Missing X-User-ID header.");
      return futures_util::future::ready(Err(AppError::Auth(
        "User authentication required. Missing X-User-ID header.".to_string(),
      )));
    };
    let role = match header(req, USER_ROLE_HEADER).map(str::to_ascii_lowercase).as_deref() {
      None | Some("member") | Some("user") => Role::Member,
      Some("admin") => Role::Admin,
      Some(other) => {
        warn!(role = other, "AuthenticatedActor extractor: Unknown role.");
        return futures_util::future::ready(Err(AppError::Auth(format!("Unknown role '{other}'"))));
      }
    };
    futures_util::future::ready(Ok(AuthenticatedActor(Actor {
      user_id: user_id.to_string(),
      role,
    })))
  }
}
