//! Caller identity as asserted by the upstream session layer.
//!
//! The daemon does not manage sessions. A gateway in front of it resolves the
//! session cookie and forwards `x-user-id` / `x-user-role`. A missing or
//! malformed `x-user-id` means "not logged in"; handlers decide what that
//! costs.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use shop_checkout::UserId;

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_ROLE: &str = "x-user-role";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Caller {
    pub user: Option<UserId>,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.user.is_some() && self.role == Role::Admin
    }
}

fn parse_user_id(raw: &str) -> Option<UserId> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .map(UserId)
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_role(raw: &str) -> Role {
    if raw.trim().eq_ignore_ascii_case("admin") {
        Role::Admin
    } else {
        Role::Customer
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller {
            user: header_str(parts, HEADER_USER_ID).and_then(parse_user_id),
            role: header_str(parts, HEADER_USER_ROLE)
                .map(parse_role)
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_must_be_a_positive_integer() {
        assert_eq!(parse_user_id("42"), Some(UserId(42)));
        assert_eq!(parse_user_id(" 7 "), Some(UserId(7)));
        assert_eq!(parse_user_id("0"), None);
        assert_eq!(parse_user_id("-3"), None);
        assert_eq!(parse_user_id("alice"), None);
    }

    #[test]
    fn admin_requires_an_identity() {
        let anon_admin = Caller {
            user: None,
            role: Role::Admin,
        };
        assert!(!anon_admin.is_admin());
        assert_eq!(parse_role("ADMIN"), Role::Admin);
        assert_eq!(parse_role("cliente"), Role::Customer);
    }
}
