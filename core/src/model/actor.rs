// core/src/model/actor.rs

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Member,
  Admin,
}

/// Verified caller identity, supplied by the external auth layer.
/// Whether a member acts as buyer or seller is decided per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub user_id: String,
  pub role: Role,
}

impl Actor {
  pub fn member(user_id: impl Into<String>) -> Self {
    Actor {
      user_id: user_id.into(),
      role: Role::Member,
    }
  }

  pub fn admin(user_id: impl Into<String>) -> Self {
    Actor {
      user_id: user_id.into(),
      role: Role::Admin,
    }
  }

  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }
}

/// Side of a trade that can receive a token reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
  Buyer,
  Seller,
}

impl Party {
  pub const BOTH: [Party; 2] = [Party::Buyer, Party::Seller];

  pub fn as_str(&self) -> &'static str {
    match self {
      Party::Buyer => "buyer",
      Party::Seller => "seller",
    }
  }
}

impl fmt::Display for Party {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
