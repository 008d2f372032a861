use anyhow::{anyhow, Result};
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::error::PipelineError;

const TOKEN_ISSUER: &str = "vigia";
const TOKEN_AUDIENCE: &str = "vigia";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Citizen,
    Reviewer,
    Admin,
}

impl Role {
    pub fn from_claim(value: &str) -> Option<Self> {
        match value {
            "citizen" => Some(Self::Citizen),
            "reviewer" => Some(Self::Reviewer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_claim(&self) -> &'static str {
        match self {
            Self::Citizen => "citizen",
            Self::Reviewer => "reviewer",
            Self::Admin => "admin",
        }
    }

    pub fn can_review(&self) -> bool {
        matches!(self, Self::Reviewer | Self::Admin)
    }
}

/// Authenticated identity attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn require_reviewer(&self) -> Result<(), PipelineError> {
        if self.role.can_review() {
            Ok(())
        } else {
            Err(PipelineError::Authorization(
                "reviewer role required".to_string(),
            ))
        }
    }
}

/// Verifies session tokens minted by the account service. Issuance is
/// kept here for operator tooling and tests that share the same key.
#[derive(Clone)]
pub struct AuthService {
    access_key: [u8; 32],
    access_ttl_minutes: u64,
}

impl AuthService {
    pub fn new(access_key: [u8; 32], access_ttl_minutes: u64) -> Self {
        Self {
            access_key,
            access_ttl_minutes,
        }
    }

    pub fn authenticate_access_token(&self, token: &str) -> Result<Option<Caller>> {
        let claims = match self.decrypt_claims(token)? {
            Some(claims) => claims,
            None => return Ok(None),
        };
        if claim_str(&claims, "typ") != Some("access") {
            return Ok(None);
        }
        let user_id = match claim_str(&claims, "sub").and_then(|v| Uuid::parse_str(v).ok()) {
            Some(user_id) => user_id,
            None => return Ok(None),
        };
        let role = match claim_str(&claims, "role").and_then(Role::from_claim) {
            Some(role) => role,
            None => return Ok(None),
        };
        Ok(Some(Caller { user_id, role }))
    }

    pub fn issue_access_token(&self, user_id: Uuid, role: Role) -> Result<String> {
        let duration = std::time::Duration::from_secs(self.access_ttl_minutes * 60);
        let mut claims = Claims::new_expires_in(&duration)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_AUDIENCE)?;
        claims.subject(&user_id.to_string())?;
        claims.add_additional("typ", "access")?;
        claims.add_additional("role", role.as_claim())?;

        let key = SymmetricKey::<V4>::from(&self.access_key)?;
        local::encrypt(&key, &claims, None, None)
            .map_err(|err| anyhow!("failed to encrypt token: {}", err))
    }

    fn decrypt_claims(&self, token: &str) -> Result<Option<Claims>> {
        let key = SymmetricKey::<V4>::from(&self.access_key)?;
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_AUDIENCE);

        let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        Ok(trusted.payload_claims().cloned())
    }
}

fn claim_str<'a>(claims: &'a Claims, name: &str) -> Option<&'a str> {
    claims.get_claim(name).and_then(|value| value.as_str())
}
