// src/services/auth.rs

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::{
    common::error::AppError,
    models::auth::{Actor, Claims},
};

/// Emite e valida os tokens HS256 dos operadores.
/// O login fica no sistema de identidade; aqui só conferimos a assinatura e as permissões.
#[derive(Clone)]
pub struct JwtService {
    jwt_secret: String,
    ttl: chrono::Duration,
}

impl JwtService {
    pub fn new(jwt_secret: String, ttl_minutes: i64) -> Self {
        Self {
            jwt_secret,
            ttl: chrono::Duration::try_minutes(ttl_minutes).unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<Actor, AppError> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!("Token rejeitado: {}", e);
            AppError::InvalidToken
        })?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(AppError::InvalidToken);
        }

        Ok(Actor::from(token_data.claims))
    }

    /// Usado pelas ferramentas de operação e pelos testes.
    pub fn issue_token(&self, actor_id: &str, permissions: &[&str]) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| anyhow::anyhow!("Validade do token fora do intervalo de datas"))?;

        let claims = Claims {
            sub: actor_id.to_string(),
            perms: permissions.iter().map(|p| p.to_string()).collect(),
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips_subject_and_permissions() {
        let service = JwtService::new("segredo-de-teste".into(), 5);
        let token = service.issue_token("ana", &["stock:read", "stock:write"]).unwrap();

        let actor = service.validate_token(&token).unwrap();

        assert_eq!(actor.id, "ana");
        assert!(actor.has_permission("stock:write"));
        assert!(!actor.has_permission("stock:count"));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let issuer = JwtService::new("outro-segredo".into(), 5);
        let token = issuer.issue_token("ana", &["stock:read"]).unwrap();

        let service = JwtService::new("segredo-de-teste".into(), 5);
        assert!(matches!(service.validate_token(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn huge_ttl_fails_instead_of_panicking() {
        let service = JwtService::new("segredo-de-teste".into(), i64::MAX);
        assert!(matches!(
            service.issue_token("ana", &["stock:read"]),
            Err(AppError::InternalServerError(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        // Validation::default() tolera 60s de leeway
        let service = JwtService::new("segredo-de-teste".into(), -10);
        let token = service.issue_token("ana", &["stock:read"]).unwrap();
        assert!(matches!(service.validate_token(&token), Err(AppError::InvalidToken)));
    }
}
