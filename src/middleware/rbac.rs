// src/middleware/rbac.rs

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::marker::PhantomData;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::auth::Actor,
};

/// 1. O Trait que define o que é uma Permissão
pub trait PermissionDef: Send + Sync + 'static {
    fn slug() -> &'static str;
}

/// 2. O Extractor (Guardião)
pub struct RequirePermission<T>(pub PhantomData<T>);

// 3. Implementação do FromRequestParts
// As permissões vêm no próprio token (claim "perms"), sem ida ao banco.
impl<T, S> FromRequestParts<S> for RequirePermission<T>
where
    T: PermissionDef,
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let locale = Locale::from_headers(&parts.headers);

        let Some(actor) = parts.extensions.get::<Actor>() else {
            return Err(AppError::InvalidToken.to_api_error(&locale, &app_state.i18n_store));
        };

        let required_perm = T::slug();
        if !actor.has_permission(required_perm) {
            tracing::warn!(actor = %actor.id, permission = required_perm, "⛔ Acesso negado");
            return Err(AppError::MissingPermission(required_perm)
                .to_api_error(&locale, &app_state.i18n_store));
        }

        Ok(RequirePermission(PhantomData))
    }
}

// ---
// DEFINIÇÃO DAS PERMISSÕES (TIPOS)
// ---

pub struct PermStockRead;
impl PermissionDef for PermStockRead {
    fn slug() -> &'static str { "stock:read" }
}

pub struct PermStockWrite;
impl PermissionDef for PermStockWrite {
    fn slug() -> &'static str { "stock:write" }
}

// Contagem física (inventário)
pub struct PermStockCount;
impl PermissionDef for PermStockCount {
    fn slug() -> &'static str { "stock:count" }
}
