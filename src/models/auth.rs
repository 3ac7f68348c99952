// src/models/auth.rs

use serde::{Deserialize, Serialize};

// Estrutura de dados ("claims") dentro do JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // Subject (ID do operador)
    #[serde(default)]
    pub perms: Vec<String>, // Permissões concedidas (ex: "stock:write")
    pub exp: usize,         // Expiration time (quando o token expira)
    pub iat: usize,         // Issued At (quando o token foi criado)
}

// O operador autenticado, extraído do token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub permissions: Vec<String>,
}

impl Actor {
    pub fn has_permission(&self, slug: &str) -> bool {
        self.permissions.iter().any(|p| p == slug)
    }
}

impl From<Claims> for Actor {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            permissions: claims.perms,
        }
    }
}
