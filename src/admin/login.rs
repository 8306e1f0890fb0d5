//! POST /admin/login

use std::sync::Arc;

use axum::{extract::State, Form, Json};
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::error::{Error, Result};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

pub async fn login(State(state): State<Arc<AppState>>, Form(form): Form<LoginForm>) -> Result<Json<TokenResponse>> {
    if !auth::verify_admin_credentials(&state.config, &form.username, &form.password) {
        return Err(Error::Unauthorized("invalid username or password".to_string()));
    }

    let access_token = auth::issue_admin_token(&state.config)?;
    Ok(Json(TokenResponse { access_token, token_type: "bearer" }))
}
