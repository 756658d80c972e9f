// Auth handlers
// Signup, login and logout pages backed by cookie sessions

use axum::{
    extract::{Form, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    app::AppState,
    auth::{self, Viewer},
    error::{AppError, AppResult},
    models::{LoginForm, SignupForm},
    templates::{render, LoggedOutTemplate, LoginTemplate, Nav, SignupTemplate},
};

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// GET /auth/signup/
pub async fn signup_form(Viewer(viewer): Viewer) -> AppResult<Html<String>> {
    render(&SignupTemplate {
        nav: Nav::new(viewer.as_ref()),
        username: String::new(),
        error: String::new(),
    })
}

/// Create an account and sign it in
/// POST /auth/signup/
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    let username = form.get_normalized_username();

    if let Err(message) = form.validate() {
        return signup_error(username, message);
    }

    let password_hash = auth::hash_password(&form.password1)?;
    let user = match state.store.create_user(&username, &password_hash).await {
        Ok(user) => user,
        Err(AppError::Conflict(message)) => return signup_error(username, message),
        Err(err) => return Err(err),
    };

    let token = state.store.create_session(user.id).await?;
    info!("Registered user {}", user.username);

    Ok((jar.add(auth::session_cookie(token)), Redirect::to("/")).into_response())
}

fn signup_error(username: String, error: String) -> AppResult<Response> {
    let html = render(&SignupTemplate {
        nav: Nav::default(),
        username,
        error,
    })?;
    Ok(html.into_response())
}

/// GET /auth/login/
pub async fn login_form(
    Viewer(viewer): Viewer,
    Query(query): Query<NextQuery>,
) -> AppResult<Html<String>> {
    render(&LoginTemplate {
        nav: Nav::new(viewer.as_ref()),
        username: String::new(),
        next: auth::safe_next(query.next.as_deref()).unwrap_or_default().to_string(),
        error: String::new(),
    })
}

/// Check credentials, open a session and follow `next`
/// POST /auth/login/
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let username = form.username.trim().to_string();
    let next = auth::safe_next(form.next.as_deref()).map(str::to_string);

    let user = state
        .store
        .get_user_by_username(&username)
        .await?
        .filter(|user| auth::verify_password(&form.password, &user.password_hash));

    let Some(user) = user else {
        warn!("Failed login attempt for {}", username);
        let html = render(&LoginTemplate {
            nav: Nav::default(),
            username,
            next: next.unwrap_or_default(),
            error: "Please enter a correct username and password".to_string(),
        })?;
        return Ok(html.into_response());
    };

    let token = state.store.create_session(user.id).await?;
    info!("User {} logged in", user.username);

    let target = next.unwrap_or_else(|| "/".to_string());
    Ok((jar.add(auth::session_cookie(token)), Redirect::to(&target)).into_response())
}

/// GET /auth/logout/
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> AppResult<Response> {
    if let Some(token) = auth::session_token(&jar) {
        state.store.delete_session(&token).await?;
        info!("Session closed");
    }

    let html = render(&LoggedOutTemplate { nav: Nav::default() })?;
    Ok((jar.remove(auth::removal_cookie()), html).into_response())
}
