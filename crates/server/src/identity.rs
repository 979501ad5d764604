//! Login gate in front of the intake API.
//!
//! OpenID Connect authorization-code flow against an Auth0 style provider:
//! - `/login` opens a server-side session holding `state` and `nonce`, then
//!   redirects to `{issuer}/authorize`
//! - `/callback` consumes the state once, exchanges the code at
//!   `{issuer}/oauth/token` and checks the id token claims before moving the
//!   session to a fresh id and marking it authenticated
//! - `/session` reports who is signed in
//! - `/logout` drops the session and redirects to `{issuer}/v2/logout`
//!
//! The browser only holds `session_id.signature`; the signature is an
//! HMAC-SHA256 of the session id keyed by `identity.session_secret`.
//! The id token arrives straight from the token endpoint over TLS, so its
//! claims are checked but its signature is not.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use intake_core::config::IdentityConfig;
use intake_db::repositories::{AuthSession, RepositoryError, SqlSessionRepository};
use intake_db::DbPool;

pub const SESSION_COOKIE: &str = "intake_session";

/// Longest a login may sit between `/login` and `/callback`.
const LOGIN_WINDOW_SECS: i64 = 600;
const MIN_SESSION_SECRET_LEN: usize = 32;
const POST_LOGIN_PATH: &str = "/session";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity.issuer_url is not configured")]
    MissingIssuer,
    #[error("identity.client_id is not configured")]
    MissingClientId,
    #[error("identity.client_secret is not configured")]
    MissingClientSecret,
    #[error("identity URL `{0}` is invalid")]
    InvalidUrl(String),
    #[error("identity.session_secret must be at least {MIN_SESSION_SECRET_LEN} characters")]
    WeakSessionSecret,
    #[error("identity http client could not be built: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Clone)]
pub struct IdentityState {
    inner: Arc<IdentityInner>,
}

struct IdentityInner {
    issuer: String,
    client_id: String,
    client_secret: SecretString,
    public_base_url: String,
    scope: String,
    session_ttl: Duration,
    secure_cookie: bool,
    signer: HmacSha256,
    sessions: SqlSessionRepository,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, client_id: &str) -> bool {
        match self {
            Self::One(value) => value == client_id,
            Self::Many(values) => values.iter().any(|value| value == client_id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: String,
    aud: Audience,
    exp: i64,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

#[derive(Debug, Serialize)]
struct IdentityErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct SessionView {
    subject: Option<String>,
    name: Option<String>,
    email: Option<String>,
    expires_at: String,
}

impl SessionView {
    fn from_session(session: &AuthSession) -> Self {
        let claims: Value = session
            .claims_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(Value::Null);
        let claim = |key: &str| claims.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            subject: claim("sub"),
            name: claim("name"),
            email: claim("email"),
            expires_at: session.expires_at.to_rfc3339(),
        }
    }
}

/// Rejection from one of the login endpoints.
#[derive(Debug)]
struct LoginFailure {
    status: StatusCode,
    message: &'static str,
}

impl LoginFailure {
    fn bad_request(message: &'static str) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message }
    }

    fn internal(error: RepositoryError) -> Self {
        error!(event_name = "identity.session.storage_error", error = %error, "session storage failed");
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: "Internal server error" }
    }
}

impl IntoResponse for LoginFailure {
    fn into_response(self) -> Response {
        (self.status, Json(IdentityErrorBody { error: self.message.to_string() })).into_response()
    }
}

impl IdentityState {
    pub fn from_config(config: &IdentityConfig, pool: DbPool) -> Result<Self, IdentityError> {
        let issuer = required(config.issuer_url.as_deref()).ok_or(IdentityError::MissingIssuer)?;
        let issuer = http_url(issuer)?;
        let client_id =
            required(config.client_id.as_deref()).ok_or(IdentityError::MissingClientId)?;
        let client_secret = config
            .client_secret
            .clone()
            .filter(|secret| !secret.expose_secret().trim().is_empty())
            .ok_or(IdentityError::MissingClientSecret)?;
        let public_base_url = http_url(&config.public_base_url)?;

        let secret = config.session_secret.expose_secret();
        if secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(IdentityError::WeakSessionSecret);
        }
        let signer = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| IdentityError::WeakSessionSecret)?;

        let client = Client::builder()
            .timeout(StdDuration::from_secs(10))
            .build()
            .map_err(IdentityError::Client)?;

        Ok(Self {
            inner: Arc::new(IdentityInner {
                secure_cookie: public_base_url.starts_with("https://"),
                issuer,
                client_id: client_id.to_string(),
                client_secret,
                public_base_url,
                scope: config.scope.clone(),
                session_ttl: Duration::seconds(config.session_ttl_secs.max(1) as i64),
                signer,
                sessions: SqlSessionRepository::new(pool),
                client,
            }),
        })
    }

    fn redirect_uri(&self) -> String {
        format!("{}/callback", self.inner.public_base_url)
    }

    fn sign(&self, session_id: &str) -> String {
        let mut mac = self.inner.signer.clone();
        mac.update(session_id.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    fn cookie_value(&self, session_id: &str) -> String {
        format!("{session_id}.{}", self.sign(session_id))
    }

    /// Returns the session id from a cookie value whose signature checks out.
    fn verify_cookie<'a>(&self, value: &'a str) -> Option<&'a str> {
        let (session_id, signature) = value.rsplit_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.inner.signer.clone();
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(session_id)
    }

    fn session_id_from(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| *name == SESSION_COOKIE)
            .find_map(|(_, value)| self.verify_cookie(value))
            .map(str::to_string)
    }

    fn set_cookie(&self, value: &str, max_age_secs: i64) -> Option<HeaderValue> {
        let secure = if self.inner.secure_cookie { "; Secure" } else { "" };
        HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}{secure}"
        ))
        .ok()
    }

    fn authorize_url(&self, state: &str, nonce: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}/authorize", self.inner.issuer))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.inner.client_id)
            .append_pair("redirect_uri", &self.redirect_uri())
            .append_pair("scope", &self.inner.scope)
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        Ok(url)
    }

    fn logout_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}/v2/logout", self.inner.issuer))?;
        url.query_pairs_mut()
            .append_pair("returnTo", &self.inner.public_base_url)
            .append_pair("client_id", &self.inner.client_id);
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, LoginFailure> {
        let response = self
            .inner
            .client
            .post(format!("{}/oauth/token", self.inner.issuer))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.inner.client_id.as_str()),
                ("client_secret", self.inner.client_secret.expose_secret()),
                ("redirect_uri", self.redirect_uri().as_str()),
            ])
            .send()
            .await
            .map_err(|error| {
                error!(event_name = "identity.token.request_failed", error = %error, "token exchange request failed");
                token_failure()
            })?;

        if !response.status().is_success() {
            warn!(
                event_name = "identity.token.rejected",
                status = %response.status(),
                "token endpoint rejected the authorization code"
            );
            return Err(token_failure());
        }

        response.json::<TokenResponse>().await.map_err(|error| {
            warn!(event_name = "identity.token.decode_failed", error = %error, "token response could not be decoded");
            token_failure()
        })
    }

    /// The session behind a validly signed cookie, if it is authenticated and
    /// unexpired.
    async fn authenticated_session(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<AuthSession>, RepositoryError> {
        let Some(session_id) = self.session_id_from(headers) else {
            return Ok(None);
        };
        let session = self.inner.sessions.find(&session_id).await?;
        Ok(session.filter(|session| session.is_authenticated(Utc::now())))
    }

    fn check_claims(&self, claims: &IdTokenClaims, expected_nonce: Option<&str>) -> bool {
        let issuer_matches =
            claims.iss.trim_end_matches('/') == self.inner.issuer.trim_end_matches('/');
        let nonce_matches = match (claims.nonce.as_deref(), expected_nonce) {
            (Some(actual), Some(expected)) => actual == expected,
            _ => false,
        };
        issuer_matches
            && nonce_matches
            && claims.aud.contains(&self.inner.client_id)
            && claims.exp > Utc::now().timestamp()
    }
}

pub fn router(state: IdentityState) -> Router {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", get(logout))
        .route("/session", get(current_session))
        .with_state(state)
}

/// Lets the request through only with a signed cookie for an authenticated,
/// unexpired session. Everyone else is sent to `/login`.
pub async fn require_session(
    State(identity): State<IdentityState>,
    request: Request,
    next: Next,
) -> Response {
    let session = identity.authenticated_session(request.headers()).await;
    match session {
        Ok(Some(_)) => next.run(request).await,
        Ok(None) => redirect("/login", None),
        Err(error) => LoginFailure::internal(error).into_response(),
    }
}

async fn current_session(State(identity): State<IdentityState>, headers: HeaderMap) -> Response {
    match identity.authenticated_session(&headers).await {
        Ok(Some(session)) => Json(SessionView::from_session(&session)).into_response(),
        Ok(None) => redirect("/login", None),
        Err(error) => LoginFailure::internal(error).into_response(),
    }
}

async fn login(State(identity): State<IdentityState>, headers: HeaderMap) -> Response {
    match start_login(&identity, &headers).await {
        Ok(response) => response,
        Err(failure) => failure.into_response(),
    }
}

async fn start_login(identity: &IdentityState, headers: &HeaderMap) -> Result<Response, LoginFailure> {
    let sessions = &identity.inner.sessions;
    let now = Utc::now();

    if let Some(previous) = identity.session_id_from(headers) {
        sessions.delete(&previous).await.map_err(LoginFailure::internal)?;
    }
    let purged = sessions.purge_expired(now).await.map_err(LoginFailure::internal)?;

    let session = AuthSession {
        id: random_token(),
        state_token: Some(random_token()),
        nonce: Some(random_token()),
        claims_json: None,
        created_at: now,
        expires_at: now + Duration::seconds(LOGIN_WINDOW_SECS),
    };
    sessions.create(&session).await.map_err(LoginFailure::internal)?;

    let (Some(state), Some(nonce)) = (session.state_token.as_deref(), session.nonce.as_deref())
    else {
        return Err(LoginFailure::bad_request("Invalid login state"));
    };
    let location = identity.authorize_url(state, nonce).map_err(|error| {
        error!(event_name = "identity.login.url_failed", error = %error, "authorize url could not be built");
        LoginFailure { status: StatusCode::INTERNAL_SERVER_ERROR, message: "Internal server error" }
    })?;

    info!(event_name = "identity.login.started", purged_sessions = purged, "login redirect issued");
    Ok(redirect(
        location.as_str(),
        identity.set_cookie(&identity.cookie_value(&session.id), LOGIN_WINDOW_SECS),
    ))
}

async fn callback(
    State(identity): State<IdentityState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    match finish_login(&identity, &headers, query).await {
        Ok(response) => response,
        Err(failure) => failure.into_response(),
    }
}

async fn finish_login(
    identity: &IdentityState,
    headers: &HeaderMap,
    query: CallbackQuery,
) -> Result<Response, LoginFailure> {
    if let Some(provider_error) = query.error {
        warn!(
            event_name = "identity.callback.provider_error",
            error = %provider_error,
            description = query.error_description.as_deref().unwrap_or("none"),
            "identity provider returned an error"
        );
        return Err(LoginFailure::bad_request("Identity provider returned an error"));
    }
    let code = query.code.ok_or(LoginFailure::bad_request("Authorization code missing"))?;
    let state = query.state.ok_or(LoginFailure::bad_request("Invalid login state"))?;
    let session_id =
        identity.session_id_from(headers).ok_or(LoginFailure::bad_request("Invalid login state"))?;

    let sessions = &identity.inner.sessions;
    let session = sessions
        .find(&session_id)
        .await
        .map_err(LoginFailure::internal)?
        .filter(|session| !session.is_expired(Utc::now()))
        .ok_or(LoginFailure::bad_request("Invalid login state"))?;

    if !sessions.consume_state(&session_id, &state).await.map_err(LoginFailure::internal)? {
        warn!(event_name = "identity.callback.state_mismatch", "callback state did not match session");
        return Err(LoginFailure::bad_request("Invalid login state"));
    }

    let tokens = identity.exchange_code(&code).await?;
    let raw_claims = decode_id_token(&tokens.id_token)
        .ok_or(LoginFailure::bad_request("Invalid identity token"))?;
    let claims: IdTokenClaims = serde_json::from_value(raw_claims.clone())
        .map_err(|_| LoginFailure::bad_request("Invalid identity token"))?;

    if !identity.check_claims(&claims, session.nonce.as_deref()) {
        warn!(event_name = "identity.callback.claims_rejected", "id token claims failed validation");
        return Err(LoginFailure::bad_request("Invalid identity token"));
    }

    let ttl = identity.inner.session_ttl;
    let authenticated_id = random_token();
    let promoted = sessions
        .promote(&session_id, &authenticated_id, &raw_claims.to_string(), Utc::now() + ttl)
        .await
        .map_err(LoginFailure::internal)?;
    if !promoted {
        return Err(LoginFailure::bad_request("Invalid login state"));
    }

    info!(
        event_name = "identity.login.completed",
        subject = claims.sub.as_deref().unwrap_or("unknown"),
        "session authenticated"
    );
    Ok(redirect(
        POST_LOGIN_PATH,
        identity.set_cookie(&identity.cookie_value(&authenticated_id), ttl.num_seconds()),
    ))
}

async fn logout(State(identity): State<IdentityState>, headers: HeaderMap) -> Response {
    if let Some(session_id) = identity.session_id_from(&headers) {
        if let Err(error) = identity.inner.sessions.delete(&session_id).await {
            return LoginFailure::internal(error).into_response();
        }
        info!(event_name = "identity.logout.completed", "session cleared");
    }

    match identity.logout_url() {
        Ok(location) => redirect(location.as_str(), identity.set_cookie("", 0)),
        Err(error) => {
            error!(event_name = "identity.logout.url_failed", error = %error, "logout url could not be built");
            redirect("/login", identity.set_cookie("", 0))
        }
    }
}

fn redirect(location: &str, cookie: Option<HeaderValue>) -> Response {
    let mut response = StatusCode::SEE_OTHER.into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    if let Some(cookie) = cookie {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

fn token_failure() -> LoginFailure {
    LoginFailure { status: StatusCode::BAD_GATEWAY, message: "Token exchange failed" }
}

fn decode_id_token(token: &str) -> Option<Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn random_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn http_url(raw: &str) -> Result<String, IdentityError> {
    let trimmed = raw.trim().trim_end_matches('/');
    match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(trimmed.to_string()),
        _ => Err(IdentityError::InvalidUrl(raw.to_string())),
    }
}
