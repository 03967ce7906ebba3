//! Session introspection for the frontend.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{Map, Value, json};

use authgate_auth::refresh::SessionLookup;
use authgate_auth::session::SessionRecord;

use crate::cookies::{clear_session_cookie, external_origin};
use crate::state::AppState;

/// Claims exposed to the frontend. Everything else the IdP returned stays
/// server-side.
const USER_CLAIMS: [&str; 6] = [
    "name",
    "given_name",
    "family_name",
    "preferred_username",
    "email",
    "email_verified",
];

pub async fn handle_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let config = &state.config;
    let (proto, _) = external_origin(config, &headers);
    let secure = proto == "https";

    let cookie_value = jar
        .get(&config.session_cookie)
        .map(|cookie| cookie.value().to_owned());

    let mut session = match state.refresh.resolve(cookie_value.as_deref()).await {
        SessionLookup::Authenticated(session) => session,
        SessionLookup::Unauthenticated(reason) => {
            let jar = jar.add(clear_session_cookie(config, secure));
            return (
                StatusCode::UNAUTHORIZED,
                jar,
                axum::Json(json!({
                    "authenticated": false,
                    "reason": reason.as_str(),
                })),
            )
                .into_response();
        }
    };

    // Populate cached claims lazily when the callback could not fetch them.
    if session.user_info.is_null() {
        match state.oidc.fetch_userinfo(&session.tokens.access_token).await {
            Ok(claims) => {
                if let Some(updated) = state.sessions.update_user_info(&session.id, claims) {
                    session = updated;
                }
            }
            Err(e) => {
                tracing::debug!(session_id = %session.id, error = %e, "Userinfo still unavailable");
            }
        }
    }

    axum::Json(json!({
        "authenticated": true,
        "user": user_payload(&session),
        "session": {
            "expiresAt": session.expires_at,
            "accessTokenExpiresAt": session.tokens.expires_at,
        },
    }))
    .into_response()
}

fn user_payload(session: &SessionRecord) -> Value {
    let mut user = Map::new();
    let sub = session
        .user_info
        .get("sub")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| session.subject.clone());
    if let Some(sub) = sub {
        user.insert("sub".into(), Value::String(sub));
    }
    for claim in USER_CLAIMS {
        if let Some(value) = session.user_info.get(claim) {
            user.insert(claim.into(), value.clone());
        }
    }
    Value::Object(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use authgate_auth::now_unix_ms;
    use authgate_auth::tokens::SessionTokens;

    fn record(user_info: Value, subject: Option<&str>) -> SessionRecord {
        SessionRecord {
            id: "s1".into(),
            subject: subject.map(str::to_owned),
            tokens: SessionTokens {
                access_token: "at".into(),
                refresh_token: None,
                id_token: None,
                token_type: None,
                expires_at: None,
                scope: None,
            },
            user_info,
            created_at: now_unix_ms(),
            updated_at: now_unix_ms(),
            expires_at: now_unix_ms() + 1000,
        }
    }

    #[test]
    fn test_user_payload_picks_known_claims() {
        let info = json!({
            "sub": "alice",
            "email": "alice@example.com",
            "email_verified": true,
            "roles": ["admin"]
        });
        let payload = user_payload(&record(info, None));
        assert_eq!(payload["sub"], "alice");
        assert_eq!(payload["email"], "alice@example.com");
        assert_eq!(payload["email_verified"], true);
        assert!(payload.get("roles").is_none());
    }

    #[test]
    fn test_user_payload_falls_back_to_subject() {
        let payload = user_payload(&record(Value::Null, Some("bob")));
        assert_eq!(payload["sub"], "bob");
    }
}
