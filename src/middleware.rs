//! HTTP middleware: per-request routing scope and read-your-writes pinning cookie.
//!
//! `pin_writes` opens a fresh routing scope for every request and pushes the initial state:
//!
//! 1. a valid force-state header (`X-Replicated-State: master|slave` by default),
//! 2. the first matching path override,
//! 3. master when the pin cookie is present,
//! 4. slave for read-only methods, master for everything else.
//!
//! On the way out, a master request that wrote gets the pin cookie with `Max-Age` set to the pin
//! window, so the client's next requests (including the GET after a redirect) read from the
//! primary until the cookie expires.

use crate::config::RouterConfig;
use crate::error::AppError;
use crate::router::ReplicaRouter;
use crate::routing::{self, RoutingState};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Attach to a response (`Extension(PerformedWrite)`) to mark that the handler wrote data.
#[derive(Clone, Copy, Debug, Default)]
pub struct PerformedWrite;

#[derive(Clone, Debug)]
pub struct PinSettings {
    pub cookie_name: String,
    pub cookie_value: String,
    pub window_seconds: u64,
    pub force_state_header: Option<HeaderName>,
    pub check_primary_writable: bool,
}

impl PinSettings {
    /// Config is validated before this runs; an unparsable header name is dropped.
    pub fn from_config(config: &RouterConfig) -> Self {
        PinSettings {
            cookie_name: config.pin_cookie_name.clone(),
            cookie_value: config.pin_cookie_value.clone(),
            window_seconds: config.pin_window_seconds,
            force_state_header: config
                .force_state_header
                .as_deref()
                .and_then(|h| HeaderName::from_bytes(h.as_bytes()).ok()),
            check_primary_writable: config.check_primary_writable,
        }
    }

    pub fn set_cookie_value(&self) -> String {
        format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name, self.cookie_value, self.window_seconds
        )
    }
}

/// State for the pinning middleware.
#[derive(Clone)]
pub struct Pinning {
    pub router: Arc<ReplicaRouter>,
    pub settings: Arc<PinSettings>,
}

impl Pinning {
    pub fn new(router: Arc<ReplicaRouter>, settings: PinSettings) -> Self {
        Pinning {
            router,
            settings: Arc::new(settings),
        }
    }

    /// Initial routing state for a request and the rule that decided it.
    pub fn initial_state(&self, method: &Method, path: &str, headers: &HeaderMap) -> (RoutingState, &'static str) {
        if let Some(forced) = self.forced_state(headers) {
            return (forced, "header");
        }
        if let Some(state) = self.router.topology().override_for_path(path) {
            return (state, "path_override");
        }
        if has_cookie(headers, &self.settings.cookie_name) {
            return (RoutingState::Master, "pin_cookie");
        }
        if is_read_only_method(method) {
            (RoutingState::Slave, "method")
        } else {
            (RoutingState::Master, "method")
        }
    }

    fn forced_state(&self, headers: &HeaderMap) -> Option<RoutingState> {
        let name = self.settings.force_state_header.as_ref()?;
        let raw = headers.get(name)?.to_str().ok()?;
        match raw.parse() {
            Ok(state) => Some(state),
            Err(_) => {
                tracing::debug!(header = %name, value = raw, "ignoring invalid forced routing state");
                None
            }
        }
    }
}

/// GET, HEAD, OPTIONS and TRACE do not write.
pub fn is_read_only_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

/// Whether any `Cookie` header carries `name`.
pub fn has_cookie(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(k, _)| k.trim() == name)
}

pub async fn pin_writes(State(pinning): State<Pinning>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let (state, reason) = pinning.initial_state(&method, request.uri().path(), request.headers());
    let request_id = Uuid::new_v4();
    let span = tracing::debug_span!("routing", %request_id, %state, reason);

    let router = pinning.router.clone();
    let (mut response, wrote_in_scope) = routing::scope(async move {
        let _guard = router.use_state(state);
        let response = next.run(request).await;
        let wrote = router.wrote_in_scope();
        (response, wrote)
    })
    .instrument(span)
    .await;

    // a 5xx from a writing method (e.g. rejected by `reject_writes_when_read_only`) wrote nothing
    let wrote = (!is_read_only_method(&method) && !response.status().is_server_error())
        || wrote_in_scope
        || response.extensions().get::<PerformedWrite>().is_some();
    if state == RoutingState::Master && wrote {
        match HeaderValue::from_str(&pinning.settings.set_cookie_value()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
                tracing::debug!(%request_id, window = pinning.settings.window_seconds, "reads pinned to primary");
            }
            Err(e) => tracing::warn!(error = %e, "invalid pin cookie, not set"),
        }
    }
    response
}

/// Answers 503 to writes while the primary is unreachable or read-only. Only active when
/// `check_primary_writable` is set.
pub async fn reject_writes_when_read_only(State(pinning): State<Pinning>, request: Request, next: Next) -> Response {
    if pinning.settings.check_primary_writable
        && !is_read_only_method(request.method())
        && !pinning.router.is_primary_writable().await
    {
        let primary = pinning.router.primary().name.clone();
        tracing::warn!(%primary, method = %request.method(), path = request.uri().path(), "write rejected, primary not writable");
        return AppError::Unavailable(format!("primary '{}' is read-only or unreachable", primary)).into_response();
    }
    next.run(request).await
}

/// Wrap `app` with both middlewares; `pin_writes` runs outermost.
pub fn with_pinning<S>(app: axum::Router<S>, pinning: Pinning) -> axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    app.layer(axum::middleware::from_fn_with_state(pinning.clone(), reject_writes_when_read_only))
        .layer(axum::middleware::from_fn_with_state(pinning, pin_writes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, DatabaseConfig, StateOverrideConfig};
    use crate::liveness::{LivenessProber, ProbeSettings};
    use crate::pools::{DatabasePools, PgProbe};

    fn pinning() -> Pinning {
        let mut config = RouterConfig::new(
            DatabaseConfig { name: "p".into(), url: "postgres://p/app".into() },
            vec![DatabaseConfig { name: "r1".into(), url: "postgres://r1/app".into() }],
        );
        config.state_overrides.push(StateOverrideConfig {
            path_pattern: "^/reports/".into(),
            state: RoutingState::Slave,
        });
        let probe = Arc::new(PgProbe::new(DatabasePools::from_pools(Vec::new())));
        let prober = Arc::new(LivenessProber::new(probe, ProbeSettings::default()));
        let router = Arc::new(ReplicaRouter::new(resolve(&config).unwrap(), prober));
        Pinning::new(router, PinSettings::from_config(&config))
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(HeaderName::from_bytes(k.as_bytes()).unwrap(), HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn test_read_only_methods() {
        assert!(is_read_only_method(&Method::GET));
        assert!(is_read_only_method(&Method::TRACE));
        assert!(!is_read_only_method(&Method::POST));
        assert!(!is_read_only_method(&Method::PATCH));
    }

    #[test]
    fn test_has_cookie() {
        let h = headers(&[("cookie", "session=abc; pin_writes=y"), ("cookie", "theme=dark")]);
        assert!(has_cookie(&h, "pin_writes"));
        assert!(has_cookie(&h, "theme"));
        assert!(!has_cookie(&h, "pin"));
        assert!(!has_cookie(&HeaderMap::new(), "pin_writes"));
    }

    #[test]
    fn test_initial_state_by_method() {
        let p = pinning();
        assert_eq!(p.initial_state(&Method::GET, "/items", &HeaderMap::new()).0, RoutingState::Slave);
        assert_eq!(p.initial_state(&Method::DELETE, "/items/1", &HeaderMap::new()).0, RoutingState::Master);
    }

    #[test]
    fn test_initial_state_precedence() {
        let p = pinning();
        let cookie = headers(&[("cookie", "pin_writes=y")]);
        assert_eq!(p.initial_state(&Method::GET, "/items", &cookie), (RoutingState::Master, "pin_cookie"));
        assert_eq!(p.initial_state(&Method::GET, "/reports/daily", &cookie), (RoutingState::Slave, "path_override"));

        let forced = headers(&[("cookie", "pin_writes=y"), ("x-replicated-state", "slave")]);
        assert_eq!(p.initial_state(&Method::GET, "/items", &forced), (RoutingState::Slave, "header"));

        let bogus = headers(&[("x-replicated-state", "leader")]);
        assert_eq!(p.initial_state(&Method::GET, "/items", &bogus), (RoutingState::Slave, "method"));
    }

    #[test]
    fn test_set_cookie_value() {
        let p = pinning();
        assert_eq!(
            p.settings.set_cookie_value(),
            "pin_writes=y; Max-Age=15; Path=/; HttpOnly; SameSite=Lax"
        );
    }
}
