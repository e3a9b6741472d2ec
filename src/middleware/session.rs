//! Cookie-keyed sessions backed by a [`SessionStore`].
//!
//! The browser only ever holds an opaque id. Two cookies travel with it:
//! `<name>` carries the id and `<name>.sig` an HMAC-SHA256 over
//! `"<name>=<id>"`, so a forged or edited id is ignored and the request
//! starts a fresh session instead.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cookie::Cookie;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use super::{BoxFuture, Middleware, Next, Outcome};
use crate::context::Context;
use crate::error::{Error, HttpError};
use crate::request::Request;
use crate::store::{SessionData, SessionStore};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_COOKIE: &str = "strata:sess";

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

// ── Keys ──────────────────────────────────────────────────────────────────────

/// Rotating signing keys. New signatures use the first key; any key verifies.
#[derive(Clone)]
pub struct Keys {
    macs: Vec<HmacSha256>,
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys").field("count", &self.macs.len()).finish()
    }
}

impl Keys {
    pub fn new<I, K>(keys: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let macs = keys
            .into_iter()
            .map(|k| HmacSha256::new_from_slice(k.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::Config { key: "APP_KEYS".to_owned(), reason: e.to_string() })?;
        if macs.is_empty() {
            return Err(Error::Config {
                key: "APP_KEYS".to_owned(),
                reason: "at least one signing key is required".to_owned(),
            });
        }
        Ok(Self { macs })
    }

    pub fn sign(&self, data: &str) -> String {
        let mut mac = self.macs[0].clone();
        mac.update(data.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, data: &str, signature: &str) -> bool {
        let Ok(raw) = URL_SAFE_NO_PAD.decode(signature) else { return false };
        self.macs.iter().any(|mac| {
            let mut mac = mac.clone();
            mac.update(data.as_bytes());
            mac.verify_slice(&raw).is_ok()
        })
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One request's view of its session.
#[derive(Clone, Debug, Default)]
pub struct Session {
    id: Option<String>,
    data: SessionData,
    loaded: SessionData,
    destroyed: bool,
}

impl Session {
    fn fresh() -> Self {
        Self::default()
    }

    fn existing(id: String, data: SessionData) -> Self {
        Self { id: Some(id), loaded: data.clone(), data, destroyed: false }
    }

    /// Store key, once the session has been persisted.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// No cookie referred to a stored session.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.destroyed = false;
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Drops the session from the store and expires the cookie.
    pub fn destroy(&mut self) {
        self.data.clear();
        self.destroyed = true;
    }

    pub(crate) fn changed(&self) -> bool {
        self.data != self.loaded
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────────

/// Loads the session before downstream runs and commits it afterwards,
/// whether downstream succeeded or not.
#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn SessionStore>,
    keys: Keys,
    cookie: String,
    max_age: Duration,
}

impl Sessions {
    pub fn new(store: Arc<dyn SessionStore>, keys: Keys) -> Self {
        Self { store, keys, cookie: DEFAULT_COOKIE.to_owned(), max_age: DEFAULT_MAX_AGE }
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie = name.into();
        self
    }

    /// Lifetime of both the stored payload and the cookie.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    fn signature_cookie(&self) -> String {
        format!("{}.sig", self.cookie)
    }

    async fn load(&self, req: &Request) -> Result<Session, HttpError> {
        let Some(id) = req.cookie(&self.cookie) else {
            return Ok(Session::fresh());
        };
        let signed = req
            .cookie(&self.signature_cookie())
            .is_some_and(|sig| self.keys.verify(&format!("{}={id}", self.cookie), &sig));
        if !signed {
            debug!(cookie = %self.cookie, "session signature mismatch, starting fresh");
            return Ok(Session::fresh());
        }
        Ok(match self.store.get(&id).await? {
            Some(data) => Session::existing(id, data),
            None => Session::fresh(),
        })
    }

    async fn commit(&self, ctx: &mut Context) -> Outcome {
        let Some(session) = ctx.take_session() else { return Ok(()) };

        if session.destroyed || (session.is_empty() && session.changed()) {
            if let Some(id) = &session.id {
                self.store.destroy(id).await?;
                self.write_cookies(ctx, "", Duration::ZERO);
                debug!("session destroyed");
            }
            return Ok(());
        }
        if !session.changed() {
            return Ok(());
        }

        let id = session.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        self.store.set(&id, &session.data, self.max_age).await?;
        self.write_cookies(ctx, &id, self.max_age);
        Ok(())
    }

    fn write_cookies(&self, ctx: &mut Context, id: &str, max_age: Duration) {
        let signature = if id.is_empty() {
            String::new()
        } else {
            self.keys.sign(&format!("{}={id}", self.cookie))
        };
        let res = ctx.response_mut();
        for (name, value) in [(self.cookie.clone(), id.to_owned()), (self.signature_cookie(), signature)] {
            let cookie = Cookie::build((name, value))
                .path("/")
                .http_only(true)
                .max_age(cookie::time::Duration::seconds(max_age.as_secs() as i64))
                .build();
            res.append_header("set-cookie", cookie.to_string());
        }
    }
}

impl Middleware for Sessions {
    fn name(&self) -> &'static str { "sessions" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let session = self.load(ctx.request()).await?;
            ctx.set_session(session);

            let outcome = next.run(ctx).await;
            if ctx.is_cancelled() {
                return outcome;
            }
            let committed = self.commit(ctx).await;
            outcome.and(committed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_verify_with_any_key() {
        let old = Keys::new(["old"]).unwrap();
        let rotated = Keys::new(["new", "old"]).unwrap();
        let sig = old.sign("strata:sess=abc");
        assert!(rotated.verify("strata:sess=abc", &sig));
        assert!(!rotated.verify("strata:sess=abd", &sig));
        assert!(!rotated.verify("strata:sess=abc", "not base64!"));
    }

    #[test]
    fn no_keys_is_a_config_error() {
        assert!(Keys::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn change_tracking() {
        let mut data = SessionData::new();
        data.insert("views".into(), json!(1));
        let mut s = Session::existing("id".into(), data);
        assert!(!s.changed());
        s.insert("views", 2);
        assert!(s.changed());
        s.insert("views", 1);
        assert!(!s.changed());
        assert!(!s.is_new());
        assert!(Session::fresh().is_new());
    }
}
