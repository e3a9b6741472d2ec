//! Response compression.
//!
//! Only buffered bodies are compressed, in one shot. A response qualifies
//! when all of these hold:
//!
//! - the request is not `HEAD` and the status is not `204` / `304`
//! - the body is non-empty and at least `threshold` bytes long
//! - the content type passes the filter (default: contains `text`)
//! - no `Content-Encoding` is set yet
//! - the client accepts gzip or deflate

use std::io::Write;
use std::sync::{Arc, LazyLock};

use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use regex::Regex;
use tracing::debug;

use super::{BoxFuture, Middleware, Next, Outcome};
use crate::context::Context;
use crate::error::HttpError;
use crate::response::{Body, Response};

static TEXT_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?i)text").expect("static pattern compiles"));

type Filter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Content codings this unit can produce, in order of preference.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Encoding {
    Gzip,
    Deflate,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gzip    => "gzip",
            Self::Deflate => "deflate",
        }
    }

    /// Picks the best coding from an `Accept-Encoding` value. Highest
    /// q-value wins; ties go to gzip. `*` stands for gzip.
    pub fn negotiate(accept: &str) -> Option<Self> {
        let mut best: Option<(Self, f32)> = None;
        for item in accept.split(',') {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or("").trim();
            let q = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|v| v.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            let encoding = if coding.eq_ignore_ascii_case("gzip")
                || coding.eq_ignore_ascii_case("x-gzip")
                || coding == "*"
            {
                Self::Gzip
            } else if coding.eq_ignore_ascii_case("deflate") {
                Self::Deflate
            } else {
                continue;
            };
            if q <= 0.0 {
                continue;
            }
            let better = match best {
                None => true,
                Some((current, best_q)) => {
                    q > best_q || (q == best_q && encoding == Self::Gzip && current != Self::Gzip)
                }
            };
            if better {
                best = Some((encoding, q));
            }
        }
        best.map(|(encoding, _)| encoding)
    }

    fn encode(self, data: &[u8], level: Compression) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut enc = GzEncoder::new(Vec::new(), level);
                enc.write_all(data)?;
                enc.finish()
            }
            Self::Deflate => {
                let mut enc = ZlibEncoder::new(Vec::new(), level);
                enc.write_all(data)?;
                enc.finish()
            }
        }
    }
}

/// Compresses qualifying responses with gzip or deflate.
#[derive(Clone)]
pub struct Compress {
    filter: Filter,
    threshold: usize,
    level: Compression,
}

impl std::fmt::Debug for Compress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compress")
            .field("threshold", &self.threshold)
            .field("level", &self.level.level())
            .finish_non_exhaustive()
    }
}

impl Default for Compress {
    fn default() -> Self {
        Self {
            filter: Arc::new(|content_type| TEXT_LIKE.is_match(content_type)),
            threshold: 1024,
            level: Compression::default(),
        }
    }
}

impl Compress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides, from the response content type, whether to compress.
    pub fn filter(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Compress content types matching `pattern`.
    pub fn pattern(self, pattern: Regex) -> Self {
        self.filter(move |content_type| pattern.is_match(content_type))
    }

    /// Minimum body size in bytes.
    pub fn threshold(mut self, bytes: usize) -> Self {
        self.threshold = bytes;
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    fn encoding_for(&self, ctx: &Context) -> Option<Encoding> {
        let req = ctx.request();
        let res = ctx.response();
        if req.method() == "HEAD" || matches!(res.status(), 204 | 304) {
            return None;
        }
        if res.header("content-encoding").is_some() || res.body().is_empty() {
            return None;
        }
        if !res.content_type().is_some_and(|ct| (self.filter)(ct)) {
            return None;
        }
        Encoding::negotiate(req.header("accept-encoding")?)
    }
}

/// Whether some `Vary` value already lists `Accept-Encoding` (or `*`).
fn varies_on_encoding(res: &Response) -> bool {
    res.headers()
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("vary"))
        .flat_map(|(_, value)| value.split(','))
        .map(str::trim)
        .any(|token| token == "*" || token.eq_ignore_ascii_case("accept-encoding"))
}

impl Middleware for Compress {
    fn name(&self) -> &'static str { "compress" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            next.run(ctx).await?;

            let Some(encoding) = self.encoding_for(ctx) else { return Ok(()) };
            let res = ctx.response_mut();
            let plain = res.body().to_bytes();
            if plain.len() < self.threshold {
                return Ok(());
            }
            let compressed = encoding.encode(&plain, self.level).map_err(HttpError::internal)?;
            debug!(encoding = encoding.as_str(), from = plain.len(), to = compressed.len(), "compressed");
            drop(plain);

            res.replace_body(Body::Bytes(compressed));
            res.set_header("content-encoding", encoding.as_str());
            res.remove_header("content-length");
            if !varies_on_encoding(res) {
                res.append_header("vary", "Accept-Encoding");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_honours_q_values() {
        assert_eq!(Encoding::negotiate("gzip, deflate"), Some(Encoding::Gzip));
        assert_eq!(Encoding::negotiate("deflate, gzip;q=0.5"), Some(Encoding::Deflate));
        assert_eq!(Encoding::negotiate("gzip;q=0, deflate;q=0.1"), Some(Encoding::Deflate));
        assert_eq!(Encoding::negotiate("br, identity"), None);
        assert_eq!(Encoding::negotiate("*"), Some(Encoding::Gzip));
    }

    #[test]
    fn vary_is_not_duplicated() {
        let mut res = Response::new();
        assert!(!varies_on_encoding(&res));
        res.append_header("Vary", "Origin, accept-encoding");
        assert!(varies_on_encoding(&res));

        let mut res = Response::new();
        res.append_header("vary", "Origin");
        assert!(!varies_on_encoding(&res));
    }

    #[test]
    fn default_filter_is_text_like() {
        let c = Compress::new();
        assert!((c.filter)("text/plain; charset=utf-8"));
        assert!((c.filter)("TEXT/HTML"));
        assert!(!(c.filter)("application/json"));
    }
}
