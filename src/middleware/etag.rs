//! Entity tags for successful responses.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};

use super::{BoxFuture, Middleware, Next, Outcome};
use crate::context::Context;

/// Sets `ETag` on 2xx responses with a body, unless one is already set.
///
/// The tag is `"<length in hex>-<first 27 chars of base64(sha1(body))>"`,
/// prefixed with `W/` in weak mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct Etag {
    weak: bool,
}

impl Etag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weak(mut self, weak: bool) -> Self {
        self.weak = weak;
        self
    }
}

/// Fingerprint of `body`.
pub(crate) fn entity_tag(body: &[u8], weak: bool) -> String {
    let hash = STANDARD.encode(Sha1::digest(body));
    let prefix = if weak { "W/" } else { "" };
    format!("{prefix}\"{:x}-{}\"", body.len(), &hash[..27])
}

impl Middleware for Etag {
    fn name(&self) -> &'static str { "etag" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            next.run(ctx).await?;

            let res = ctx.response_mut();
            if !(200..300).contains(&res.status()) || res.body().is_empty() || res.header("etag").is_some() {
                return Ok(());
            }
            let tag = entity_tag(&res.body().to_bytes(), self.weak);
            res.set_header("etag", tag);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_shape() {
        // sha1("hello") = aaf4c61d...; base64 = qvTGHdzF6KLavt4PO0gs2a6pQ00=
        assert_eq!(entity_tag(b"hello", false), "\"5-qvTGHdzF6KLavt4PO0gs2a6pQ00\"");
        assert_eq!(entity_tag(b"hello", true), "W/\"5-qvTGHdzF6KLavt4PO0gs2a6pQ00\"");
    }

    #[test]
    fn different_bodies_differ() {
        assert_ne!(entity_tag(b"v1", false), entity_tag(b"v2", false));
    }
}
