//! Pretty-printing of JSON bodies.

use serde::Serialize as _;
use serde_json::ser::{PrettyFormatter, Serializer};

use super::{BoxFuture, Middleware, Next, Outcome};
use crate::context::Context;
use crate::response::Body;

/// Renders JSON bodies with indentation when pretty printing is on, or when
/// the request carries the opt-in query parameter (e.g. `?pretty`).
/// Otherwise the body is left as a value and goes out compact.
#[derive(Clone, Debug)]
pub struct Json {
    pretty: bool,
    param: Option<String>,
    spaces: usize,
}

impl Default for Json {
    fn default() -> Self {
        Self { pretty: true, param: None, spaces: 2 }
    }
}

impl Json {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Query parameter that turns pretty printing on for one request.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.param = Some(name.into());
        self
    }

    pub fn spaces(mut self, spaces: usize) -> Self {
        self.spaces = spaces;
        self
    }

    fn render(&self, value: &serde_json::Value) -> Vec<u8> {
        let indent = vec![b' '; self.spaces];
        let mut out = Vec::new();
        let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(&indent));
        match value.serialize(&mut ser) {
            Ok(()) => out,
            Err(_) => serde_json::to_vec(value).unwrap_or_default(),
        }
    }
}

impl Middleware for Json {
    fn name(&self) -> &'static str { "json" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            next.run(ctx).await?;

            let requested = self.param.as_deref()
                .is_some_and(|p| ctx.request().has_query_param(p));
            if !(self.pretty || requested) {
                return Ok(());
            }
            let res = ctx.response_mut();
            if let Body::Json(value) = res.body() {
                let rendered = self.render(value);
                res.replace_body(Body::Bytes(rendered));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_with_configured_indent() {
        let json = Json::new().spaces(4);
        let out = String::from_utf8(json.render(&json!({ "a": 1 }))).unwrap();
        assert_eq!(out, "{\n    \"a\": 1\n}");
    }
}
