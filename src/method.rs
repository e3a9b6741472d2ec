//! HTTP method as a typed enum.
//!
//! Covers RFC 9110 standard methods, `PATCH` (RFC 5789), the WebDAV
//! extensions, and `PURGE` used by nginx and Varnish for cache invalidation.
//!
//! Requests carrying a method token outside this list still travel through
//! the pipeline; the [`Router`](crate::Router) answers them with
//! `501 Not Implemented`.

use std::fmt;
use std::str::FromStr;

macro_rules! methods {
    ($( $variant:ident => $wire:literal, )+) => {
        /// A known HTTP method.
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum Method {
            $( $variant, )+
        }

        impl Method {
            /// Every known method, in declaration order.
            pub const ALL: &'static [Method] = &[ $( Method::$variant, )+ ];

            /// Returns the uppercase wire representation (e.g. `"GET"`).
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $wire, )+
                }
            }
        }

        /// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
        impl FromStr for Method {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $wire => Ok(Self::$variant), )+
                    _ => Err(()),
                }
            }
        }
    };
}

methods! {
    // RFC 9110 ─────────────────────────────────────────────────────────────────
    Get        => "GET",
    Head       => "HEAD",
    Post       => "POST",
    Put        => "PUT",
    Delete     => "DELETE",
    Connect    => "CONNECT",
    Options    => "OPTIONS",
    Trace      => "TRACE",
    Patch      => "PATCH",
    // WebDAV ───────────────────────────────────────────────────────────────────
    Copy       => "COPY",
    Lock       => "LOCK",
    Mkcalendar => "MKCALENDAR",
    Mkcol      => "MKCOL",
    Move       => "MOVE",
    Propfind   => "PROPFIND",
    Proppatch  => "PROPPATCH",
    Report     => "REPORT",
    Search     => "SEARCH",
    Unlock     => "UNLOCK",
    // Cache invalidation ───────────────────────────────────────────────────────
    Purge      => "PURGE",
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uppercase_only() {
        assert_eq!("GET".parse::<Method>(), Ok(Method::Get));
        assert!("get".parse::<Method>().is_err());
        assert!("BREW".parse::<Method>().is_err());
    }
}
