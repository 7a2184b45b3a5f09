//! HTTP method as a typed enum.
//!
//! Only the verbs an application router dispatches on. Anything else is
//! rejected by the server with `405 Method Not Allowed` before it reaches the
//! middleware pipeline.

use std::fmt;
use std::str::FromStr;

/// A routable HTTP method.
///
/// The declaration order is the order methods are listed in an `Allow`
/// header.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    /// Every variant, in `Allow` header order.
    pub const ALL: [Method; 7] = [
        Self::Get,
        Self::Head,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Options,
    ];

    /// The verbs `Router::any` registers.
    pub const ANY: [Method; 5] = [Self::Get, Self::Post, Self::Put, Self::Patch, Self::Delete];

    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Patch   => "PATCH",
            Self::Delete  => "DELETE",
            Self::Options => "OPTIONS",
        }
    }

    /// `GET`, `HEAD` and `OPTIONS` do not change server state.
    pub fn is_safe(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options)
    }
}

/// Parses a method name. Case-insensitive, because route tables are often
/// written as `["get", "post"]`.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = ();

    fn try_from(m: &http::Method) -> Result<Self, Self::Error> {
        m.as_str().parse()
    }
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
    fn parses_case_insensitively() {
        assert_eq!("get".parse::<Method>(), Ok(Method::Get));
        assert_eq!("PATCH".parse::<Method>(), Ok(Method::Patch));
        assert!("PURGE".parse::<Method>().is_err());
    }

    #[test]
    fn all_follows_declaration_order() {
        assert!(Method::ALL.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(Method::ALL.map(|m| m.to_string())[2], "POST");
    }
}
