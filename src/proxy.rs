//! Ordered chain of public CORS relays
//!
//! A relay is a URL prefix: appending a percent-encoded absolute URL yields a
//! request the relay re-issues and returns verbatim. The chain is tried in
//! order, never shuffled.

use crate::constants::{FREE_RELAYS, PUBLIC_RELAYS};

/// Ordered relay prefixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyChain {
    prefixes: Vec<String>,
}

impl ProxyChain {
    /// Creates a chain from prefixes, in attempt order
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// A chain with no relays; production fetches then behave like development
    pub fn empty() -> Self {
        Self {
            prefixes: Vec::new(),
        }
    }

    /// Prefixes in attempt order
    pub fn proxy_list(&self) -> &[String] {
        &self.prefixes
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Relay URLs for `target`, in attempt order
    pub fn wrapped(&self, target: &str) -> impl Iterator<Item = (&str, String)> + '_ {
        let encoded = urlencoding::encode(target).into_owned();
        self.prefixes
            .iter()
            .map(move |prefix| (prefix.as_str(), format!("{}{}", prefix, encoded)))
    }
}

impl Default for ProxyChain {
    /// Public relays first, then the free relay APIs
    fn default() -> Self {
        Self::new(PUBLIC_RELAYS.iter().chain(FREE_RELAYS.iter()).copied())
    }
}

/// Wraps a single absolute URL with one relay prefix
pub fn wrap(prefix: &str, target: &str) -> String {
    format!("{}{}", prefix, urlencoding::encode(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chain_order() {
        let chain = ProxyChain::default();
        assert_eq!(chain.len(), 5);
        assert_eq!(chain.proxy_list()[0], "https://api.allorigins.win/raw?url=");
        assert_eq!(chain.proxy_list()[4], "https://corsproxy.io/?");
    }

    #[test]
    fn test_wrap_percent_encodes_target() {
        let url = wrap(
            "https://api.allorigins.win/raw?url=",
            "https://data.gateapi.io/api2/1/tickers",
        );
        assert_eq!(
            url,
            "https://api.allorigins.win/raw?url=https%3A%2F%2Fdata.gateapi.io%2Fapi2%2F1%2Ftickers"
        );
    }

    #[test]
    fn test_wrapped_preserves_order() {
        let chain = ProxyChain::new(["https://a/?u=", "https://b/"]);
        let urls: Vec<_> = chain.wrapped("https://x.io/p").map(|(_, u)| u).collect();
        assert_eq!(
            urls,
            vec!["https://a/?u=https%3A%2F%2Fx.io%2Fp", "https://b/https%3A%2F%2Fx.io%2Fp"]
        );
    }
}
