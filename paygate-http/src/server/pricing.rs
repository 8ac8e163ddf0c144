//! Pricing strategies.
//!
//! A [`PricingStrategy`] turns a [`Resource`] into a USDC price. A price of
//! zero or less marks the resource as free and skips payment entirely.
//!
//! - [`Fixed`] - the same price for every resource
//! - [`PathBased`] - exact match on the request path
//! - [`MethodBased`] - exact match on the HTTP method
//! - [`Dynamic`] - delegates to a [`PriceFetcher`], e.g. a remote pricing service

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::BoxError;
use super::resource::Resource;

/// Computes the price of a resource in whole USDC.
#[async_trait]
pub trait PricingStrategy: Send + Sync {
    /// Returns the price for `resource`. A price `<= 0` means free.
    async fn price(&self, resource: &Resource) -> Result<Decimal, BoxError>;
}

/// The same price for every resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixed {
    price: Decimal,
}

impl Fixed {
    /// Creates a fixed price.
    #[must_use]
    pub const fn new(price: Decimal) -> Self {
        Self { price }
    }
}

#[async_trait]
impl PricingStrategy for Fixed {
    async fn price(&self, _resource: &Resource) -> Result<Decimal, BoxError> {
        Ok(self.price)
    }
}

/// Prices keyed by exact request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathBased {
    prices: HashMap<String, Decimal>,
    default: Decimal,
}

impl PathBased {
    /// Creates a strategy charging `default` for unlisted paths.
    #[must_use]
    pub fn new(default: Decimal) -> Self {
        Self {
            prices: HashMap::new(),
            default,
        }
    }

    /// Sets the price of `path`.
    #[must_use]
    pub fn with_price(mut self, path: impl Into<String>, price: Decimal) -> Self {
        self.prices.insert(path.into(), price);
        self
    }
}

impl<K: Into<String>> FromIterator<(K, Decimal)> for PathBased {
    fn from_iter<I: IntoIterator<Item = (K, Decimal)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            default: Decimal::ZERO,
        }
    }
}

#[async_trait]
impl PricingStrategy for PathBased {
    async fn price(&self, resource: &Resource) -> Result<Decimal, BoxError> {
        Ok(self
            .prices
            .get(&resource.path)
            .copied()
            .unwrap_or(self.default))
    }
}

/// Prices keyed by exact HTTP method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodBased {
    prices: HashMap<String, Decimal>,
    default: Decimal,
}

impl MethodBased {
    /// Creates a strategy charging `default` for unlisted methods.
    #[must_use]
    pub fn new(default: Decimal) -> Self {
        Self {
            prices: HashMap::new(),
            default,
        }
    }

    /// Sets the price of `method`.
    #[must_use]
    pub fn with_price(mut self, method: impl Into<String>, price: Decimal) -> Self {
        self.prices.insert(method.into(), price);
        self
    }
}

#[async_trait]
impl PricingStrategy for MethodBased {
    async fn price(&self, resource: &Resource) -> Result<Decimal, BoxError> {
        Ok(self
            .prices
            .get(&resource.method)
            .copied()
            .unwrap_or(self.default))
    }
}

/// Source of prices computed at request time.
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    /// Fetches the current price of `resource`.
    async fn fetch_price(&self, resource: &Resource) -> Result<Decimal, BoxError>;
}

/// Boxed pricing callback.
///
/// Uses higher-ranked trait bounds (HRTB) so the callback works with any
/// lifetime of the borrowed resource.
type BoxedPriceCallback = dyn for<'a> Fn(
        &'a Resource,
    ) -> Pin<Box<dyn Future<Output = Result<Decimal, BoxError>> + Send + 'a>>
    + Send
    + Sync;

struct FnFetcher {
    callback: Box<BoxedPriceCallback>,
}

#[async_trait]
impl PriceFetcher for FnFetcher {
    async fn fetch_price(&self, resource: &Resource) -> Result<Decimal, BoxError> {
        (self.callback)(resource).await
    }
}

/// Prices computed per request by a [`PriceFetcher`].
#[derive(Clone)]
pub struct Dynamic {
    fetcher: Arc<dyn PriceFetcher>,
}

impl Dynamic {
    /// Wraps a fetcher.
    pub fn new(fetcher: impl PriceFetcher + 'static) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }

    /// Creates a dynamic strategy from an async closure.
    pub fn from_fn<F, Fut>(callback: F) -> Self
    where
        F: Fn(&Resource) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Decimal, BoxError>> + Send + 'static,
    {
        Self::new(FnFetcher {
            callback: Box::new(move |resource| Box::pin(callback(resource))),
        })
    }
}

impl fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dynamic")
            .field("fetcher", &"<fetcher>")
            .finish()
    }
}

#[async_trait]
impl PricingStrategy for Dynamic {
    async fn price(&self, resource: &Resource) -> Result<Decimal, BoxError> {
        self.fetcher.fetch_price(resource).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_fixed() {
        let strategy = Fixed::new(d("0.01"));
        assert_eq!(
            strategy.price(&Resource::new("GET", "/any")).await.unwrap(),
            d("0.01")
        );
    }

    #[tokio::test]
    async fn test_path_based() {
        let strategy = PathBased::new(d("0.5"))
            .with_price("/a", d("1"))
            .with_price("/b", d("2"));
        assert_eq!(strategy.price(&Resource::new("GET", "/a")).await.unwrap(), d("1"));
        assert_eq!(strategy.price(&Resource::new("POST", "/b")).await.unwrap(), d("2"));
        assert_eq!(
            strategy.price(&Resource::new("GET", "/unknown")).await.unwrap(),
            d("0.5")
        );
        assert_eq!(
            strategy.price(&Resource::new("GET", "/a/")).await.unwrap(),
            d("0.5")
        );
    }

    #[tokio::test]
    async fn test_path_based_from_iter_defaults_to_free() {
        let strategy: PathBased = [("/paid", d("1"))].into_iter().collect();
        assert_eq!(strategy.price(&Resource::new("GET", "/free")).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_method_based() {
        let strategy = MethodBased::new(d("0.5"))
            .with_price("GET", d("1"))
            .with_price("POST", d("2"));
        assert_eq!(strategy.price(&Resource::new("GET", "/x")).await.unwrap(), d("1"));
        assert_eq!(strategy.price(&Resource::new("POST", "/x")).await.unwrap(), d("2"));
        assert_eq!(strategy.price(&Resource::new("DELETE", "/x")).await.unwrap(), d("0.5"));
    }

    #[tokio::test]
    async fn test_dynamic_from_fn() {
        let strategy = Dynamic::from_fn(|resource: &Resource| {
            let premium = resource.params.get("tier").is_some_and(|t| t == "premium");
            async move {
                Ok::<_, BoxError>(if premium { d("5") } else { d("1") })
            }
        });
        let basic = Resource::new("GET", "/data");
        let premium = Resource::new("GET", "/data").with_param("tier", "premium");
        assert_eq!(strategy.price(&basic).await.unwrap(), d("1"));
        assert_eq!(strategy.price(&premium).await.unwrap(), d("5"));
    }

    #[tokio::test]
    async fn test_dynamic_propagates_errors() {
        let strategy = Dynamic::from_fn(|_: &Resource| async {
            Err::<Decimal, BoxError>("pricing service down".into())
        });
        let err = strategy.price(&Resource::new("GET", "/")).await.unwrap_err();
        assert_eq!(err.to_string(), "pricing service down");
    }
}
