//! Optional metadata attached to payment requirements.
//!
//! A [`SchemaProvider`] supplies the `outputSchema` describing how to call a
//! resource. A [`ResourceProvider`] supplies its public URL and description.
//! Both are consulted after the requirement is built; their failures are
//! logged and never block a payment.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use paygate::schema::EndpointSchema;

use super::BoxError;
use super::resource::Resource;

/// Supplies the endpoint schema of a resource.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Returns the schema for `resource`, or `None` if it has none.
    async fn schema(&self, resource: &Resource) -> Result<Option<EndpointSchema>, BoxError>;
}

/// The same schema for every resource.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticSchema {
    schema: EndpointSchema,
}

impl StaticSchema {
    /// Wraps a schema.
    #[must_use]
    pub const fn new(schema: EndpointSchema) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl SchemaProvider for StaticSchema {
    async fn schema(&self, _resource: &Resource) -> Result<Option<EndpointSchema>, BoxError> {
        Ok(Some(self.schema.clone()))
    }
}

/// Schemas keyed by exact request path, with an optional default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathSchemas {
    schemas: HashMap<String, EndpointSchema>,
    default: Option<EndpointSchema>,
}

impl PathSchemas {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the schema of `path`.
    #[must_use]
    pub fn with_schema(mut self, path: impl Into<String>, schema: EndpointSchema) -> Self {
        self.add_schema(path, schema);
        self
    }

    /// Sets the schema used for unlisted paths.
    #[must_use]
    pub fn with_default(mut self, schema: EndpointSchema) -> Self {
        self.set_default(schema);
        self
    }

    /// Sets the schema of `path` in place.
    pub fn add_schema(&mut self, path: impl Into<String>, schema: EndpointSchema) {
        self.schemas.insert(path.into(), schema);
    }

    /// Sets the default schema in place.
    pub fn set_default(&mut self, schema: EndpointSchema) {
        self.default = Some(schema);
    }
}

#[async_trait]
impl SchemaProvider for PathSchemas {
    async fn schema(&self, resource: &Resource) -> Result<Option<EndpointSchema>, BoxError> {
        Ok(self
            .schemas
            .get(&resource.path)
            .or(self.default.as_ref())
            .cloned())
    }
}

/// Source of schemas computed at request time.
#[async_trait]
pub trait SchemaFetcher: Send + Sync {
    /// Fetches the schema of `resource`.
    async fn fetch_schema(&self, resource: &Resource) -> Result<Option<EndpointSchema>, BoxError>;
}

type BoxedSchemaCallback = dyn for<'a> Fn(
        &'a Resource,
    ) -> Pin<
        Box<dyn Future<Output = Result<Option<EndpointSchema>, BoxError>> + Send + 'a>,
    > + Send
    + Sync;

struct FnSchemaFetcher {
    callback: Box<BoxedSchemaCallback>,
}

#[async_trait]
impl SchemaFetcher for FnSchemaFetcher {
    async fn fetch_schema(&self, resource: &Resource) -> Result<Option<EndpointSchema>, BoxError> {
        (self.callback)(resource).await
    }
}

/// Schemas computed per request by a [`SchemaFetcher`].
#[derive(Clone)]
pub struct DynamicSchema {
    fetcher: Arc<dyn SchemaFetcher>,
}

impl DynamicSchema {
    /// Wraps a fetcher.
    pub fn new(fetcher: impl SchemaFetcher + 'static) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }

    /// Creates a provider from an async closure.
    pub fn from_fn<F, Fut>(callback: F) -> Self
    where
        F: Fn(&Resource) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<EndpointSchema>, BoxError>> + Send + 'static,
    {
        Self::new(FnSchemaFetcher {
            callback: Box::new(move |resource| Box::pin(callback(resource))),
        })
    }
}

impl fmt::Debug for DynamicSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicSchema")
            .field("fetcher", &"<fetcher>")
            .finish()
    }
}

#[async_trait]
impl SchemaProvider for DynamicSchema {
    async fn schema(&self, resource: &Resource) -> Result<Option<EndpointSchema>, BoxError> {
        self.fetcher.fetch_schema(resource).await
    }
}

/// Supplies the public URL and description of a resource.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Public URL placed in the requirement's `resource` field.
    async fn resource_url(&self, resource: &Resource) -> Result<String, BoxError>;

    /// Human-readable description placed in the requirement.
    async fn description(&self, resource: &Resource) -> Result<String, BoxError>;
}

/// URL and description of one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMetadata {
    /// Public URL. Empty to fall back.
    pub url: String,
    /// Description. Empty to fall back.
    pub description: String,
}

impl ResourceMetadata {
    /// Creates metadata.
    pub fn new(url: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            description: description.into(),
        }
    }
}

/// Resource metadata keyed by exact request path.
///
/// URLs resolve to the path's metadata, then the default, then
/// `base_url + path`. Descriptions resolve to the path's metadata, then the
/// default, then the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathResources {
    resources: HashMap<String, ResourceMetadata>,
    default: Option<ResourceMetadata>,
    base_url: String,
}

impl PathResources {
    /// Creates a provider deriving unlisted URLs from `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Sets the metadata of `path`.
    #[must_use]
    pub fn with_resource(mut self, path: impl Into<String>, metadata: ResourceMetadata) -> Self {
        self.resources.insert(path.into(), metadata);
        self
    }

    /// Sets the metadata used for unlisted paths.
    #[must_use]
    pub fn with_default(mut self, metadata: ResourceMetadata) -> Self {
        self.default = Some(metadata);
        self
    }

    fn resolve<'a>(
        &'a self,
        path: &str,
        field: impl Fn(&'a ResourceMetadata) -> &'a str,
    ) -> Option<&'a str> {
        self.resources
            .get(path)
            .map(&field)
            .filter(|s| !s.is_empty())
            .or_else(|| self.default.as_ref().map(&field).filter(|s| !s.is_empty()))
    }
}

#[async_trait]
impl ResourceProvider for PathResources {
    async fn resource_url(&self, resource: &Resource) -> Result<String, BoxError> {
        if let Some(url) = self.resolve(&resource.path, |m| m.url.as_str()) {
            return Ok(url.to_owned());
        }
        if self.base_url.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("{}{}", self.base_url, resource.path))
    }

    async fn description(&self, resource: &Resource) -> Result<String, BoxError> {
        Ok(self
            .resolve(&resource.path, |m| m.description.as_str())
            .unwrap_or_default()
            .to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate::schema::{InputSchema, SchemaNode};

    fn schema(method: &str) -> EndpointSchema {
        EndpointSchema::new().with_input(InputSchema::http(method))
    }

    #[tokio::test]
    async fn test_path_schemas() {
        let provider = PathSchemas::new()
            .with_schema("/weather", schema("GET"))
            .with_default(schema("POST"));
        let weather = provider
            .schema(&Resource::new("GET", "/weather"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(weather, schema("GET"));
        let other = provider.schema(&Resource::new("GET", "/x")).await.unwrap();
        assert_eq!(other, Some(schema("POST")));

        let empty = PathSchemas::new();
        assert_eq!(empty.schema(&Resource::new("GET", "/x")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_static_and_dynamic_schema() {
        let output = SchemaNode::object().with_required_property("temp", SchemaNode::number());
        let fixed = StaticSchema::new(EndpointSchema::new().with_output(output.clone()));
        let got = fixed.schema(&Resource::default()).await.unwrap().unwrap();
        assert_eq!(got.output, Some(output));

        let dynamic = DynamicSchema::from_fn(|resource: &Resource| {
            let method = resource.method.clone();
            async move { Ok::<_, BoxError>(Some(schema(&method))) }
        });
        let got = dynamic.schema(&Resource::new("PUT", "/")).await.unwrap();
        assert_eq!(got, Some(schema("PUT")));
    }

    #[tokio::test]
    async fn test_path_resources_url_fallbacks() {
        let provider = PathResources::new("https://api.example.com")
            .with_resource(
                "/weather",
                ResourceMetadata::new("https://weather.example.com", "Weather data"),
            )
            .with_resource("/partial", ResourceMetadata::new("", "Partial"));
        let weather = Resource::new("GET", "/weather");
        assert_eq!(
            provider.resource_url(&weather).await.unwrap(),
            "https://weather.example.com"
        );
        assert_eq!(provider.description(&weather).await.unwrap(), "Weather data");

        let partial = Resource::new("GET", "/partial");
        assert_eq!(
            provider.resource_url(&partial).await.unwrap(),
            "https://api.example.com/partial"
        );

        let unknown = Resource::new("GET", "/unknown");
        assert_eq!(provider.description(&unknown).await.unwrap(), "");

        let with_default =
            provider.with_default(ResourceMetadata::new("https://default.example.com", "Default"));
        assert_eq!(
            with_default.resource_url(&unknown).await.unwrap(),
            "https://default.example.com"
        );
        assert_eq!(with_default.description(&unknown).await.unwrap(), "Default");
    }

    #[tokio::test]
    async fn test_path_resources_without_base_url() {
        let provider = PathResources::default();
        assert_eq!(
            provider.resource_url(&Resource::new("GET", "/x")).await.unwrap(),
            ""
        );
    }
}
