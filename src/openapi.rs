use aide::{
    axum::{ApiRouter, routing::get_with},
    openapi::{Components, Contact, Info, License, OpenApi, ReferenceOr, Server, Tag},
    transform::TransformOperation,
};
use axum::{Extension, Json};
use indexmap::IndexMap;
use schemars::schema_for;
use std::sync::Arc;

use crate::api::dispatcher::{
    CancelResponse, EnqueueResponse, HealthResponse, JobStatusResponse, QueueStatusResponse,
};
use crate::config::Config;

/// Create the base OpenAPI specification with metadata.
pub fn create_openapi(config: &Config) -> OpenApi {
    let mut schemas = IndexMap::new();

    schemas.insert(
        "EnqueueResponse".to_string(),
        schemars_to_openapi_schema::<EnqueueResponse>(),
    );
    schemas.insert(
        "JobStatusResponse".to_string(),
        schemars_to_openapi_schema::<JobStatusResponse>(),
    );
    schemas.insert(
        "CancelResponse".to_string(),
        schemars_to_openapi_schema::<CancelResponse>(),
    );
    schemas.insert(
        "QueueStatusResponse".to_string(),
        schemars_to_openapi_schema::<QueueStatusResponse>(),
    );
    schemas.insert(
        "HealthResponse".to_string(),
        schemars_to_openapi_schema::<HealthResponse>(),
    );

    let components = Components {
        schemas,
        security_schemes: IndexMap::new(),
        ..Default::default()
    };

    OpenApi {
        openapi: "3.0.3".into(),
        info: Info {
            title: "GeoIngest API".to_string(),
            description: Some(
                "Asynchronous raster ingestion service: accepts GeoTIFF/ZIP uploads, \
                reprojects and tiles them into Cloud-Optimized GeoTIFFs, renders PNG \
                previews, and tracks job progress through a Postgres-backed queue."
                    .to_string(),
            ),
            version: env!("CARGO_PKG_VERSION").to_string(),
            contact: Some(Contact {
                name: Some("GeoIngest".to_string()),
                url: None,
                email: None,
                extensions: IndexMap::new(),
            }),
            license: Some(License {
                name: "MIT".to_string(),
                url: Some("https://opensource.org/licenses/MIT".to_string()),
                identifier: None,
                extensions: IndexMap::new(),
            }),
            terms_of_service: None,
            summary: None,
            extensions: IndexMap::new(),
        },
        servers: vec![Server {
            url: config.base_url.clone(),
            description: Some("GeoIngest server".to_string()),
            variables: IndexMap::new(),
            extensions: IndexMap::new(),
        }],
        components: Some(components),
        tags: vec![
            Tag {
                name: "Core".to_string(),
                description: Some("Health and service metadata".to_string()),
                external_docs: None,
                extensions: IndexMap::new(),
            },
            Tag {
                name: "Ingestion".to_string(),
                description: Some("Upload, status, cancellation and queue introspection".to_string()),
                external_docs: None,
                extensions: IndexMap::new(),
            },
        ],
        paths: None,
        webhooks: IndexMap::new(),
        external_docs: None,
        extensions: IndexMap::new(),
        json_schema_dialect: None,
        security: vec![],
    }
}

fn schemars_to_openapi_schema<T: schemars::JsonSchema>() -> aide::openapi::SchemaObject {
    let root = schema_for!(T);
    aide::openapi::SchemaObject {
        json_schema: root.into(),
        external_docs: None,
        example: None,
    }
}

pub async fn openapi_handler(Extension(api): Extension<Arc<OpenApi>>) -> Json<OpenApi> {
    Json((*api).clone())
}

fn openapi_handler_docs(op: TransformOperation) -> TransformOperation {
    op.summary("OpenAPI specification")
        .description("Returns the OpenAPI 3.0 specification for this API")
        .tag("Core")
}

/// Route that serves the OpenAPI spec. Generic over the router's state
/// so it can be merged into the stateful dispatcher router.
pub fn docs_routes<S>() -> ApiRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    ApiRouter::new().api_route("/api", get_with(openapi_handler, openapi_handler_docs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dispatcher;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database: crate::config::DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
                max_connections: 5,
            },
            s3: crate::config::S3Config::default(),
            worker: crate::config::WorkerConfig::default(),
            base_url: "http://localhost:8080".to_string(),
            environment: "test".to_string(),
        }
    }

    #[test]
    fn openapi_paths_populated_after_finish_api() {
        let config = test_config();
        let mut openapi = create_openapi(&config);

        assert!(openapi.paths.is_none());

        let _router: ApiRouter<dispatcher::AppState> = ApiRouter::new()
            .merge(dispatcher::routes())
            .merge(docs_routes())
            .finish_api(&mut openapi);

        assert!(openapi.paths.is_some());
        let paths = openapi.paths.as_ref().unwrap();
        assert!(paths.paths.contains_key("/enqueue"));
        assert!(paths.paths.contains_key("/health"));
        assert!(paths.paths.contains_key("/api"));
    }

    #[test]
    fn openapi_spec_has_info() {
        let config = test_config();
        let openapi = create_openapi(&config);

        assert_eq!(openapi.info.title, "GeoIngest API");
        assert!(!openapi.info.version.is_empty());
        assert!(openapi.info.description.is_some());
    }

    #[test]
    fn openapi_spec_has_tags() {
        let config = test_config();
        let openapi = create_openapi(&config);

        let tag_names: Vec<&str> = openapi.tags.iter().map(|t| t.name.as_str()).collect();
        assert!(tag_names.contains(&"Core"));
        assert!(tag_names.contains(&"Ingestion"));
    }
}
