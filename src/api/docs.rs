//! API documentation
//!
//! The OpenAPI document is derived from the `#[utoipa::path]` annotations on
//! the handlers, then trimmed to the providers this instance has enabled.
//! Swagger UI loads it from `/api-docs/openapi.json`.

use axum::{Json, Router, response::Html, routing::get};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme};
use utoipa::openapi::{ObjectBuilder, OpenApi as OpenApiDocument, RefOr, Schema, SchemaType};
use utoipa::{Modify, OpenApi};

use super::dto::{AuthorInput, AuthorRef, AuthorView, BookInput, BookView, MessageResponse};
use crate::auth::routes::LoginResponse;
use crate::auth::session::SESSION_COOKIE;
use crate::auth::{ProviderKind, ProviderRegistry, UserView};

const SWAGGER_UI_VERSION: &str = "5.17.14";

/// Prefix shared by the per-provider login routes
const PROVIDER_ROUTES: &str = "/auth/{provider}";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bookstore API",
        description = "API for managing books and authors in a simple bookstore"
    ),
    paths(
        crate::root,
        crate::health_check,
        crate::auth::routes::start_login,
        crate::auth::routes::callback,
        crate::auth::routes::me,
        crate::auth::routes::logout,
        crate::auth::routes::failure,
        super::books::list_books,
        super::books::get_book,
        super::books::create_book,
        super::books::update_book,
        super::books::delete_book,
        super::authors::list_authors,
        super::authors::get_author,
        super::authors::create_author,
        super::authors::update_author,
        super::authors::delete_author,
        crate::metrics::render,
    ),
    components(schemas(
        BookView,
        BookInput,
        AuthorView,
        AuthorInput,
        AuthorRef,
        UserView,
        LoginResponse,
        MessageResponse
    )),
    modifiers(&SessionSecurity),
    tags(
        (name = "Books", description = "Book catalog"),
        (name = "Authors", description = "Author catalog"),
        (name = "Auth", description = "OAuth login and sessions"),
        (name = "Service", description = "Liveness and metrics")
    )
)]
struct ApiDoc;

/// Registers the two ways a session token can be presented.
struct SessionSecurity;

impl Modify for SessionSecurity {
    fn modify(&self, openapi: &mut OpenApiDocument) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "sessionCookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE))),
        );
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

/// The OpenAPI document for an instance with `enabled` providers
///
/// Provider routes are dropped when no provider is configured; otherwise
/// the `provider` path parameter is restricted to the enabled slugs.
pub fn openapi_document(enabled: &[ProviderKind]) -> OpenApiDocument {
    let mut document = ApiDoc::openapi();

    if enabled.is_empty() {
        document
            .paths
            .paths
            .retain(|path, _| !path.starts_with(PROVIDER_ROUTES));
        return document;
    }

    let slugs: Vec<&'static str> = enabled.iter().map(|kind| kind.slug()).collect();
    let provider_schema = Schema::Object(
        ObjectBuilder::new()
            .schema_type(SchemaType::String)
            .enum_values(Some(slugs))
            .build(),
    );

    let provider_paths = document
        .paths
        .paths
        .iter_mut()
        .filter(|(path, _)| path.starts_with(PROVIDER_ROUTES));
    for (_, item) in provider_paths {
        for operation in item.operations.values_mut() {
            for parameter in operation.parameters.iter_mut().flatten() {
                if parameter.name == "provider" {
                    parameter.schema = Some(RefOr::T(provider_schema.clone()));
                }
            }
        }
    }

    document
}

pub fn docs_router<S>(providers: &ProviderRegistry) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let document = openapi_document(&providers.enabled());

    Router::new()
        .route("/api-docs", get(swagger_ui))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { Json(document) }),
        )
}

/// GET /api-docs
async fn swagger_ui() -> Html<String> {
    Html(format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>Bookstore API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@{SWAGGER_UI_VERSION}/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@{SWAGGER_UI_VERSION}/swagger-ui-bundle.js" crossorigin></script>
  <script>
    window.onload = () => {{
      window.ui = SwaggerUIBundle({{ url: "/api-docs/openapi.json", dom_id: "#swagger-ui" }});
    }};
  </script>
</body>
</html>"##
    ))
}
