// Dynamic CORS middleware
// Reflects the origin for wildcard configs outside production; checks the
// whitelist everywhere else

use axum::{
    body::Body,
    http::{
        header::{self, HeaderValue},
        Method, Request, Response, StatusCode,
    },
    middleware::Next,
};
use tracing::debug;

pub async fn dynamic_cors_middleware(
    req: Request<Body>,
    next: Next,
) -> Result<Response<Body>, StatusCode> {
    let config = crate::app_config::config();

    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let has_wildcard = config.cors_allowed_origins.iter().any(|o| o == "*");

    let allowed_origin = if has_wildcard && !config.is_production() {
        debug!("CORS: Reflecting origin for staging/dev: {:?}", origin);
        origin.clone()
    } else {
        origin.as_ref().and_then(|req_origin| {
            if config.cors_allowed_origins.contains(req_origin) {
                Some(req_origin.clone())
            } else {
                debug!("CORS: Origin not in whitelist: {}", req_origin);
                None
            }
        })
    };

    // Handle preflight OPTIONS requests
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());

        if let Some(allowed) = allowed_origin {
            if let Ok(value) = HeaderValue::from_str(&allowed) {
                response
                    .headers_mut()
                    .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
            response.headers_mut().insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
            );
            response.headers_mut().insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("authorization, content-type, x-api-key"),
            );
            response.headers_mut().insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }

        return Ok(response);
    }

    let mut response = next.run(req).await;

    if let Some(allowed) = allowed_origin {
        if let Ok(value) = HeaderValue::from_str(&allowed) {
            response
                .headers_mut()
                .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            response.headers_mut().insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }

    Ok(response)
}
