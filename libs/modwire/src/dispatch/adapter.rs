use std::sync::Arc;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;

use super::args::{Args, Argument};
use super::context::{RequestContext, Section};
use crate::contracts::{Controller, HandlerResult};
use crate::error::ConfigError;
use crate::registry::{ParamBinding, ParamKind};
use crate::token::Token;

/// Highest positional index a binding may use.
pub const MAX_BINDING_INDEX: usize = 31;

/// A route bound to its controller, with bindings sorted once at mount time.
#[derive(Clone)]
pub(crate) struct RouteAdapter {
    controller_token: Token,
    handler: Arc<str>,
    controller: Arc<dyn Controller>,
    bindings: Arc<[ParamBinding]>,
    arity: usize,
}

impl RouteAdapter {
    pub(crate) fn new(
        controller_token: Token,
        handler: &str,
        controller: Arc<dyn Controller>,
        declared: &[ParamBinding],
    ) -> Result<Self, ConfigError> {
        if let Some(b) = declared.iter().find(|b| b.index > MAX_BINDING_INDEX) {
            return Err(ConfigError::BindingIndexOutOfRange {
                controller: controller_token,
                handler: handler.to_string(),
                index: b.index,
                max: MAX_BINDING_INDEX,
            });
        }
        let mut bindings = declared.to_vec();
        // stable: equal indexes keep declaration order
        bindings.sort_by_key(|b| b.index);
        let arity = bindings.last().map_or(0, |b| b.index + 1);
        Ok(Self {
            controller_token,
            handler: Arc::from(handler),
            controller,
            bindings: bindings.into(),
            arity,
        })
    }

    pub(crate) async fn call(&self, req: Request) -> Response {
        let ctx = match RequestContext::from_request(req).await {
            Ok(ctx) => Arc::new(ctx),
            Err(err) => {
                tracing::debug!(
                    controller = %self.controller_token,
                    handler = %self.handler,
                    error = %err,
                    "Rejected request before dispatch"
                );
                return err.into_response();
            }
        };
        let args = self.extract(&ctx);
        let result = self.controller.invoke(&self.handler, args).await;
        self.finish(&ctx, result)
    }

    fn extract(&self, ctx: &Arc<RequestContext>) -> Args {
        let mut slots: Vec<Option<Argument>> = vec![None; self.arity];
        for binding in self.bindings.iter() {
            let section = match binding.kind {
                ParamKind::Context => {
                    slots[binding.index] = Some(Argument::Context(ctx.clone()));
                    continue;
                }
                ParamKind::Body => Section::Body,
                ParamKind::Query => Section::Query,
                ParamKind::Param => Section::Params,
                ParamKind::Headers => Section::Headers,
                ParamKind::Cookie => Section::Cookies,
            };
            let source = ctx.section(section);
            let value = match &binding.key {
                Some(key) => source.get(key.as_str()).cloned(),
                None => Some(source.clone()),
            };
            slots[binding.index] = value.map(Argument::Value);
        }
        Args::new(slots)
    }

    fn finish(&self, ctx: &RequestContext, result: HandlerResult) -> Response {
        let status = ctx.status();
        if let Some(mut written) = ctx.take_written() {
            if let Err(err) = &result {
                tracing::warn!(
                    controller = %self.controller_token,
                    handler = %self.handler,
                    error = %err,
                    "Handler failed after writing its own response"
                );
            }
            written.headers_mut().extend(ctx.take_headers());
            return written;
        }

        let mut response = match result {
            Ok(Some(value)) => (status.unwrap_or(StatusCode::OK), Json(value)).into_response(),
            Ok(None) => status.unwrap_or(StatusCode::NO_CONTENT).into_response(),
            Err(err) => {
                let code = err.resolve_status(status);
                if code.is_server_error() {
                    tracing::error!(
                        controller = %self.controller_token,
                        handler = %self.handler,
                        status = code.as_u16(),
                        error = %err,
                        "Handler failed"
                    );
                } else {
                    tracing::debug!(
                        controller = %self.controller_token,
                        handler = %self.handler,
                        status = code.as_u16(),
                        error = %err,
                        "Handler rejected request"
                    );
                }
                err.into_response_with(status)
            }
        };
        response.headers_mut().extend(ctx.take_headers());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use crate::dispatch::HttpError;

    /// Records the values it was called with.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Option<Value>>>,
    }

    #[async_trait]
    impl Controller for Recorder {
        async fn invoke(&self, handler: &str, args: Args) -> HandlerResult {
            let values = (0..args.len())
                .map(|i| args.value(i).cloned())
                .collect::<Vec<_>>();
            *self.seen.lock() = values;
            match handler {
                "ok" => Ok(Some(json!({"ok": true}))),
                "empty" => Ok(None),
                "created" => {
                    let ctx = args.context(0).ok_or_else(|| HttpError::bad_request("no ctx"))?;
                    ctx.set_status(StatusCode::CREATED);
                    ctx.insert_header(
                        http::header::LOCATION,
                        http::HeaderValue::from_static("/things/1"),
                    );
                    Ok(Some(json!({"id": 1})))
                }
                "written" => {
                    let ctx = args.context(0).ok_or_else(|| HttpError::bad_request("no ctx"))?;
                    ctx.insert_header(
                        http::header::CACHE_CONTROL,
                        http::HeaderValue::from_static("no-store"),
                    );
                    ctx.respond((StatusCode::ACCEPTED, "queued"));
                    Ok(Some(json!({"ignored": true})))
                }
                "written_then_failed" => {
                    let ctx = args.context(0).ok_or_else(|| HttpError::bad_request("no ctx"))?;
                    ctx.respond((StatusCode::ACCEPTED, "queued"));
                    Err(HttpError::bad_request("late failure"))
                }
                "conflict" => {
                    let ctx = args.context(0).ok_or_else(|| HttpError::bad_request("no ctx"))?;
                    ctx.set_status(StatusCode::CONFLICT);
                    Err(HttpError::msg("already exists"))
                }
                other => Err(HttpError::unknown_handler(other)),
            }
        }
    }

    fn adapter(handler: &str, bindings: &[ParamBinding]) -> (RouteAdapter, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let adapter =
            RouteAdapter::new(Token::new("rec"), handler, recorder.clone(), bindings).unwrap();
        (adapter, recorder)
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn bindings_are_placed_by_index_not_declaration_order() {
        let (adapter, recorder) = adapter(
            "ok",
            &[ParamBinding::query(1).key("page"), ParamBinding::body(0)],
        );
        let resp = adapter.call(get("/x?page=2")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            *recorder.seen.lock(),
            vec![Some(json!({})), Some(json!("2"))]
        );
    }

    #[tokio::test]
    async fn gaps_and_missing_keys_are_absent() {
        let (adapter, recorder) = adapter(
            "ok",
            &[ParamBinding::query(2).key("nope"), ParamBinding::query(1)],
        );
        adapter.call(get("/x?a=1")).await;
        assert_eq!(
            *recorder.seen.lock(),
            vec![None, Some(json!({"a": "1"})), None]
        );
    }

    #[tokio::test]
    async fn empty_result_is_no_content() {
        let (adapter, _) = adapter("empty", &[]);
        let resp = adapter.call(get("/x")).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn handler_status_and_headers_are_applied() {
        let (adapter, _) = adapter("created", &[ParamBinding::context(0)]);
        let resp = adapter.call(get("/x")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()[http::header::LOCATION], "/things/1");
    }

    #[tokio::test]
    async fn error_uses_status_set_by_the_handler() {
        let (adapter, _) = adapter("conflict", &[ParamBinding::context(0)]);
        let resp = adapter.call(get("/x")).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({"message": "already exists", "status": 409}));
    }

    #[test]
    fn oversized_binding_index_is_rejected_at_mount() {
        for index in [MAX_BINDING_INDEX + 1, usize::MAX] {
            let err = RouteAdapter::new(
                Token::new("rec"),
                "ok",
                Arc::new(Recorder::default()),
                &[ParamBinding::body(index)],
            )
            .err()
            .expect("index should be rejected");
            assert!(matches!(
                err,
                ConfigError::BindingIndexOutOfRange { index: i, .. } if i == index
            ));
        }
        assert!(RouteAdapter::new(
            Token::new("rec"),
            "ok",
            Arc::new(Recorder::default()),
            &[ParamBinding::body(MAX_BINDING_INDEX)],
        )
        .is_ok());
    }

    async fn text_body(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn written_response_wins_over_the_returned_value() {
        let (adapter, _) = adapter("written", &[ParamBinding::context(0)]);
        let resp = adapter.call(get("/x")).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(resp.headers()[http::header::CACHE_CONTROL], "no-store");
        assert_eq!(text_body(resp).await, "queued");
    }

    #[tokio::test]
    async fn written_response_wins_over_a_later_error() {
        let (adapter, _) = adapter("written_then_failed", &[ParamBinding::context(0)]);
        let resp = adapter.call(get("/x")).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(text_body(resp).await, "queued");
    }

    #[tokio::test]
    async fn unbound_body_is_not_parsed_for_other_media_types() {
        let (adapter, recorder) = adapter("ok", &[]);
        let req = Request::builder()
            .method("POST")
            .uri("/x")
            .header(http::header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(vec![0xff_u8, 0x00, 0x12]))
            .unwrap();
        let resp = adapter.call(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(recorder.seen.lock().is_empty());
    }
}
