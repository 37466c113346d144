//! Hook pipeline.
//!
//! # Data Flow
//! ```text
//! construct ─┬─ GET/HEAD ─→ [cache probe] ─hit─→ replay ─→ (304?) done
//!            │                   │miss
//!            │                   ↓
//!            │              describe ─→ (304?) ─→ present (not HEAD) ─→ finalize
//!            ├─ DELETE ────→ erase
//!            ├─ PUT/PATCH ─→ modify
//!            └─ other ─────→ call
//! ```
//!
//! # Design Decisions
//! - `done` set by any hook stops the pipeline; the hook owns the response
//! - A deferred task stops the pipeline without finalizing; whoever runs
//!   the task calls [`complete`] exactly once
//! - Only successful GET responses are stored; HEAD never stores because
//!   it never produces a body
//! - Hooks write identity bodies. The negotiated content coding is applied
//!   at finalization, after the signature is computed over the plain body
//! - A cached entry keeps the coding it was stored in and re-encodes for
//!   clients that negotiated a different one

use std::time::{Duration, Instant};

use axum::http::{header, HeaderValue, Method};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::cache::{CacheEntry, CacheKeyBuilder};
use crate::error::DispatchError;
use crate::negotiation::Encoding;
use crate::rest::conditional::is_not_modified;
use crate::rest::representation::{HookKind, Representation};
use crate::rest::{CacheDuration, Context, Response};

/// Debug header naming the composite key a response was replayed from.
pub const CACHED_HEADER: &str = "x-facet-cached";

/// Run the lifecycle of `representation` against `ctx`.
pub fn run(representation: &Representation, ctx: &mut Context) -> Result<(), DispatchError> {
    if ctx.cache_key.is_empty() {
        ctx.cache_key = CacheKeyBuilder::default_key(&ctx.request);
    }

    if run_hook(representation, HookKind::Construct, ctx)? {
        return Ok(());
    }

    let method = ctx.request.method.clone();
    match method {
        Method::GET | Method::HEAD => {
            if replay_cached(ctx) {
                return Ok(());
            }

            if run_hook(representation, HookKind::Describe, ctx)? {
                return Ok(());
            }

            if (ctx.response.signature.is_some() || ctx.response.timestamp.is_some())
                && is_not_modified(&ctx.request.headers, &ctx.response)
            {
                tracing::debug!(context = ctx.name(), "Not modified after describe");
                ctx.response.apply_metadata_headers();
                if let Some(value) = cache_control(&ctx.cache_duration) {
                    ctx.response.headers.insert(header::CACHE_CONTROL, value);
                }
                apply_coding_headers(&mut ctx.response);
                ctx.response.not_modified();
                return Ok(());
            }

            if method == Method::GET && run_hook(representation, HookKind::Present, ctx)? {
                return Ok(());
            }
        }
        Method::DELETE => {
            if run_hook(representation, HookKind::Erase, ctx)? {
                return Ok(());
            }
        }
        Method::PUT | Method::PATCH => {
            if run_hook(representation, HookKind::Modify, ctx)? {
                return Ok(());
            }
        }
        _ => {
            if run_hook(representation, HookKind::Call, ctx)? {
                return Ok(());
            }
        }
    }

    complete(ctx);
    Ok(())
}

/// Run one hook. Returns `true` when the pipeline must stop.
fn run_hook(representation: &Representation, kind: HookKind, ctx: &mut Context) -> Result<bool, DispatchError> {
    if let Some(hook) = representation.hooks().get(kind) {
        tracing::trace!(context = ctx.name(), hook = %kind, "Running hook");
        hook(ctx).map_err(|source| DispatchError::Hook {
            hook: kind,
            representation: representation.label(),
            source,
        })?;
    }
    Ok(ctx.done || ctx.is_deferred())
}

/// Finalize the response: signature, headers, cache store, conditional check.
pub(crate) fn complete(ctx: &mut Context) {
    if ctx.done {
        return;
    }

    if ctx.response.signature.is_none() && !ctx.response.body.is_empty() {
        let digest = Sha256::digest(&ctx.response.body);
        ctx.response.signature = Some(hex::encode(digest));
    }
    if ctx.response.timestamp.is_none() {
        ctx.response.timestamp = Some(OffsetDateTime::now_utc());
    }

    encode_body(ctx);
    ctx.response.apply_metadata_headers();
    if let Some(value) = cache_control(&ctx.cache_duration) {
        ctx.response.headers.insert(header::CACHE_CONTROL, value);
    }

    if ctx.request.is_safe() {
        store(ctx);
        if is_not_modified(&ctx.request.headers, &ctx.response) {
            ctx.response.not_modified();
        }
    }
}

/// Apply the negotiated content coding to the body. A body that fails to
/// encode is sent as identity.
fn encode_body(ctx: &mut Context) {
    let encoding = ctx.response.encoding;
    if encoding.is_identity() {
        return;
    }
    if ctx.response.body.is_empty() {
        ctx.response.encoding = Encoding::Identity;
        return;
    }

    match encoding.encode(&ctx.response.body) {
        Ok(encoded) => {
            ctx.response.body = encoded;
            apply_coding_headers(&mut ctx.response);
        }
        Err(e) => {
            tracing::warn!(context = ctx.name(), encoding = %encoding, error = %e, "Body encoding failed, sending identity");
            ctx.response.encoding = Encoding::Identity;
        }
    }
}

fn apply_coding_headers(response: &mut Response) {
    if response.encoding.is_identity() {
        return;
    }
    response
        .headers
        .insert(header::CONTENT_ENCODING, HeaderValue::from_static(response.encoding.as_str()));
    response
        .headers
        .insert(header::VARY, HeaderValue::from_static("accept-encoding"));
}

fn cache_control(duration: &CacheDuration) -> Option<HeaderValue> {
    match duration {
        CacheDuration::NoStore => Some(HeaderValue::from_static("no-store,max-age=0")),
        CacheDuration::For(ttl) => max_age(*ttl),
        CacheDuration::Unset => None,
    }
}

fn max_age(ttl: Duration) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("max-age={}", ttl.as_secs())).ok()
}

/// Headers that depend on the moment or the coding of one response.
const UNSTORED_HEADERS: [header::HeaderName; 4] =
    [header::CACHE_CONTROL, header::CONTENT_ENCODING, header::VARY, header::ETAG];

fn store(ctx: &Context) {
    let (Some(cache), Some(ttl)) = (ctx.cache(), ctx.cache_duration.ttl()) else {
        return;
    };
    if ctx.request.method != Method::GET || !ctx.response.status.is_success() {
        return;
    }
    let Some(key) = CacheKeyBuilder::derive(ctx) else {
        return;
    };

    let headers = ctx
        .response
        .headers
        .iter()
        .filter(|(name, _)| !UNSTORED_HEADERS.contains(*name))
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();

    let entry = CacheEntry {
        status: ctx.response.status.as_u16(),
        headers,
        bodies: [(ctx.response.encoding, Bytes::copy_from_slice(&ctx.response.body))].into(),
        signature: ctx.response.signature.clone(),
        weak_signature: ctx.response.weak_signature,
        timestamp: ctx.response.timestamp,
        groups: CacheKeyBuilder::groups(ctx),
        expires_at: Instant::now().checked_add(ttl),
    };

    tracing::debug!(context = ctx.name(), cache_key = %key, ttl_secs = ttl.as_secs(), groups = ?entry.groups, "Storing representation");
    cache.store(key, entry);
}

/// Serve the request from cache if possible. Returns `true` on a hit.
fn replay_cached(ctx: &mut Context) -> bool {
    if ctx.cache_duration.ttl().is_none() {
        return false;
    }
    let (Some(cache), Some(key)) = (ctx.cache(), CacheKeyBuilder::derive(ctx)) else {
        return false;
    };
    let Some(entry) = cache.load(&key) else {
        return false;
    };

    let is_head = ctx.request.method == Method::HEAD;
    if !is_head && entry.is_empty() {
        tracing::debug!(context = ctx.name(), cache_key = %key, "Ignoring cached entry without body");
        return false;
    }

    let body = if is_head {
        Vec::new()
    } else {
        match entry.body(ctx.response.encoding) {
            Some(body) => body.to_vec(),
            None => {
                tracing::debug!(context = ctx.name(), cache_key = %key, encoding = %ctx.response.encoding, "Cached entry unusable for coding");
                return false;
            }
        }
    };

    tracing::debug!(context = ctx.name(), cache_key = %key, "Cache hit");
    let response = &mut ctx.response;
    if let Ok(status) = axum::http::StatusCode::from_u16(entry.status) {
        response.status = status;
    }
    for (name, value) in &entry.headers {
        response.set_header(name, value);
    }
    if let Some(value) = entry.time_to_live(Instant::now()).and_then(max_age) {
        response.headers.insert(header::CACHE_CONTROL, value);
    }
    if ctx.debug {
        response.set_header(CACHED_HEADER, key.as_str());
    }

    response.signature = entry.signature;
    response.weak_signature = entry.weak_signature;
    response.timestamp = entry.timestamp;
    response.apply_metadata_headers();
    apply_coding_headers(response);
    response.body = body;

    if is_not_modified(&ctx.request.headers, &ctx.response) {
        ctx.response.not_modified();
    }
    ctx.done = true;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, CacheBackend, CacheKey, MapBackend, WritePolicy};
    use crate::error::HookError;
    use crate::rest::Request;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn cache() -> (Arc<MapBackend>, Cache) {
        let backend = Arc::new(MapBackend::new("map", Duration::from_secs(10)));
        (backend.clone(), Cache::new(backend, WritePolicy::Synchronous))
    }

    fn context(request: Request, cache: &Cache) -> Context {
        let mut ctx = Context::new(request).with_cache(Some(cache.clone()));
        ctx.response.content_type = Some("text/plain".into());
        ctx.response.charset = Some("utf-8".into());
        ctx
    }

    fn counting_representation(presents: Arc<AtomicUsize>) -> Representation {
        Representation::new()
            .content_types(["text/plain"])
            .construct(|ctx| {
                ctx.cache_key = "person:alice".into();
                ctx.cache_duration = CacheDuration::For(Duration::from_secs(5));
                ctx.add_cache_group("person:alice");
                Ok(())
            })
            .present(move |ctx| {
                presents.fetch_add(1, Ordering::SeqCst);
                ctx.write_str("alice");
                Ok(())
            })
    }

    #[test]
    fn test_cache_miss_then_hit_then_invalidate() {
        let (backend, cache) = cache();
        let presents = Arc::new(AtomicUsize::new(0));
        let rep = counting_representation(presents.clone());

        let mut first = context(Request::get("/person/alice"), &cache);
        run(&rep, &mut first).unwrap();
        assert_eq!(first.response.body, b"alice");
        assert_eq!(first.response.headers[header::CACHE_CONTROL], "max-age=5");
        assert_eq!(presents.load(Ordering::SeqCst), 1);
        assert!(backend
            .get(&CacheKey::from("person:alice|text/plain|utf-8|"))
            .unwrap()
            .is_some());

        let mut second = context(Request::get("/person/alice"), &cache);
        second.debug = true;
        run(&rep, &mut second).unwrap();
        assert_eq!(second.response.body, b"alice");
        assert_eq!(presents.load(Ordering::SeqCst), 1);
        assert_eq!(
            second.response.headers[CACHED_HEADER],
            "person:alice|text/plain|utf-8|"
        );

        cache.invalidate_group("person:alice");
        let mut third = context(Request::get("/person/alice"), &cache);
        run(&rep, &mut third).unwrap();
        assert_eq!(presents.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_automatic_signature_and_conditional_get() {
        let (_, cache) = cache();
        let rep = Representation::new().present(|ctx| {
            ctx.write_str("hello");
            Ok(())
        });

        let mut ctx = context(Request::get("/greeting"), &cache);
        run(&rep, &mut ctx).unwrap();
        let expected = hex::encode(Sha256::digest(b"hello"));
        assert_eq!(ctx.response.signature.as_deref(), Some(expected.as_str()));
        let etag = ctx.response.headers[header::ETAG].to_str().unwrap().to_string();
        assert!(ctx.response.headers.contains_key(header::LAST_MODIFIED));

        let request = Request::get("/greeting").with_header("if-none-match", &etag);
        let mut ctx = context(request, &cache);
        run(&rep, &mut ctx).unwrap();
        assert_eq!(ctx.response.status, StatusCode::NOT_MODIFIED);
        assert!(ctx.response.body.is_empty());
    }

    #[test]
    fn test_describe_short_circuits_present() {
        let (_, cache) = cache();
        let presents = Arc::new(AtomicUsize::new(0));
        let counter = presents.clone();
        let rep = Representation::new()
            .describe(|ctx| {
                ctx.set_signature("v1", false);
                Ok(())
            })
            .present(move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                ctx.write_str("body");
                Ok(())
            });

        let request = Request::get("/doc").with_header("if-none-match", "\"v1\"");
        let mut ctx = context(request, &cache);
        run(&rep, &mut ctx).unwrap();
        assert_eq!(ctx.response.status, StatusCode::NOT_MODIFIED);
        assert_eq!(presents.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_not_modified_after_describe_keeps_cache_control() {
        let (_, cache) = cache();
        let rep = Representation::new()
            .construct(|ctx| {
                ctx.cache_duration = CacheDuration::For(Duration::from_secs(30));
                Ok(())
            })
            .describe(|ctx| {
                ctx.set_signature("v1", false);
                Ok(())
            });

        let request = Request::get("/doc").with_header("if-none-match", "\"v1\"");
        let mut ctx = context(request, &cache);
        run(&rep, &mut ctx).unwrap();
        assert_eq!(ctx.response.status, StatusCode::NOT_MODIFIED);
        assert_eq!(ctx.response.headers[header::CACHE_CONTROL], "max-age=30");
        assert_eq!(ctx.response.headers[header::ETAG], "\"v1\"");
    }

    #[test]
    fn test_gzip_response_and_reencoded_hit() {
        let (backend, cache) = cache();
        let presents = Arc::new(AtomicUsize::new(0));
        let rep = counting_representation(presents.clone());
        let plain = hex::encode(Sha256::digest(b"alice"));

        let mut first = context(Request::get("/person/alice"), &cache);
        first.response.encoding = Encoding::Gzip;
        run(&rep, &mut first).unwrap();
        assert_eq!(first.response.headers[header::CONTENT_ENCODING], "gzip");
        assert_eq!(first.response.headers[header::VARY], "accept-encoding");
        assert_eq!(Encoding::Gzip.decode(&first.response.body).unwrap(), b"alice");
        assert_eq!(first.response.signature.as_deref(), Some(plain.as_str()));
        assert_eq!(first.response.headers[header::ETAG], format!("\"{}-gzip\"", plain));

        let stored = backend
            .get(&CacheKey::from("person:alice|text/plain|utf-8|"))
            .unwrap()
            .unwrap();
        assert!(stored.headers.iter().all(|(name, _)| name != "content-encoding" && name != "etag"));

        let mut deflate = context(Request::get("/person/alice"), &cache);
        deflate.response.encoding = Encoding::Deflate;
        run(&rep, &mut deflate).unwrap();
        assert_eq!(presents.load(Ordering::SeqCst), 1);
        assert_eq!(deflate.response.headers[header::CONTENT_ENCODING], "deflate");
        assert_eq!(Encoding::Deflate.decode(&deflate.response.body).unwrap(), b"alice");
        assert_eq!(deflate.response.headers[header::ETAG], format!("\"{}-deflate\"", plain));

        let mut identity = context(Request::get("/person/alice"), &cache);
        run(&rep, &mut identity).unwrap();
        assert_eq!(presents.load(Ordering::SeqCst), 1);
        assert_eq!(identity.response.body, b"alice");
        assert!(identity.response.headers.get(header::CONTENT_ENCODING).is_none());
        assert_eq!(identity.response.headers[header::ETAG], format!("\"{}\"", plain));
    }

    #[test]
    fn test_empty_body_is_never_encoded() {
        let (_, cache) = cache();
        let rep = Representation::new().erase(|ctx| {
            ctx.response.status = StatusCode::NO_CONTENT;
            Ok(())
        });

        let mut ctx = context(Request::new(Method::DELETE, "/x"), &cache);
        ctx.response.encoding = Encoding::Gzip;
        run(&rep, &mut ctx).unwrap();
        assert!(ctx.response.body.is_empty());
        assert_eq!(ctx.response.encoding, Encoding::Identity);
        assert!(ctx.response.headers.get(header::CONTENT_ENCODING).is_none());
    }

    #[test]
    fn test_head_skips_present_and_store() {
        let (backend, cache) = cache();
        let presents = Arc::new(AtomicUsize::new(0));
        let rep = counting_representation(presents.clone());

        let mut ctx = context(Request::new(Method::HEAD, "/person/alice"), &cache);
        run(&rep, &mut ctx).unwrap();
        assert_eq!(presents.load(Ordering::SeqCst), 0);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_negative_duration_is_not_stored() {
        let (backend, cache) = cache();
        let rep = Representation::new()
            .construct(|ctx| {
                ctx.cache_duration = CacheDuration::from_secs_f64(-1.0);
                Ok(())
            })
            .present(|ctx| {
                ctx.write_str("secret");
                Ok(())
            });

        let mut ctx = context(Request::get("/secret"), &cache);
        run(&rep, &mut ctx).unwrap();
        assert_eq!(ctx.response.headers[header::CACHE_CONTROL], "no-store,max-age=0");
        assert!(backend.is_empty());
    }

    #[test]
    fn test_empty_cached_body_is_a_miss_for_get() {
        let (backend, cache) = cache();
        let presents = Arc::new(AtomicUsize::new(0));
        let rep = counting_representation(presents.clone());
        backend
            .set(
                &CacheKey::from("person:alice|text/plain|utf-8|"),
                CacheEntry::new(Bytes::new(), Duration::from_secs(5)),
            )
            .unwrap();

        let mut head = context(Request::new(Method::HEAD, "/person/alice"), &cache);
        run(&rep, &mut head).unwrap();
        assert!(head.done);

        let mut get = context(Request::get("/person/alice"), &cache);
        run(&rep, &mut get).unwrap();
        assert_eq!(presents.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mutating_methods_map_to_hooks() {
        let (_, cache) = cache();
        let rep = Representation::new()
            .erase(|ctx| {
                ctx.response.status = StatusCode::NO_CONTENT;
                Ok(())
            })
            .modify(|ctx| {
                ctx.write_str("modified");
                Ok(())
            })
            .call(|ctx| {
                ctx.write_str("called");
                Ok(())
            });

        let mut ctx = context(Request::new(Method::DELETE, "/x"), &cache);
        run(&rep, &mut ctx).unwrap();
        assert_eq!(ctx.response.status, StatusCode::NO_CONTENT);

        let mut ctx = context(Request::new(Method::PATCH, "/x"), &cache);
        run(&rep, &mut ctx).unwrap();
        assert_eq!(ctx.response.body, b"modified");

        let mut ctx = context(Request::new(Method::POST, "/x"), &cache);
        run(&rep, &mut ctx).unwrap();
        assert_eq!(ctx.response.body, b"called");
    }

    #[test]
    fn test_hook_error_names_hook_and_representation() {
        let (_, cache) = cache();
        let rep = Representation::new()
            .content_types(["application/json"])
            .present(|_| Err(HookError::msg("database down")));

        let mut ctx = context(Request::get("/x"), &cache);
        let err = run(&rep, &mut ctx).unwrap_err();
        match err {
            DispatchError::Hook { hook, representation, .. } => {
                assert_eq!(hook, HookKind::Present);
                assert_eq!(representation, "application/json");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_deferred_stops_before_finalize() {
        let (backend, cache) = cache();
        let rep = counting_representation(Arc::new(AtomicUsize::new(0))).present(|ctx| {
            ctx.defer(|ctx| {
                ctx.write_str("later");
                Ok(())
            });
            Ok(())
        });

        let mut ctx = context(Request::get("/person/alice"), &cache);
        run(&rep, &mut ctx).unwrap();
        assert!(ctx.is_deferred());
        assert!(ctx.response.headers.get(header::ETAG).is_none());
        assert!(backend.is_empty());

        let task = ctx.take_deferred().unwrap();
        task(&mut ctx).unwrap();
        complete(&mut ctx);
        assert_eq!(ctx.response.body, b"later");
        assert_eq!(backend.len(), 1);
    }
}
