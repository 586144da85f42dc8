use http::Method;
use std::sync::Arc;

use super::Router;
use crate::dispatcher::{HandlerRequest, HandlerResponse};
use crate::error::{PatternError, RegistrationError};
use crate::upgrade::{ConnectionContext, ConnectionHandler};

fn ok(_: &mut HandlerRequest, _: &mut HandlerResponse) -> anyhow::Result<()> {
    Ok(())
}

fn tagged(tag: &'static str) -> impl Fn(&mut HandlerRequest, &mut HandlerResponse) -> anyhow::Result<()> {
    move |_req: &mut HandlerRequest, res: &mut HandlerResponse| {
        res.write_str(tag);
        Ok(())
    }
}

struct Silent;

impl ConnectionHandler for Silent {
    fn on_message(&mut self, _ctx: &ConnectionContext, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn patterns(router: &Router) -> Vec<String> {
    router
        .table()
        .routes()
        .iter()
        .map(|r| r.template().pattern().to_string())
        .collect()
}

#[test]
fn test_first_registered_route_wins() {
    let mut router = Router::new();
    router.get("/a/{id}", tagged("param")).unwrap();
    router.get("/a/1", tagged("literal")).unwrap();

    let (index, route) = router.table().match_route(&Method::GET, "/a/1").unwrap();
    assert_eq!(index, 0);
    assert_eq!(route.template().pattern(), "/a/{id}");
}

#[test]
fn test_method_must_match() {
    let mut router = Router::new();
    router.post("/items", ok).unwrap();
    assert!(router.table().match_route(&Method::GET, "/items").is_none());
    assert!(router.table().match_route(&Method::POST, "/items").is_some());
}

#[test]
fn test_duplicate_routes_are_kept_in_order() {
    let mut router = Router::new();
    router.get("/dup", tagged("first")).unwrap();
    router.get("/dup", tagged("second")).unwrap();
    assert_eq!(router.routes().len(), 2);
    let (index, _) = router.table().match_route(&Method::GET, "/dup").unwrap();
    assert_eq!(index, 0);
}

#[test]
fn test_nested_mount_composes_prefixes() {
    let mut router = Router::new();
    router
        .mount("/api", |api| {
            api.mount("/v1", |v1| {
                v1.post("/users/{id}", ok)?;
                Ok(())
            })?;
            api.get("/health", ok)?;
            Ok(())
        })
        .unwrap();
    router.get("/top", ok).unwrap();

    assert_eq!(patterns(&router), ["/api/v1/users/{id}", "/api/health", "/top"]);
    assert!(router
        .table()
        .match_route(&Method::POST, "/api/v1/users/5")
        .is_some());
}

#[test]
fn test_mount_pops_frame_when_closure_fails() {
    let mut router = Router::new();
    let err = router
        .mount("/broken", |r| {
            r.get("/ok", ok)?;
            r.get("/{bad", ok)?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::Pattern(PatternError::MalformedCapture { .. })
    ));

    router.get("/after", ok).unwrap();
    assert_eq!(patterns(&router), ["/broken/ok", "/after"]);
}

#[test]
fn test_mount_pops_frame_when_closure_panics() {
    let mut router = Router::new();
    let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        router.mount("/boom", |_| panic!("registration bug")).is_ok()
    }));
    assert!(panicked.is_err());

    router.get("/after", ok).unwrap();
    assert_eq!(patterns(&router), ["/after"]);
}

#[test]
fn test_unsupported_method_is_rejected() {
    let mut router = Router::new();
    let err = router.register(Method::PATCH, "/x", ok).unwrap_err();
    assert_eq!(
        err,
        RegistrationError::UnsupportedMethod {
            method: "PATCH".into()
        }
    );
    assert!(router.table().routes().is_empty());
}

#[test]
fn test_invalid_patterns_fail_registration() {
    let mut router = Router::new();
    assert_eq!(
        router.get("", ok).unwrap_err(),
        RegistrationError::Pattern(PatternError::Empty)
    );
    assert!(matches!(
        router.get("/a/{id}/{id}", ok).unwrap_err(),
        RegistrationError::Pattern(PatternError::DuplicateCapture { .. })
    ));
}

#[test]
fn test_filters_resolve_against_mount_prefix() {
    let mut router = Router::new();
    router.filter("", ok).unwrap();
    router
        .mount("/admin", |admin| {
            admin.filter("//", ok)?;
            Ok(())
        })
        .unwrap();

    let prefixes: Vec<_> = router
        .table()
        .filters()
        .iter()
        .map(|f| f.prefix().to_string())
        .collect();
    assert_eq!(prefixes, ["", "/admin/"]);
    assert!(router.table().filters()[0].matches("/anything"));
    assert!(router.table().filters()[1].matches("/admin/users"));
    assert!(!router.table().filters()[1].matches("/admin"));
}

#[test]
fn test_filter_is_string_prefix_not_template() {
    let mut router = Router::new();
    router.filter("/call", ok).unwrap();
    let filter = &router.table().filters()[0];
    assert!(filter.matches("/call"));
    assert!(filter.matches("/callback"));
    assert!(!filter.matches("/Call"));
}

#[test]
fn test_duplicate_upgrade_path_is_rejected() {
    let mut router = Router::new();
    router
        .upgrade("/echo", || Box::new(Silent) as Box<dyn ConnectionHandler>)
        .unwrap();
    let err = router
        .upgrade("//echo", || Box::new(Silent) as Box<dyn ConnectionHandler>)
        .unwrap_err();
    assert_eq!(
        err,
        RegistrationError::DuplicateUpgrade {
            path: "/echo".into()
        }
    );
}

#[test]
fn test_upgrade_paths_follow_mounts() {
    let mut router = Router::new();
    router
        .mount("/ws", |ws| {
            ws.upgrade_shared(
                "/chat",
                Arc::new(|| Box::new(Silent) as Box<dyn ConnectionHandler>),
            )?;
            Ok(())
        })
        .unwrap();
    let (_dispatcher, bridge) = router.build();
    assert!(bridge.is_upgrade_path("/ws/chat"));
    assert!(!bridge.is_upgrade_path("/ws/chat/"));
}

#[test]
fn test_empty_upgrade_path_is_rejected() {
    let mut router = Router::new();
    let err = router
        .upgrade("", || Box::new(Silent) as Box<dyn ConnectionHandler>)
        .unwrap_err();
    assert_eq!(err, RegistrationError::Pattern(PatternError::Empty));
}

#[test]
fn test_build_keeps_registration_order() {
    let mut router = Router::new();
    router
        .get("/one", ok)
        .and_then(|r| r.put("/two", ok))
        .and_then(|r| r.delete("/three", ok))
        .unwrap();
    let (dispatcher, _) = router.build();
    let methods: Vec<_> = dispatcher
        .table()
        .routes()
        .iter()
        .map(|r| r.method().clone())
        .collect();
    assert_eq!(methods, [Method::GET, Method::PUT, Method::DELETE]);
}

#[test]
fn test_filter_prefix_ignores_repeated_slashes() {
    let mut router = Router::new();
    router.filter("/admin", ok).unwrap();
    let table = router.table();
    assert_eq!(table.filters_for("/admin/users").count(), 1);
    assert_eq!(table.filters_for("//admin/users").count(), 1);
    assert_eq!(table.filters_for("/admin//users").count(), 1);
    assert_eq!(table.filters_for("/administrator").count(), 1);
    assert_eq!(table.filters_for("/public//admin").count(), 0);
}

#[test]
fn test_router_debug_lists_registrations() {
    let mut router = Router::new();
    router.get("/users/{id}", ok).unwrap();
    router.filter("/users", ok).unwrap();
    router
        .upgrade("/chat", || Box::new(Silent) as Box<dyn ConnectionHandler>)
        .unwrap();
    let debug = format!("{router:?}");
    assert!(debug.contains("/users/{id}"), "{debug}");
    assert!(debug.contains("\"/users\""), "{debug}");
    assert!(debug.contains("/chat"), "{debug}");
}
