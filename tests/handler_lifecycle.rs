// tests/handler_lifecycle.rs

mod common;
use crate::common::builders::{CommandConfigBuilder, ConfigFileBuilder};
use crate::common::fake_runner::FakeRunner;
use crate::common::init_tracing;

use std::sync::Arc;
use std::time::Duration;

use http_exec::app::App;
use http_exec::errors::{ExecutionError, HttpExecError, ValidationError};
use http_exec::exec::{CommandRunner, ExecutionResult};
use http_exec::handler::{HandlerState, Lifecycle, ProvisionContext, RequestHandler, ServeOutcome};
use http_exec::placeholder::RequestContext;
use http_exec::registry::AppRegistry;
use http_exec::types::LifecycleEvent;

fn context(runner: &FakeRunner) -> (Arc<AppRegistry>, ProvisionContext) {
    let registry = Arc::new(AppRegistry::new(Duration::from_millis(200)));
    let ctx = ProvisionContext {
        registry: Arc::clone(&registry),
        runner: Arc::new(runner.clone()) as Arc<dyn CommandRunner>,
        default_timeout_ms: 10_000,
    };
    (registry, ctx)
}

fn request(path: &str) -> RequestContext {
    RequestContext::new("POST", path)
}

#[tokio::test]
async fn walks_through_every_state() {
    init_tracing();
    let runner = FakeRunner::succeeding();
    let (_registry, ctx) = context(&runner);

    let mut handler =
        RequestHandler::new("hook", CommandConfigBuilder::new("true").path("/hook").build());
    assert_eq!(handler.state(), HandlerState::Unprovisioned);

    handler.provision(&ctx).unwrap();
    assert_eq!(handler.state(), HandlerState::Provisioned);

    handler.validate().unwrap();
    assert_eq!(handler.state(), HandlerState::Validated);

    let outcome = handler.serve(&request("/hook")).await;
    assert_eq!(outcome, ServeOutcome::Respond(ExecutionResult::Success));
    assert_eq!(handler.state(), HandlerState::Serving);

    handler.cleanup().await.unwrap();
    assert_eq!(handler.state(), HandlerState::CleanedUp);

    // Idempotent.
    handler.cleanup().await.unwrap();
    assert_eq!(handler.state(), HandlerState::CleanedUp);

    assert_eq!(runner.count_for("hook"), 1);
}

#[tokio::test]
async fn empty_executable_never_reaches_serving() {
    let runner = FakeRunner::succeeding();
    let (_registry, ctx) = context(&runner);

    let mut handler =
        RequestHandler::new("blank", CommandConfigBuilder::new("").path("/blank").build());
    handler.provision(&ctx).unwrap();

    match handler.validate() {
        Err(HttpExecError::Validation { command, source }) => {
            assert_eq!(command, "blank");
            assert_eq!(source, ValidationError::EmptyExecutable);
        }
        other => panic!("Expected EmptyExecutable, got {other:?}"),
    }
    assert_eq!(handler.state(), HandlerState::Provisioned);

    let outcome = handler.serve(&request("/blank")).await;
    assert_eq!(
        outcome,
        ServeOutcome::Respond(ExecutionResult::Failure(ExecutionError::NotReady))
    );
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn whitespace_executable_is_empty() {
    let runner = FakeRunner::succeeding();
    let (_registry, ctx) = context(&runner);

    let mut handler = RequestHandler::new(
        "spaces",
        CommandConfigBuilder::new("  \t ").path("/spaces").build(),
    );
    handler.provision(&ctx).unwrap();
    assert!(matches!(
        handler.validate(),
        Err(HttpExecError::Validation {
            source: ValidationError::EmptyExecutable,
            ..
        })
    ));
}

#[tokio::test]
async fn env_placeholder_resolving_to_empty_is_an_empty_executable() {
    const VAR: &str = "HTTP_EXEC_TEST_EMPTY_EXECUTABLE";
    // Only this test reads or writes the variable.
    unsafe { std::env::set_var(VAR, "") };

    let runner = FakeRunner::succeeding();
    let (_registry, ctx) = context(&runner);

    let mut handler = RequestHandler::new(
        "from-env",
        CommandConfigBuilder::new(&format!("{{env.{VAR}}}"))
            .path("/from-env")
            .build(),
    );
    handler.provision(&ctx).unwrap();
    assert_eq!(handler.spec().unwrap().executable, "");

    match handler.validate() {
        Err(HttpExecError::Validation { command, source }) => {
            assert_eq!(command, "from-env");
            assert_eq!(source, ValidationError::EmptyExecutable);
        }
        other => panic!("Expected EmptyExecutable, got {other:?}"),
    }

    let outcome = handler.serve(&request("/from-env")).await;
    assert_eq!(
        outcome,
        ServeOutcome::Respond(ExecutionResult::Failure(ExecutionError::NotReady))
    );
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn negative_timeout_fails_validation() {
    let runner = FakeRunner::succeeding();
    let (_registry, ctx) = context(&runner);

    let mut handler = RequestHandler::new(
        "neg",
        CommandConfigBuilder::new("true").path("/neg").timeout("-1s").build(),
    );
    handler.provision(&ctx).unwrap();
    assert!(matches!(
        handler.validate(),
        Err(HttpExecError::Validation {
            source: ValidationError::InvalidTimeout(-1000),
            ..
        })
    ));
}

#[tokio::test]
async fn serve_before_validate_is_refused() {
    let runner = FakeRunner::succeeding();
    let (_registry, ctx) = context(&runner);

    let mut handler =
        RequestHandler::new("early", CommandConfigBuilder::new("true").path("/early").build());

    let outcome = handler.serve(&request("/early")).await;
    assert!(matches!(outcome, ServeOutcome::Respond(ExecutionResult::Failure(ExecutionError::NotReady))));

    handler.provision(&ctx).unwrap();
    let outcome = handler.serve(&request("/early")).await;
    assert!(matches!(outcome, ServeOutcome::Respond(ExecutionResult::Failure(ExecutionError::NotReady))));
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn cleaned_up_handler_stops_serving_and_cannot_be_reprovisioned() {
    let runner = FakeRunner::succeeding();
    let (_registry, ctx) = context(&runner);

    let mut handler =
        RequestHandler::new("gone", CommandConfigBuilder::new("true").path("/gone").build());
    handler.provision(&ctx).unwrap();
    handler.validate().unwrap();
    handler.cleanup().await.unwrap();

    let outcome = handler.serve(&request("/gone")).await;
    assert!(matches!(outcome, ServeOutcome::Respond(ExecutionResult::Failure(ExecutionError::NotReady))));
    assert!(matches!(handler.provision(&ctx), Err(HttpExecError::Lifecycle(_))));
}

#[tokio::test]
async fn route_scoped_specs_are_never_registered() {
    let runner = FakeRunner::succeeding();
    let (registry, ctx) = context(&runner);

    let mut handler =
        RequestHandler::new("route", CommandConfigBuilder::new("true").path("/route").build());
    handler.provision(&ctx).unwrap();
    handler.provision(&ctx).unwrap();

    assert!(registry.is_empty());
    assert!(!registry.register(Arc::clone(handler.spec().unwrap())));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn non_route_spec_is_registered_exactly_once() {
    let runner = FakeRunner::succeeding();
    let (registry, ctx) = context(&runner);

    let mut handler = RequestHandler::new(
        "shared",
        CommandConfigBuilder::new("true").route_scoped(false).build(),
    );
    for _ in 0..3 {
        handler.provision(&ctx).unwrap();
    }

    assert_eq!(registry.len(), 1);
    assert!(registry.contains("shared"));
    handler.validate().unwrap();
}

#[tokio::test]
async fn pass_thru_hands_successful_requests_on() {
    let runner = FakeRunner::succeeding();
    let (_registry, ctx) = context(&runner);

    let mut handler = RequestHandler::new(
        "audit",
        CommandConfigBuilder::new("true").path("/audit").pass_thru(true).build(),
    );
    handler.provision(&ctx).unwrap();
    handler.validate().unwrap();

    assert_eq!(handler.serve(&request("/audit")).await, ServeOutcome::Next);
}

#[tokio::test]
async fn pass_thru_still_reports_failures() {
    let failure = ExecutionResult::Failure(ExecutionError::NonZeroExit {
        code: Some(1),
        message: "boom".into(),
    });
    let runner = FakeRunner::answering(failure.clone());
    let (_registry, ctx) = context(&runner);

    let mut handler = RequestHandler::new(
        "audit",
        CommandConfigBuilder::new("true").path("/audit").pass_thru(true).build(),
    );
    handler.provision(&ctx).unwrap();
    handler.validate().unwrap();

    assert_eq!(handler.serve(&request("/audit")).await, ServeOutcome::Respond(failure));
}

#[tokio::test]
async fn background_commands_use_start() {
    let runner = FakeRunner::succeeding();
    let (_registry, ctx) = context(&runner);

    let mut handler = RequestHandler::new(
        "bg",
        CommandConfigBuilder::new("true").path("/bg").foreground(false).build(),
    );
    handler.provision(&ctx).unwrap();
    handler.validate().unwrap();
    handler.serve(&request("/bg")).await;

    let calls = runner.invocations();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].detached);
    assert_eq!(calls[0].request_path.as_deref(), Some("/bg"));
}

#[tokio::test]
async fn app_runs_startup_and_shutdown_commands() {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .with_command("hook", CommandConfigBuilder::new("true").path("/hook").build())
        .with_command(
            "warmup",
            CommandConfigBuilder::new("true")
                .route_scoped(false)
                .at(LifecycleEvent::Startup)
                .build(),
        )
        .with_command(
            "flush",
            CommandConfigBuilder::new("true")
                .route_scoped(false)
                .at(LifecycleEvent::Shutdown)
                .build(),
        )
        .build();

    let runner = FakeRunner::succeeding();
    let registry = Arc::new(AppRegistry::new(Duration::from_millis(200)));
    let app = App::with_runner(&cfg, Arc::clone(&registry), Arc::new(runner.clone())).unwrap();

    assert_eq!(registry.len(), 2);
    assert_eq!(app.startup().await, 0);
    assert_eq!(runner.count_for("warmup"), 1);
    assert_eq!(runner.count_for("flush"), 0);

    let report = app.shutdown().await;
    assert!(report.is_clean());
    assert_eq!(runner.count_for("flush"), 1);
    assert_eq!(runner.count_for("hook"), 0);

    // Second shutdown is a no-op.
    app.shutdown().await;
    assert_eq!(runner.count_for("flush"), 1);

    for handler in app.handlers() {
        assert_eq!(handler.state(), HandlerState::CleanedUp);
    }
}

#[tokio::test]
async fn app_refuses_to_build_when_any_command_is_invalid() {
    let cfg = ConfigFileBuilder::new()
        .with_command("good", CommandConfigBuilder::new("true").path("/good").build())
        .with_command("bad", CommandConfigBuilder::new("").path("/bad").build())
        .build();

    let runner = FakeRunner::succeeding();
    let registry = Arc::new(AppRegistry::new(Duration::from_millis(200)));
    let result = App::with_runner(&cfg, registry, Arc::new(runner));
    assert!(matches!(
        result,
        Err(HttpExecError::Validation { ref command, .. }) if command == "bad"
    ));
}

#[tokio::test]
async fn lifecycle_failures_are_counted_not_fatal() {
    let cfg = ConfigFileBuilder::new()
        .with_command(
            "warmup",
            CommandConfigBuilder::new("true")
                .route_scoped(false)
                .at(LifecycleEvent::Startup)
                .build(),
        )
        .build();

    let runner = FakeRunner::answering(ExecutionResult::Failure(ExecutionError::TimedOut));
    let registry = Arc::new(AppRegistry::new(Duration::from_millis(200)));
    let app = App::with_runner(&cfg, registry, Arc::new(runner)).unwrap();
    assert_eq!(app.startup().await, 1);
}
