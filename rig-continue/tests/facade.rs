use async_trait::async_trait;
use rig_continue::prelude::*;
use rig_continue::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Answers in two halves: truncated first, then the rest.
struct Halves {
    calls: AtomicUsize,
}

#[async_trait]
impl GenerationProvider for Halves {
    fn name(&self) -> &str {
        "halves"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = request.messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        if last.starts_with("Continue from: ") {
            Ok(GenerationResponse::new("second.", FinishSignal::Stop))
        } else {
            Ok(GenerationResponse::new("first...", FinishSignal::Unknown))
        }
    }
}

struct Refuses;

#[async_trait]
impl GenerationProvider for Refuses {
    fn name(&self) -> &str {
        "refuses"
    }

    async fn generate(&self, _: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        Err(ProviderError::Permanent("no".to_string()))
    }
}

#[tokio::test]
async fn loops_built_from_settings_share_one_throttle() {
    let settings = Settings::from_toml_str("[generation]\nmodel = \"m\"\n").unwrap();
    let throttle = settings.throttle();
    let provider = Arc::new(Halves {
        calls: AtomicUsize::new(0),
    });

    let a = settings.build_loop(provider.clone(), throttle.clone()).unwrap();
    let b = settings.build_loop(provider.clone(), throttle.clone()).unwrap();
    let cancel = CancellationToken::new();

    let (ra, rb) = tokio::join!(
        a.generate_from_topic("", "one", &cancel),
        b.generate_from_topic("", "two", &cancel)
    );

    assert_eq!(ra.unwrap().0, "first...\nsecond.");
    assert_eq!(rb.unwrap().0, "first...\nsecond.");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    assert_eq!(throttle.dispatched(), 4);
}

#[tokio::test]
async fn orchestrator_errors_convert_into_facade_error() {
    let settings = Settings::default();
    let orchestrator = settings
        .build_loop(Arc::new(Refuses), settings.throttle())
        .unwrap();

    let err: Error = orchestrator
        .run(vec![Message::user("hi")], &CancellationToken::new())
        .await
        .unwrap_err()
        .into();

    assert!(matches!(
        err,
        Error::Continuation(ContinuationError::Provider(ProviderError::Permanent(_)))
    ));
}

#[test]
fn invalid_settings_refuse_to_build_a_loop() {
    let mut settings = Settings::default();
    settings.generation.max_attempts = 0;

    let result = settings.build_loop(Arc::new(Refuses), settings.throttle());
    assert!(matches!(
        result,
        Err(Error::Continuation(ContinuationError::InvalidConfig(_)))
    ));
}

#[test]
fn missing_settings_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Settings::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}
