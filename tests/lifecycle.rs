use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};
use stratum::{
    Declaration, Declare as _, Environment, Identifier, IgnorePolicy, LifecycleErrorKind, Lookup as _, Qualifier, Service, ServiceState,
    Verb,
};
use tokio::time::{sleep, Instant};

/// Service recording its own transitions.
#[derive(Default)]
struct Recorder {
    state: Mutex<Option<&'static str>>,
    starts: AtomicU8,
    stops: AtomicU8,
}

impl Recorder {
    fn state(&self) -> Option<&'static str> {
        *self.state.lock()
    }
}

impl Service for Recorder {
    async fn start(&self) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = Some("started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = Some("stopped");
        Ok(())
    }
}

struct Sleeper;

impl Service for Sleeper {
    async fn start(&self) -> anyhow::Result<()> {
        sleep(Duration::from_millis(1000)).await;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Failing;

impl Service for Failing {
    async fn start(&self) -> anyhow::Result<()> {
        anyhow::bail!("port is already in use")
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Stubborn;

impl Service for Stubborn {
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        anyhow::bail!("connections are still open")
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_start() {
    let mut builder = Environment::builder();
    builder.install_services().unwrap();
    for index in 0..5 {
        builder
            .declare(Declaration::service(|_| Ok(Sleeper)).qualified(format!("sleeper-{index}")))
            .unwrap();
    }
    let environment = builder.build().unwrap();

    let started = Instant::now();
    let elapsed = environment.services().unwrap().start_all(|_| {}).await.unwrap();
    let total = started.elapsed();

    assert_eq!(elapsed.len(), 5);
    assert!(elapsed.values().all(|duration| *duration >= Duration::from_millis(1000)));
    assert!(total >= Duration::from_millis(1000));
    assert!(total < Duration::from_millis(1500), "services started sequentially in {total:?}");
}

#[tokio::test]
async fn test_start_then_stop() {
    let mut builder = Environment::builder();
    builder.install_services().unwrap().provide_service(|_| Ok(Recorder::default())).unwrap();
    let environment = builder.build().unwrap();
    let services = environment.services().unwrap();
    let identifier = Identifier::of::<Recorder>();

    assert_eq!(services.state(&identifier), Some(ServiceState::Initialized));

    let mut lines = Vec::new();
    services.start_all(|line| lines.push(line.to_owned())).await.unwrap();
    assert_eq!(services.state(&identifier), Some(ServiceState::Started));

    services.stop_all(|line| lines.push(line.to_owned())).await.unwrap();
    assert_eq!(services.state(&identifier), Some(ServiceState::Stopped));

    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Started Recorder in "));
    assert!(lines[1].starts_with("Stopped Recorder in "));
    assert_eq!(environment.get::<Recorder>().unwrap().state(), Some("stopped"));
}

#[tokio::test]
async fn test_alias_starts_once() {
    let mut builder = Environment::builder();
    builder
        .install_services()
        .unwrap()
        .declare(Declaration::service(|_| Ok(Recorder::default())).qualified("impl"))
        .unwrap()
        .declare(Declaration::alias_of::<Recorder>("impl"))
        .unwrap();
    let environment = builder.build().unwrap();

    let alias = environment.get::<Recorder>().unwrap();
    let target = environment.get_qualified::<Recorder>("impl").unwrap();
    assert!(Arc::ptr_eq(&alias, &target));

    let elapsed = environment.services().unwrap().start_all(|_| {}).await.unwrap();

    assert_eq!(elapsed.keys().collect::<Vec<_>>(), [&Identifier::qualified::<Recorder>("impl")]);
    assert_eq!(target.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exclusion_policies() {
    let mut builder = Environment::builder();
    builder
        .install_services()
        .unwrap()
        .declare(
            Declaration::service(|_| Ok(Recorder::default()))
                .qualified("start-ignored")
                .ignore(IgnorePolicy::Start),
        )
        .unwrap()
        .declare(
            Declaration::service(|_| Ok(Recorder::default()))
                .qualified("all-ignored")
                .ignore(IgnorePolicy::All),
        )
        .unwrap()
        .declare(Declaration::service(|_| Ok(Recorder::default())).qualified("managed"))
        .unwrap();
    let environment = builder.build().unwrap();
    let services = environment.services().unwrap();

    let start_ignored = environment.get_qualified::<Recorder>("start-ignored").unwrap();
    let all_ignored = environment.get_qualified::<Recorder>("all-ignored").unwrap();
    let managed = environment.get_qualified::<Recorder>("managed").unwrap();

    let started = services.start_all(|_| {}).await.unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(start_ignored.state(), None);
    assert_eq!(all_ignored.state(), None);
    assert_eq!(managed.state(), Some("started"));

    let stopped = services.stop_all(|_| {}).await.unwrap();
    assert_eq!(stopped.len(), 2);
    assert_eq!(start_ignored.state(), Some("stopped"));
    assert_eq!(all_ignored.state(), None);
    assert_eq!(managed.state(), Some("stopped"));

    assert_eq!(
        services.state(&Identifier::qualified::<Recorder>("all-ignored")),
        Some(ServiceState::Initialized)
    );
}

#[tokio::test]
async fn test_alias_policy_folds_to_all() {
    let mut builder = Environment::builder();
    builder
        .install_services()
        .unwrap()
        .declare(Declaration::service(|_| Ok(Recorder::default())).ignore(IgnorePolicy::Start))
        .unwrap()
        .declare(
            Declaration::alias_of::<Recorder>(Qualifier::Empty)
                .qualified("alias")
                .ignore(IgnorePolicy::Stop),
        )
        .unwrap();
    let environment = builder.build().unwrap();
    let services = environment.services().unwrap();

    assert!(services.start_all(|_| {}).await.unwrap().is_empty());
    assert!(services.stop_all(|_| {}).await.unwrap().is_empty());
    assert_eq!(environment.get::<Recorder>().unwrap().state(), None);
}

#[tokio::test]
async fn test_failure_wrapping() {
    let mut builder = Environment::builder();
    builder
        .install_services()
        .unwrap()
        .provide_service(|_| Ok(Failing))
        .unwrap()
        .provide_service(|_| Ok(Recorder::default()))
        .unwrap();
    let environment = builder.build().unwrap();

    let err = environment.services().unwrap().start_all(|_| {}).await.unwrap_err();

    match &err {
        LifecycleErrorKind::ServiceOperationFailed { identifier, verb, source } => {
            assert_eq!(*identifier, Identifier::of::<Failing>());
            assert_eq!(*verb, Verb::Start);
            assert_eq!(source.to_string(), "port is already in use");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("starting"));
    assert!(err.to_string().contains("Failing"));

    // Siblings run to completion
    assert_eq!(environment.get::<Recorder>().unwrap().state(), Some("started"));
}

#[tokio::test]
async fn test_stop_failure_wrapping() {
    let mut builder = Environment::builder();
    builder
        .install_services()
        .unwrap()
        .provide_service(|_| Ok(Stubborn))
        .unwrap()
        .provide_service(|_| Ok(Recorder::default()))
        .unwrap();
    let environment = builder.build().unwrap();
    let services = environment.services().unwrap();

    services.start_all(|_| {}).await.unwrap();
    let err = services.stop_all(|_| {}).await.unwrap_err();

    match &err {
        LifecycleErrorKind::ServiceOperationFailed { identifier, verb, source } => {
            assert_eq!(*identifier, Identifier::of::<Stubborn>());
            assert_eq!(*verb, Verb::Stop);
            assert_eq!(source.to_string(), "connections are still open");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("stopping"));
    assert!(err.to_string().contains("Stubborn"));

    assert_eq!(services.state(&Identifier::of::<Stubborn>()), Some(ServiceState::Started));
    assert_eq!(services.state(&Identifier::of::<Recorder>()), Some(ServiceState::Stopped));
}

#[tokio::test]
async fn test_unresolvable_service() {
    let mut builder = Environment::builder();
    builder
        .install_services()
        .unwrap()
        .provide_service::<Recorder, _>(|_| Err(anyhow::anyhow!("no config").into()))
        .unwrap();
    let environment = builder.build().unwrap();

    assert!(matches!(
        environment.services().unwrap().start_all(|_| {}).await,
        Err(LifecycleErrorKind::Resolve(_))
    ));
}

#[tokio::test]
async fn test_dropped_start_aborts_operations() {
    let mut builder = Environment::builder();
    builder.install_services().unwrap().provide_service(|_| Ok(Sleeper)).unwrap();
    let environment = builder.build().unwrap();
    let services = environment.services().unwrap();

    let result = tokio::time::timeout(Duration::from_millis(10), services.start_all(|_| {})).await;

    assert!(result.is_err());
    assert_eq!(services.state(&Identifier::of::<Sleeper>()), Some(ServiceState::Initialized));
}
