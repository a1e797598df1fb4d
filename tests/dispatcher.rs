//! End-to-end dispatcher behavior against a scripted executor.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use multidns::executor::QueryExecutor;
use multidns::strategy::Strategy;
use multidns::{
    Answer, DnsResponse, Endpoint, EndpointKey, ErrorCode, ExecError, MultiResolver,
    MultiResolverError, MultiResolverOptions, Question, RecordType, ResponseStatus,
};

/// What the scripted executor does for one endpoint.
#[derive(Clone)]
enum Plan {
    /// Answer successfully after the given delay.
    Ok(Duration),
    /// Fail with a socket-level error.
    NetworkFail,
    /// Fail with a socket-level error after the given delay.
    NetworkFailAfter(Duration),
    /// Fail with a protocol decoding error.
    ProtocolFail,
    /// Fail with an unclassified executor error.
    OtherFail,
    /// Answer with a SERVFAIL status (the endpoint responded, badly).
    StatusServFail,
    /// Never answer; only a deadline or cancellation ends the attempt.
    Hang,
}

struct ScriptedExecutor {
    plans: HashMap<EndpointKey, Plan>,
    fail_names: HashSet<String>,
    log: Mutex<Vec<EndpointKey>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    fn new() -> Self {
        Self {
            plans: HashMap::new(),
            fail_names: HashSet::new(),
            log: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    fn plan(mut self, endpoint: &Endpoint, plan: Plan) -> Self {
        self.plans.insert(endpoint.key(), plan);
        self
    }

    fn fail_name(mut self, name: &str) -> Self {
        self.fail_names.insert(name.to_string());
        self
    }

    /// Number of attempts issued against `endpoint` so far.
    fn attempts(&self, endpoint: &Endpoint) -> usize {
        let key = endpoint.key();
        self.log.lock().unwrap().iter().filter(|k| **k == key).count()
    }

    /// Every attempt in issue order.
    fn attempt_order(&self) -> Vec<EndpointKey> {
        self.log.lock().unwrap().clone()
    }

    fn peak(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight gauge even when the attempt future is dropped
/// mid-sleep by a race winner's cancellation.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn query(
        &self,
        endpoint: &Endpoint,
        name: &str,
        record_type: RecordType,
        _token: &CancellationToken,
    ) -> Result<DnsResponse, ExecError> {
        self.log.lock().unwrap().push(endpoint.key());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        if self.fail_names.contains(name) {
            return Err(ExecError::Other(format!("scripted failure for {name}")));
        }

        let plan = self
            .plans
            .get(&endpoint.key())
            .cloned()
            .unwrap_or(Plan::Ok(Duration::from_millis(10)));
        match plan {
            Plan::Ok(delay) => {
                tokio::time::sleep(delay).await;
                Ok(DnsResponse::answered(
                    vec![Question::new(name, record_type)],
                    vec![Answer {
                        name: name.to_string(),
                        record_type,
                        ttl: 60,
                        data: "192.0.2.1".to_string(),
                    }],
                ))
            }
            Plan::NetworkFail => Err(ExecError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            ))),
            Plan::NetworkFailAfter(delay) => {
                tokio::time::sleep(delay).await;
                Err(ExecError::Io(std::io::Error::from(
                    std::io::ErrorKind::ConnectionRefused,
                )))
            }
            Plan::ProtocolFail => Err(ExecError::Protocol("unparseable reply".to_string())),
            Plan::OtherFail => Err(ExecError::Other("upstream gave up".to_string())),
            Plan::StatusServFail => Ok(DnsResponse::with_status(
                ResponseStatus::ServFail,
                vec![Question::new(name, record_type)],
            )),
            Plan::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ExecError::Timeout)
            }
        }
    }
}

fn build(
    executor: ScriptedExecutor,
    endpoints: Vec<Endpoint>,
    options: MultiResolverOptions,
) -> (Arc<ScriptedExecutor>, MultiResolver) {
    let executor = Arc::new(executor);
    let resolver = MultiResolver::with_options(
        endpoints,
        executor.clone() as Arc<dyn QueryExecutor>,
        options,
    )
    .unwrap();
    (executor, resolver)
}

fn token() -> CancellationToken {
    CancellationToken::new()
}

#[test]
fn construction_fails_fast_without_endpoints() {
    let executor = Arc::new(ScriptedExecutor::new()) as Arc<dyn QueryExecutor>;
    let result = MultiResolver::new(Vec::new(), executor);
    assert!(matches!(result, Err(MultiResolverError::NoEndpoints)));
}

#[tokio::test(start_paused = true)]
async fn first_success_returns_the_fast_endpoint() {
    let fast = Endpoint::udp("fast.first.test", 53);
    let slow = Endpoint::udp("slow.first.test", 53);
    let executor = ScriptedExecutor::new()
        .plan(&fast, Plan::Ok(Duration::from_millis(10)))
        .plan(&slow, Plan::Ok(Duration::from_millis(100)));
    let (executor, resolver) = build(
        executor,
        vec![slow.clone(), fast.clone()],
        MultiResolverOptions {
            strategy: Strategy::FirstSuccess,
            max_parallelism: 2,
            ..Default::default()
        },
    );

    let started = tokio::time::Instant::now();
    let response = resolver.query("example.com.", RecordType::A, &token()).await;
    let elapsed = started.elapsed();

    assert!(response.is_success());
    assert_eq!(response.endpoint, Some(fast.key()));
    assert!(elapsed < Duration::from_millis(50), "took {elapsed:?}");
    // Both raced; the slow sibling was started, then cancelled.
    assert_eq!(executor.attempts(&fast), 1);
    assert_eq!(executor.attempts(&slow), 1);
}

#[tokio::test(start_paused = true)]
async fn first_success_moves_to_the_next_window_on_failure() {
    let bad_a = Endpoint::udp("bad-a.window.test", 53);
    let bad_b = Endpoint::udp("bad-b.window.test", 53);
    let good = Endpoint::udp("good.window.test", 53);
    let executor = ScriptedExecutor::new()
        .plan(&bad_a, Plan::NetworkFail)
        .plan(&bad_b, Plan::NetworkFail)
        .plan(&good, Plan::Ok(Duration::from_millis(5)));
    let (executor, resolver) = build(
        executor,
        vec![bad_a, bad_b, good.clone()],
        MultiResolverOptions {
            strategy: Strategy::FirstSuccess,
            max_parallelism: 2,
            ..Default::default()
        },
    );

    let response = resolver.query("example.com.", RecordType::A, &token()).await;
    assert!(response.is_success());
    assert_eq!(response.endpoint, Some(good.key()));
    assert_eq!(executor.attempts(&good), 1);
}

#[tokio::test(start_paused = true)]
async fn fastest_wins_races_once_then_prefers_the_winner() {
    let fast = Endpoint::udp("fast.fastest.test", 53);
    let slow = Endpoint::udp("slow.fastest.test", 53);
    let executor = ScriptedExecutor::new()
        .plan(&fast, Plan::Ok(Duration::from_millis(10)))
        .plan(&slow, Plan::Ok(Duration::from_millis(50)));
    let (executor, resolver) = build(
        executor,
        vec![slow.clone(), fast.clone()],
        MultiResolverOptions {
            strategy: Strategy::FastestWins,
            max_parallelism: 2,
            use_fastest_cache: true,
            fastest_cache_duration: Duration::from_secs(60),
            ..Default::default()
        },
    );

    let first = resolver.query("one.example.", RecordType::A, &token()).await;
    assert!(first.is_success());
    assert_eq!(first.endpoint, Some(fast.key()));
    assert_eq!(executor.attempts(&fast), 1);
    assert_eq!(executor.attempts(&slow), 1);

    // Within the cache TTL only the remembered winner is contacted.
    let second = resolver.query("two.example.", RecordType::A, &token()).await;
    assert!(second.is_success());
    assert_eq!(second.endpoint, Some(fast.key()));
    assert_eq!(executor.attempts(&fast), 2);
    assert_eq!(executor.attempts(&slow), 1);
}

#[tokio::test(start_paused = true)]
async fn clearing_the_fastest_cache_forces_a_re_race() {
    let fast = Endpoint::udp("fast.clear.test", 53);
    let slow = Endpoint::udp("slow.clear.test", 53);
    let executor = ScriptedExecutor::new()
        .plan(&fast, Plan::Ok(Duration::from_millis(10)))
        .plan(&slow, Plan::Ok(Duration::from_millis(50)));
    let endpoints = vec![fast.clone(), slow.clone()];
    let (executor, resolver) = build(
        executor,
        endpoints.clone(),
        MultiResolverOptions {
            strategy: Strategy::FastestWins,
            max_parallelism: 2,
            ..Default::default()
        },
    );

    resolver.query("one.example.", RecordType::A, &token()).await;
    resolver.clear_fastest_cache_for(&endpoints);
    // Clearing an already-absent entry is a silent no-op.
    resolver.clear_fastest_cache_for(&endpoints);

    resolver.query("two.example.", RecordType::A, &token()).await;
    assert_eq!(executor.attempts(&slow), 2, "cleared cache must re-race");
}

#[tokio::test(start_paused = true)]
async fn sequential_all_tries_in_order_until_success() {
    let bad = Endpoint::udp("bad.sequential.test", 53);
    let good = Endpoint::udp("good.sequential.test", 53);
    let executor = ScriptedExecutor::new()
        .plan(&bad, Plan::StatusServFail)
        .plan(&good, Plan::Ok(Duration::from_millis(5)));
    let (executor, resolver) = build(
        executor,
        vec![bad.clone(), good.clone()],
        MultiResolverOptions {
            strategy: Strategy::SequentialAll,
            ..Default::default()
        },
    );

    let response = resolver.query("example.com.", RecordType::A, &token()).await;
    assert!(response.is_success());
    assert_eq!(response.endpoint, Some(good.key()));
    assert_eq!(executor.attempt_order(), vec![bad.key(), good.key()]);
}

#[tokio::test(start_paused = true)]
async fn round_robin_distributes_and_falls_back_to_endpoint_zero() {
    let a = Endpoint::udp("a.robin.test", 53);
    let b = Endpoint::udp("b.robin.test", 53);
    let c = Endpoint::udp("c.robin.test", 53);
    let executor = ScriptedExecutor::new()
        .plan(&a, Plan::Ok(Duration::from_millis(5)))
        .plan(&b, Plan::Ok(Duration::from_millis(5)))
        .plan(&c, Plan::NetworkFail);
    let (executor, resolver) = build(
        executor,
        vec![a.clone(), b.clone(), c.clone()],
        MultiResolverOptions {
            strategy: Strategy::RoundRobin,
            ..Default::default()
        },
    );

    for i in 0..9 {
        let response = resolver
            .query(&format!("q{i}.example."), RecordType::A, &token())
            .await;
        // Calls landing on the failing endpoint fall back to endpoint 0.
        assert!(response.is_success());
        assert_ne!(response.endpoint, Some(c.key()));
    }

    // Nine consecutive rotations over three endpoints assign three calls
    // to each, and every failing call adds a fallback attempt on `a`.
    assert_eq!(executor.attempts(&c), 3);
    assert_eq!(executor.attempts(&a), 6);
    assert_eq!(executor.attempts(&b), 3);
}

#[tokio::test(start_paused = true)]
async fn batch_preserves_input_order_and_isolates_failures() {
    let endpoint = Endpoint::udp("batch.order.test", 53);
    let executor = ScriptedExecutor::new()
        .plan(&endpoint, Plan::Ok(Duration::from_millis(5)))
        .fail_name("broken.example.");
    let (_executor, resolver) = build(
        executor,
        vec![endpoint],
        MultiResolverOptions {
            max_parallelism: 2,
            ..Default::default()
        },
    );

    let names = [
        "zero.example.",
        "one.example.",
        "broken.example.",
        "three.example.",
        "four.example.",
    ];
    let responses = resolver.query_batch(&names, RecordType::A, &token()).await;

    assert_eq!(responses.len(), names.len());
    for (i, response) in responses.iter().enumerate() {
        if names[i] == "broken.example." {
            assert!(!response.is_success());
            assert_eq!(response.error_code, Some(ErrorCode::ServFail));
        } else {
            assert!(response.is_success());
            assert_eq!(response.questions[0].name, names[i]);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn batch_respects_the_global_parallelism_cap() {
    let endpoint = Endpoint::udp("cap.global.test", 53);
    let executor =
        ScriptedExecutor::new().plan(&endpoint, Plan::Ok(Duration::from_millis(10)));
    let (executor, resolver) = build(
        executor,
        vec![endpoint],
        MultiResolverOptions {
            max_parallelism: 2,
            ..Default::default()
        },
    );

    let names: Vec<String> = (0..6).map(|i| format!("n{i}.example.")).collect();
    let responses = resolver.query_batch(&names, RecordType::A, &token()).await;

    assert!(responses.iter().all(DnsResponse::is_success));
    assert!(executor.peak() <= 2, "peak was {}", executor.peak());
}

#[tokio::test(start_paused = true)]
async fn fastest_wins_admission_respects_the_parallelism_cap() {
    // More endpoints than slots: admission must replenish as attempts
    // conclude, never exceeding the cap, while still racing the whole set.
    let endpoints: Vec<Endpoint> = (0..5)
        .map(|i| Endpoint::udp(format!("e{i}.replenish.test"), 53))
        .collect();
    let mut executor = ScriptedExecutor::new();
    for (i, endpoint) in endpoints.iter().enumerate() {
        executor = executor.plan(
            endpoint,
            Plan::Ok(Duration::from_millis(10 * (i as u64 + 1))),
        );
    }
    let (executor, resolver) = build(
        executor,
        endpoints.clone(),
        MultiResolverOptions {
            strategy: Strategy::FastestWins,
            max_parallelism: 2,
            use_fastest_cache: false,
            ..Default::default()
        },
    );

    let response = resolver.query("example.com.", RecordType::A, &token()).await;

    assert!(response.is_success());
    assert_eq!(response.endpoint, Some(endpoints[0].key()));
    assert!(executor.peak() <= 2, "peak was {}", executor.peak());
    for endpoint in &endpoints {
        assert_eq!(executor.attempts(endpoint), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn first_success_windows_respect_the_parallelism_cap() {
    let endpoints: Vec<Endpoint> = (0..5)
        .map(|i| Endpoint::udp(format!("e{i}.windowcap.test"), 53))
        .collect();
    let mut executor = ScriptedExecutor::new();
    // Every window fails slowly enough that its attempts overlap; only the
    // last endpoint answers.
    for endpoint in &endpoints[..4] {
        executor = executor.plan(
            endpoint,
            Plan::NetworkFailAfter(Duration::from_millis(10)),
        );
    }
    executor = executor.plan(&endpoints[4], Plan::Ok(Duration::from_millis(5)));
    let (executor, resolver) = build(
        executor,
        endpoints.clone(),
        MultiResolverOptions {
            strategy: Strategy::FirstSuccess,
            max_parallelism: 2,
            ..Default::default()
        },
    );

    let response = resolver.query("example.com.", RecordType::A, &token()).await;

    assert!(response.is_success());
    assert_eq!(response.endpoint, Some(endpoints[4].key()));
    assert!(executor.peak() <= 2, "peak was {}", executor.peak());
    for endpoint in &endpoints {
        assert_eq!(executor.attempts(endpoint), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn per_endpoint_limit_caps_in_flight_attempts() {
    let endpoint = Endpoint::udp("cap.endpoint.test", 53);
    let executor =
        ScriptedExecutor::new().plan(&endpoint, Plan::Ok(Duration::from_millis(10)));
    let (executor, resolver) = build(
        executor,
        vec![endpoint],
        MultiResolverOptions {
            max_parallelism: 8,
            per_endpoint_max_in_flight: Some(2),
            ..Default::default()
        },
    );

    let names: Vec<String> = (0..6).map(|i| format!("n{i}.example.")).collect();
    let responses = resolver.query_batch(&names, RecordType::A, &token()).await;

    assert!(responses.iter().all(DnsResponse::is_success));
    assert!(executor.peak() <= 2, "peak was {}", executor.peak());
}

#[tokio::test(start_paused = true)]
async fn the_best_ranked_failure_is_surfaced() {
    let network = Endpoint::udp("net.rank.test", 53);
    let servfail = Endpoint::udp("serv.rank.test", 53);
    let executor = ScriptedExecutor::new()
        .plan(&network, Plan::NetworkFail)
        .plan(&servfail, Plan::OtherFail);
    let (_executor, resolver) = build(
        executor,
        vec![servfail, network],
        MultiResolverOptions {
            strategy: Strategy::FirstSuccess,
            max_parallelism: 2,
            ..Default::default()
        },
    );

    let response = resolver.query("example.com.", RecordType::A, &token()).await;
    assert!(!response.is_success());
    assert_eq!(response.error_code, Some(ErrorCode::Network));
}

#[tokio::test(start_paused = true)]
async fn executor_errors_classify_into_the_taxonomy() {
    let socket = Endpoint::udp("socket.classify.test", 53);
    let proto = Endpoint::udp("proto.classify.test", 53);
    let executor = ScriptedExecutor::new()
        .plan(&socket, Plan::NetworkFail)
        .plan(&proto, Plan::ProtocolFail);
    let (_executor, resolver) = build(
        executor,
        vec![socket.clone(), proto.clone()],
        MultiResolverOptions {
            strategy: Strategy::SequentialAll,
            ..Default::default()
        },
    );

    // Both fail; sequential order means the socket endpoint is hit first
    // and its Network failure outranks the protocol one in the aggregate.
    let response = resolver.query("example.com.", RecordType::A, &token()).await;
    assert_eq!(response.error_code, Some(ErrorCode::Network));

    // A protocol failure alone surfaces as InvalidResponse.
    let executor = ScriptedExecutor::new().plan(&proto, Plan::ProtocolFail);
    let (_executor, resolver) = build(
        executor,
        vec![proto],
        MultiResolverOptions {
            strategy: Strategy::SequentialAll,
            ..Default::default()
        },
    );
    let response = resolver.query("example.com.", RecordType::A, &token()).await;
    assert_eq!(response.error_code, Some(ErrorCode::InvalidResponse));
}

#[tokio::test(start_paused = true)]
async fn a_hung_endpoint_reports_a_timeout() {
    let hung = Endpoint::udp("hung.timeout.test", 53).timeout(Duration::from_millis(50));
    let executor = ScriptedExecutor::new().plan(&hung, Plan::Hang);
    let (_executor, resolver) = build(
        executor,
        vec![hung.clone()],
        MultiResolverOptions {
            strategy: Strategy::SequentialAll,
            respect_endpoint_timeout: true,
            ..Default::default()
        },
    );

    let response = resolver.query("example.com.", RecordType::A, &token()).await;
    assert!(!response.is_success());
    assert_eq!(response.error_code, Some(ErrorCode::Timeout));
    assert_eq!(response.endpoint, Some(hung.key()));
}

#[tokio::test(start_paused = true)]
async fn a_pre_cancelled_token_yields_the_cancellation_signal() {
    let endpoint = Endpoint::udp("pre.cancel.test", 53);
    let executor = ScriptedExecutor::new();
    let (executor, resolver) = build(
        executor,
        vec![endpoint],
        MultiResolverOptions::default(),
    );

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let response = resolver.query("example.com.", RecordType::A, &cancelled).await;

    assert!(response.is_cancellation());
    assert!(!response.is_success());
    assert_eq!(
        executor.attempt_order().len(),
        0,
        "no endpoint may be contacted"
    );
}

#[tokio::test(start_paused = true)]
async fn caller_cancellation_is_not_reported_as_a_timeout() {
    let hung = Endpoint::udp("hung.cancel.test", 53);
    let executor = ScriptedExecutor::new().plan(&hung, Plan::Hang);
    let (_executor, resolver) = build(
        executor,
        vec![hung],
        MultiResolverOptions {
            strategy: Strategy::SequentialAll,
            default_timeout: Duration::from_secs(30),
            ..Default::default()
        },
    );

    let caller = token();
    let canceller = caller.clone();
    let (response, ()) = tokio::join!(
        resolver.query("example.com.", RecordType::A, &caller),
        async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            canceller.cancel();
        }
    );

    assert!(response.is_cancellation());
    assert_ne!(response.error_code, Some(ErrorCode::Timeout));
}
