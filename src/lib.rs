#![deny(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

/*!
DNS client library built around a multi-endpoint query dispatcher.

# Introduction

Given a logical DNS query (a name and a record type) and a set of candidate
resolver endpoints -- possibly using different transports -- the dispatcher
decides which endpoint(s) to contact, how many attempts run concurrently,
how to pick a winning response, and how to surface a single deterministic
failure when everything fails.

A [`MultiResolver`] is created from a non-empty set of [`Endpoint`]s and a
[`QueryExecutor`] implementation provided by the transport layer:

```no_run
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use multidns::{strategy::Strategy, Endpoint, MultiResolver, RecordType};

# async fn example(executor: Arc<dyn multidns::executor::QueryExecutor>) {
let resolver = MultiResolver::new(
    vec![
        Endpoint::udp("9.9.9.9", 53),
        Endpoint::dot("1.1.1.1", 853),
    ],
    executor,
)
.unwrap()
.strategy(Strategy::FastestWins);

let response = resolver
    .query("example.com.", RecordType::A, &CancellationToken::new())
    .await;
assert!(response.is_success());
# }
```

# Strategies

Four interchangeable selection algorithms are provided by
[`strategy::Strategy`]:

- `FirstSuccess` races endpoints in windows and returns the first success.
- `FastestWins` races the whole set, remembers the empirically fastest
  endpoint, and prefers it until the cache entry expires.
- `SequentialAll` tries endpoints one at a time, in order.
- `RoundRobin` rotates the primary endpoint across calls with a single
  fallback attempt.

# Failure reporting

Queries never return `Err`. Executor failures are caught, classified into
the closed [`ErrorCode`] taxonomy, and folded into the returned
[`DnsResponse`]; when every endpoint fails the best-ranked observed failure
is surfaced. Only building a resolver without endpoints fails eagerly, with
[`MultiResolverError`].

[`QueryExecutor`]: executor::QueryExecutor
*/

mod client;
pub use client::{strategy, MultiResolver, MultiResolverOptions};

mod endpoint;
pub use endpoint::{fingerprint, Endpoint, EndpointKey, SetFingerprint, Transport};

mod error;
pub use error::{ErrorCode, ExecError, MultiResolverError};

mod record;
pub use record::{Answer, Question, RecordType};

mod response;
pub use response::{DnsResponse, ResponseStatus};

pub mod executor;

pub mod metrics;
