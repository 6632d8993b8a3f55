//! The dispatcher daemon entrypoint. Reads its connection details from
//! environment variables, wires up a `Dispatcher`, and runs it until the
//! process is killed.

use std::sync::Arc;

use ldpipe::content_model::UnreachableVocabularyFetcher;
use ldpipe::dispatcher::{BrokerAddress, Dispatcher, DispatcherConfig};
use ldpipe::handle::NullHandleClient;
use ldpipe::logging::{self, LoggingOptions};
use ldpipe::repo::Endpoint;
use ldpipe::IngestResult;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn config_from_env() -> DispatcherConfig {
    let broker_login = match (std::env::var("LDPIPE_BROKER_LOGIN"), std::env::var("LDPIPE_BROKER_PASSCODE")) {
        (Ok(login), Ok(passcode)) => Some((login, passcode)),
        _ => None,
    };

    DispatcherConfig {
        broker: BrokerAddress {
            host: env_or("LDPIPE_BROKER_HOST", "localhost"),
            port: env_parse_or("LDPIPE_BROKER_PORT", 61613),
            vhost: env_or("LDPIPE_BROKER_VHOST", "/"),
            login: broker_login,
        },
        async_queue: env_or("LDPIPE_ASYNC_QUEUE", "/queue/ldpipe.jobs"),
        sync_queue: env_or("LDPIPE_SYNC_QUEUE", "/queue/ldpipe.jobs.synchronous"),
        status_queue: env_or("LDPIPE_STATUS_QUEUE", "/queue/ldpipe.jobs.status"),
        progress_topic: env_or("LDPIPE_PROGRESS_TOPIC", "/topic/ldpipe.jobs.progress"),
        endpoint: Endpoint::new(env_or("LDPIPE_REPO_URL", "http://localhost:8080/rest")),
        jobs_root: env_or("LDPIPE_JOBS_DIR", "./data/jobs").into(),
        inbox_dir: env_or("LDPIPE_INBOX_DIR", "./data/msg/inbox").into(),
        outbox_dir: env_or("LDPIPE_OUTBOX_DIR", "./data/msg/outbox").into(),
        max_concurrent_jobs: env_parse_or("LDPIPE_MAX_CONCURRENT_JOBS", 4),
        default_keep_alive_seconds: env_parse_or("LDPIPE_KEEP_ALIVE_SECONDS", 90),
    }
}

#[tokio::main]
async fn main() -> IngestResult<()> {
    logging::init(LoggingOptions {
        json: std::env::var("LDPIPE_LOG_JSON").is_ok(),
        verbose: std::env::var("LDPIPE_VERBOSE").is_ok(),
    });

    let config = config_from_env();
    let dispatcher = Dispatcher::new(config, Arc::new(NullHandleClient), Arc::new(UnreachableVocabularyFetcher))?;

    tracing::info!("ldpiped starting up");
    dispatcher.run().await;
    Ok(())
}
