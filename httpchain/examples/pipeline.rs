//! Calls an API through the full interceptor pipeline.
//!
//! ```text
//! API_TOKEN=... cargo run -p httpchain --example pipeline -- https://api.example.com/v1/servers
//! ```

use httpchain::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,httpchain=debug".into()),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/status/429".to_string());
    let token = std::env::var("API_TOKEN").unwrap_or_default();

    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default()));
    let pipeline = Pipeline::builder()
        .bearer(token)
        .logger(LoggerOptions::verbose().skip_header("authorization"))
        .classify_errors()
        .circuit_breaker(breaker.clone(), false)
        .retry(
            &RetryConfig::new()
                .max_retries(3)
                .exponential(Duration::from_millis(200), Duration::from_secs(5)),
        )
        .build()?;

    match pipeline.execute(HttpRequest::get(&url)?).await {
        Ok(response) => println!("{}", response.text().await?),
        Err(err) => eprintln!("request failed: {err}"),
    }
    println!("circuit: {}", breaker.state());
    Ok(())
}
