//! Bounded, order-preserving fan-out for per-symbol fetches.

use futures::stream::{self, StreamExt};
use market_core::FetchError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    /// Maximum in-flight fetches
    pub concurrency: usize,
    /// Per-symbol timeout
    pub timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout: Duration::from_secs(20),
        }
    }
}

/// Run `fetch` for every symbol, at most `concurrency` at a time.
///
/// Results come back in input order. A slow symbol turns into
/// `FetchError::Timeout` without affecting the others.
pub async fn fetch_all<T, F, Fut>(
    symbols: &[String],
    settings: &FetchSettings,
    fetch: F,
) -> Vec<(String, Result<T, FetchError>)>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let timeout = settings.timeout;
    stream::iter(symbols.iter().cloned())
        .map(|symbol| {
            let fut = fetch(symbol.clone());
            async move {
                let result = match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout(symbol.clone())),
                };
                (symbol, result)
            }
        })
        .buffered(settings.concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_preserves_order_and_isolates_failures() {
        let symbols: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        let settings = FetchSettings {
            concurrency: 2,
            timeout: Duration::from_secs(5),
        };

        let results = fetch_all(&symbols, &settings, |s| async move {
            if s == "B" {
                Err(FetchError::NotFound(s))
            } else {
                Ok(s.len())
            }
        })
        .await;

        let order: Vec<&str> = results.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
        assert!(results[1].1.is_err());
        assert_eq!(results.iter().filter(|(_, r)| r.is_ok()).count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_per_symbol() {
        let symbols = vec!["SLOW".to_string(), "FAST".to_string()];
        let settings = FetchSettings {
            concurrency: 4,
            timeout: Duration::from_millis(100),
        };

        let results = fetch_all(&symbols, &settings, |s| async move {
            if s == "SLOW" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok::<_, FetchError>(1u8)
        })
        .await;

        assert_eq!(results[0].1, Err(FetchError::Timeout("SLOW".to_string())));
        assert_eq!(results[1].1, Ok(1));
    }
}
