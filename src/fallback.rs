//! Ranked fallback execution shared by the similarity and summary services.
//!
//! Both services try a chain of strategies in preference order: the first
//! one that produces a usable result wins, anything else (an error or an
//! empty result) moves on to the next strategy.

use std::future::Future;
use std::pin::Pin;

pub type StrategyFuture<'a, T> =
    Pin<Box<dyn Future<Output = anyhow::Result<Option<T>>> + Send + 'a>>;

pub struct Strategy<'a, T> {
    pub name: &'static str,
    pub fut: StrategyFuture<'a, T>,
}

impl<'a, T> Strategy<'a, T> {
    pub fn new(
        name: &'static str,
        fut: impl Future<Output = anyhow::Result<Option<T>>> + Send + 'a,
    ) -> Self {
        Self {
            name,
            fut: Box::pin(fut),
        }
    }
}

/// Run strategies in order until one yields a result.
///
/// `Ok(None)` means the strategy ran but produced nothing usable; `Err`
/// means it failed outright. Both advance the chain. Returns `None` when
/// every strategy is exhausted.
pub async fn run_chain<T>(strategies: Vec<Strategy<'_, T>>) -> Option<T> {
    for strategy in strategies {
        match strategy.fut.await {
            Ok(Some(value)) => {
                log::debug!("strategy {} produced a result", strategy.name);
                return Some(value);
            }
            Ok(None) => {
                log::debug!("strategy {} produced no result, trying next", strategy.name);
            }
            Err(err) => {
                log::warn!("strategy {} failed: {err:#}", strategy.name);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_usable_result_wins() {
        let strategies = vec![
            Strategy::new("first", async { Ok(Some(1)) }),
            Strategy::new("second", async { Ok(Some(2)) }),
        ];

        assert_eq!(run_chain(strategies).await, Some(1));
    }

    #[tokio::test]
    async fn test_error_advances_chain() {
        let strategies = vec![
            Strategy::new("failing", async { Err(anyhow::anyhow!("boom")) }),
            Strategy::new("working", async { Ok(Some(7)) }),
        ];

        assert_eq!(run_chain(strategies).await, Some(7));
    }

    #[tokio::test]
    async fn test_empty_result_advances_chain() {
        let strategies = vec![
            Strategy::new("empty", async { Ok(None) }),
            Strategy::new("working", async { Ok(Some("hit")) }),
        ];

        assert_eq!(run_chain(strategies).await, Some("hit"));
    }

    #[tokio::test]
    async fn test_exhausted_chain_returns_none() {
        let strategies: Vec<Strategy<'_, u32>> = vec![
            Strategy::new("failing", async { Err(anyhow::anyhow!("boom")) }),
            Strategy::new("empty", async { Ok(None) }),
        ];

        assert_eq!(run_chain(strategies).await, None);
    }

    #[tokio::test]
    async fn test_no_strategies() {
        assert_eq!(run_chain::<u32>(vec![]).await, None);
    }
}
