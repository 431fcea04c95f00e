// Removes every metric of a set of companies (by ticker symbol) from the monitoring server.
//
// Order: operator confirmation, data-path flush, metric deletion, then the security marker.
// Not transactional: a failed metric deletion stops the run and earlier deletions stay done.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::api_client::MonitoringApi;
use crate::collector_repo::CollectorRepo;
use crate::confirmation::ConfirmationGate;
use crate::error::Result;
use crate::flusher::{DataPathFlusher, FlushReport};

/// True when `metric_name` is `<prefix>.<symbol>.<suffix>` with the symbol as the
/// second-to-last segment and non-empty prefix and suffix.
/// `XIGNITE.FOOBAR.CLOSINGPRICE` matches `FOOBAR`; `XIGNITE.FOOBARZZZ.CLOSINGPRICE` does not.
pub fn metric_matches_symbol(metric_name: &str, ticker_symbol: &str) -> bool {
    if ticker_symbol.is_empty() {
        return false;
    }
    let mut parts = metric_name.rsplitn(3, '.');
    let (Some(suffix), Some(segment), Some(prefix)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    !suffix.is_empty() && !prefix.is_empty() && segment == ticker_symbol
}

pub fn filter_company_metric_names_by_symbol<'a, I>(metric_names: I, ticker_symbol: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    metric_names
        .into_iter()
        .filter(|name| metric_matches_symbol(name, ticker_symbol))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPolicy {
    /// Ask through the configured gate, waiting at most `timeout`.
    Prompt { timeout: Duration },
    /// Non-interactive callers that already decided.
    Skip,
}

/// One deletion run. Server and credentials come from the deleter's API client.
#[derive(Debug, Clone)]
pub struct DeletionRequest {
    pub ticker_symbols: Vec<String>,
    pub confirmation: ConfirmationPolicy,
}

#[derive(Debug, Clone)]
pub struct DeletionSummary {
    pub flush: FlushReport,
    pub deleted_metrics: Vec<String>,
    /// Symbols whose security row was found and marked deleted.
    pub securities_marked: Vec<String>,
}

pub struct CompanyDeleter {
    api: Arc<dyn MonitoringApi>,
    flusher: DataPathFlusher,
    repo: Arc<CollectorRepo>,
    gate: Arc<dyn ConfirmationGate>,
}

impl CompanyDeleter {
    pub fn new(
        api: Arc<dyn MonitoringApi>,
        flusher: DataPathFlusher,
        repo: Arc<CollectorRepo>,
        gate: Arc<dyn ConfirmationGate>,
    ) -> Self {
        Self {
            api,
            flusher,
            repo,
            gate,
        }
    }

    #[instrument(skip(self, request), fields(symbols = ?request.ticker_symbols, server = %self.api.server()))]
    pub async fn delete_companies(&self, request: &DeletionRequest) -> Result<DeletionSummary> {
        if let ConfirmationPolicy::Prompt { timeout } = request.confirmation {
            self.gate
                .confirm(&request.ticker_symbols, self.api.server(), timeout)
                .await?;
        }

        // Nothing below may run unless the pipeline is proven drained.
        let flush = self.flusher.flush_and_garbage_collect().await?;

        let roster = self.api.list_custom_metrics().await?;
        let doomed: Vec<String> = roster
            .into_iter()
            .map(|m| m.name)
            .filter(|name| {
                request
                    .ticker_symbols
                    .iter()
                    .any(|symbol| metric_matches_symbol(name, symbol))
            })
            .collect();
        info!(metrics = doomed.len(), "deleting company metrics");

        for name in &doomed {
            self.api.delete_metric(name).await?;
        }

        let mut securities_marked = Vec::new();
        for symbol in &request.ticker_symbols {
            match self.repo.mark_security_deleted(symbol).await {
                Ok(0) => warn!(symbol = %symbol, "security not found; no deleted marker set"),
                Ok(_) => securities_marked.push(symbol.clone()),
                Err(e) => warn!(symbol = %symbol, error = %e, "failed to mark security deleted"),
            }
        }

        info!(
            deleted_metrics = doomed.len(),
            securities_marked = securities_marked.len(),
            "companies deleted"
        );
        Ok(DeletionSummary {
            flush,
            deleted_metrics: doomed,
            securities_marked,
        })
    }
}
