//! Shared per-round context enrichment (headlines)

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::agents::grok::{extract_bullet_points, ChatOptions, GrokClient, GrokMessage};
use crate::domain::{find_stock, MarketSnapshot};
use crate::error::Result;

/// Adds per-symbol notes to a snapshot before agents see it.
///
/// Returned pairs are `(symbol, note)`; the orchestrator attaches them with
/// `MarketSnapshot::with_notes`, so one enrichment is shared by every agent.
#[async_trait]
pub trait ContextEnricher: Send + Sync {
    fn name(&self) -> &str;

    async fn enrich(&self, snapshot: &MarketSnapshot) -> Result<Vec<(String, String)>>;
}

/// Headline search through Grok's live search
pub struct GrokNewsEnricher {
    client: Arc<GrokClient>,
}

impl GrokNewsEnricher {
    pub fn new(client: Arc<GrokClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContextEnricher for GrokNewsEnricher {
    fn name(&self) -> &str {
        "grok-news"
    }

    async fn enrich(&self, snapshot: &MarketSnapshot) -> Result<Vec<(String, String)>> {
        let symbols = snapshot
            .items
            .iter()
            .map(|m| format!("{} ({})", m.symbol, m.name))
            .collect::<Vec<_>>()
            .join(", ");

        let prompt = format!(
            "List the most market-moving headline from the last 24 hours for each of: {}.\n\
             One bullet per stock, formatted as `- SYMBOL: headline`. Skip stocks with no news.",
            symbols
        );

        let reply = self
            .client
            .chat(
                &[GrokMessage::user(prompt)],
                &ChatOptions {
                    temperature: Some(0.2),
                    ..ChatOptions::default()
                },
            )
            .await?;

        let notes = parse_headlines(&reply);
        debug!(notes = notes.len(), "Headlines attached");
        Ok(notes)
    }
}

/// `- SYMBOL: headline` bullets → `(symbol, headline)` for catalog symbols only
pub fn parse_headlines(reply: &str) -> Vec<(String, String)> {
    extract_bullet_points(reply)
        .into_iter()
        .filter_map(|line| {
            let (sym, headline) = line.split_once(':')?;
            let stock = find_stock(sym.trim().trim_matches('*'))?;
            let headline = headline.trim();
            (!headline.is_empty()).then(|| (stock.symbol.to_string(), headline.to_string()))
        })
        .collect()
}
