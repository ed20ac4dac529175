//! LLM-backed trader
//!
//! Renders the snapshot and portfolio into a prompt, asks Grok for a single
//! JSON decision and parses it. Validation beyond "is this a well-formed
//! decision" (catalog membership, sizing) is left to the circuit breaker.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::grok::{ChatOptions, GrokClient, GrokMessage};
use super::traits::AgentDecider;
use crate::config::{AgentSettings, RiskConfig};
use crate::domain::{MarketSnapshot, PortfolioContext, TradeAction, TradingDecision};
use crate::error::{ArenaError, Result};

const SYSTEM_PROMPT: &str = r#"You are an autonomous trader competing in a tokenized-stock arena.
Each round you may make exactly one trade or hold.

Respond with a single JSON object and nothing else:
{
  "action": "buy" | "sell" | "hold",
  "symbol": "<catalog symbol, e.g. AAPLx; empty for hold>",
  "quantity": <buy: USDC to spend; sell: number of shares; hold: 0>,
  "reasoning": "<one or two sentences>",
  "confidence": <0-100>,
  "predicted_outcome": "<optional>",
  "sources": ["<optional>"],
  "intent": "<optional: momentum | value | hedge | ...>"
}"#;

pub struct GrokTrader {
    id: String,
    name: String,
    client: Arc<GrokClient>,
    options: ChatOptions,
    persona: Option<String>,
    max_trade_usd: Decimal,
}

impl GrokTrader {
    pub fn new(settings: &AgentSettings, client: Arc<GrokClient>, risk: &RiskConfig) -> Self {
        Self {
            id: settings.id.clone(),
            name: settings.name.clone(),
            client,
            options: ChatOptions {
                model: settings.model.clone(),
                temperature: settings.temperature,
                max_tokens: Some(600),
                json: true,
            },
            persona: settings.persona.clone(),
            max_trade_usd: risk.max_trade_usd,
        }
    }

    fn system_prompt(&self) -> String {
        match self.persona.as_deref() {
            Some(p) if !p.trim().is_empty() => format!("{}\n\nPersona: {}", SYSTEM_PROMPT, p.trim()),
            _ => SYSTEM_PROMPT.to_string(),
        }
    }
}

#[async_trait]
impl AgentDecider for GrokTrader {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(
        &self,
        market: &MarketSnapshot,
        portfolio: &PortfolioContext,
    ) -> Result<TradingDecision> {
        let prompt = render_prompt(market, portfolio, self.max_trade_usd);
        let messages = [GrokMessage::system(self.system_prompt()), GrokMessage::user(prompt)];

        let raw = self
            .client
            .chat(&messages, &self.options)
            .await
            .map_err(|e| ArenaError::agent(&self.id, e.to_string()))?;
        debug!(agent_id = %self.id, chars = raw.len(), "LLM decision received");

        let decision = parse_decision(&raw).map_err(|reason| ArenaError::agent(&self.id, reason))?;
        info!(
            agent_id = %self.id,
            action = %decision.action,
            symbol = %decision.symbol,
            quantity = %decision.quantity,
            "LLM proposed trade"
        );
        Ok(decision)
    }
}

/// Market and portfolio rendered as plain text for the user message
pub fn render_prompt(
    market: &MarketSnapshot,
    portfolio: &PortfolioContext,
    max_trade_usd: Decimal,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "MARKET ({}):", market.fetched_at.format("%Y-%m-%d %H:%M UTC"));
    for item in &market.items {
        let change = item
            .change_24h
            .map(|c| format!("{:+.2}%", c))
            .unwrap_or_else(|| "n/a".to_string());
        let volume = item
            .volume_24h
            .map(|v| format!("${}", v.round()))
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(
            out,
            "- {} ({}): ${} | 24h {} | vol {}",
            item.symbol,
            item.name,
            item.price.round_dp(2),
            change,
            volume
        );
        for note in &item.notes {
            let _ = writeln!(out, "    news: {}", note);
        }
    }

    let _ = writeln!(out, "\nPORTFOLIO:");
    let _ = writeln!(out, "cash: ${}", portfolio.cash_balance.round_dp(2));
    if portfolio.positions.is_empty() {
        let _ = writeln!(out, "positions: none");
    }
    for p in &portfolio.positions {
        let _ = writeln!(
            out,
            "- {}: {} shares @ avg ${} (now ${}, P&L {}%)",
            p.symbol,
            p.quantity.round_dp(6),
            p.average_cost.round_dp(2),
            p.current_price.round_dp(2),
            p.unrealized_pnl_pct.round_dp(2)
        );
    }
    let _ = writeln!(
        out,
        "total value: ${} (P&L {}%)",
        portfolio.total_value.round_dp(2),
        portfolio.total_pnl_pct.round_dp(2)
    );
    let _ = writeln!(out, "\nMax buy per trade: ${}.", max_trade_usd);
    out
}

/// Parse a model reply into a decision.
///
/// Accepts bare JSON or JSON wrapped in prose / code fences.
pub fn parse_decision(raw: &str) -> std::result::Result<TradingDecision, String> {
    let start = raw.find('{').ok_or("no JSON object in response")?;
    let end = raw.rfind('}').ok_or("no JSON object in response")?;
    if end < start {
        return Err("malformed JSON object in response".to_string());
    }

    let value: Value = serde_json::from_str(&raw[start..=end])
        .map_err(|e| format!("invalid decision JSON: {}", e))?;

    let action_raw = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or("decision missing 'action'")?;
    let action =
        TradeAction::parse(action_raw).ok_or_else(|| format!("unknown action '{}'", action_raw))?;

    let symbol = value.get("symbol").and_then(Value::as_str).unwrap_or("");
    if action != TradeAction::Hold && symbol.trim().is_empty() {
        return Err(format!("{} decision without a symbol", action));
    }

    let quantity = match action {
        TradeAction::Hold => Decimal::ZERO,
        _ => number_field(&value, "quantity").ok_or("decision missing 'quantity'")?,
    };

    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .unwrap_or(0.0);

    let mut decision =
        TradingDecision::new(action, symbol, quantity, &reasoning).with_confidence(confidence);
    decision.predicted_outcome = value
        .get("predicted_outcome")
        .or_else(|| value.get("predictedOutcome"))
        .and_then(Value::as_str)
        .map(str::to_string);
    decision.intent = value.get("intent").and_then(Value::as_str).map(str::to_string);
    decision.sources = value
        .get("sources")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(decision)
}

fn number_field(value: &Value, key: &str) -> Option<Decimal> {
    match value.get(key)? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketData, PriceSourceKind};
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_fenced_buy() {
        let raw = "Here you go:\n```json\n{\"action\":\"BUY\",\"symbol\":\"nvdax\",\"quantity\":12.5,\"reasoning\":\"AI capex\",\"confidence\":0.8,\"sources\":[\"x.com\"]}\n```";
        let d = parse_decision(raw).unwrap();
        assert_eq!(d.action, TradeAction::Buy);
        assert_eq!(d.symbol, "nvdax");
        assert_eq!(d.quantity, dec!(12.5));
        assert_eq!(d.sources, vec!["x.com".to_string()]);
        // normalization happens downstream
        assert!((d.normalized().confidence - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_hold_ignores_quantity() {
        let raw = r#"{"action":"hold","symbol":"","quantity":"99","reasoning":"wait","confidence":55}"#;
        let d = parse_decision(raw).unwrap();
        assert!(d.is_hold());
        assert_eq!(d.quantity, Decimal::ZERO);
    }

    #[test]
    fn test_parse_rejects_bad_replies() {
        assert!(parse_decision("I think you should buy Apple").is_err());
        assert!(parse_decision(r#"{"action":"short","symbol":"AAPLx","quantity":1}"#).is_err());
        assert!(parse_decision(r#"{"action":"buy","quantity":1}"#).is_err());
        assert!(parse_decision(r#"{"action":"sell","symbol":"AAPLx"}"#).is_err());
    }

    #[test]
    fn test_prompt_mentions_every_symbol_and_cash() {
        let market = MarketSnapshot::new(vec![MarketData {
            symbol: "AAPLx".into(),
            name: "Apple".into(),
            mint: "m".into(),
            price: dec!(231.456),
            change_24h: Some(dec!(1.2)),
            volume_24h: None,
            source: PriceSourceKind::Live,
            notes: vec!["earnings beat".into()],
        }]);
        let portfolio = PortfolioContext::starting("a", dec!(100));
        let prompt = render_prompt(&market, &portfolio, dec!(25));
        assert!(prompt.contains("AAPLx (Apple): $231.46"));
        assert!(prompt.contains("news: earnings beat"));
        assert!(prompt.contains("cash: $100"));
        assert!(prompt.contains("Max buy per trade: $25."));
    }
}
