//! Round aggregation: consensus and the one-line-per-agent summary

use crate::domain::{Consensus, TradeAction, TradingRoundResult};

/// Agreement across non-hold actions.
///
/// Checked in order: all holds → `NoTrades`; the leading action has at least
/// two votes and more than twice the opposite action's → `Majority`; every
/// non-hold action is the same → `Unanimous`; anything else → `Split`.
pub fn compute_consensus<I>(actions: I) -> Consensus
where
    I: IntoIterator<Item = TradeAction>,
{
    let (mut buys, mut sells) = (0usize, 0usize);
    for action in actions {
        match action {
            TradeAction::Buy => buys += 1,
            TradeAction::Sell => sells += 1,
            TradeAction::Hold => {}
        }
    }

    if buys + sells == 0 {
        return Consensus::NoTrades;
    }

    let (lead, other) = (buys.max(sells), buys.min(sells));
    if lead >= 2 && lead > other * 2 {
        Consensus::Majority
    } else if other == 0 {
        Consensus::Unanimous
    } else {
        Consensus::Split
    }
}

/// `name: ACTION SYMBOL (conf%) OK|FAIL` per agent, `; `-joined, with an
/// ` | N error(s)` suffix when errors occurred.
pub fn build_summary(results: &[TradingRoundResult], error_count: usize) -> String {
    let mut summary = results
        .iter()
        .map(|r| {
            let symbol = if r.decision.symbol.is_empty() {
                "-"
            } else {
                r.decision.symbol.as_str()
            };
            format!(
                "{}: {} {} ({:.0}%) {}",
                r.agent_name,
                r.decision.action.as_str().to_uppercase(),
                symbol,
                r.decision.confidence,
                if r.executed { "OK" } else { "FAIL" }
            )
        })
        .collect::<Vec<_>>()
        .join("; ");

    if error_count > 0 {
        summary.push_str(&format!(" | {} error(s)", error_count));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradingDecision;
    use rust_decimal_macros::dec;
    use TradeAction::*;

    #[test]
    fn test_consensus_table() {
        assert_eq!(compute_consensus([Buy, Buy, Sell]), Consensus::Split);
        assert_eq!(compute_consensus([Buy, Buy]), Consensus::Majority);
        assert_eq!(compute_consensus([Buy]), Consensus::Unanimous);
        assert_eq!(compute_consensus([Hold, Hold]), Consensus::NoTrades);
        assert_eq!(compute_consensus(Vec::new()), Consensus::NoTrades);
        assert_eq!(compute_consensus([Sell, Hold]), Consensus::Unanimous);
        assert_eq!(compute_consensus([Buy, Sell]), Consensus::Split);
        assert_eq!(compute_consensus([Sell, Sell, Sell, Buy]), Consensus::Majority);
    }

    #[test]
    fn test_summary_format() {
        let results = vec![
            TradingRoundResult {
                agent_id: "m".into(),
                agent_name: "Momentum".into(),
                decision: TradingDecision::new(Buy, "AAPLx", dec!(10), "x").with_confidence(72.4),
                executed: true,
                execution: None,
                execution_error: None,
                agent_failed: false,
            },
            TradingRoundResult {
                agent_id: "g".into(),
                agent_name: "Grok".into(),
                decision: TradingDecision::hold("Agent error: boom"),
                executed: false,
                execution: None,
                execution_error: Some("boom".into()),
                agent_failed: true,
            },
        ];
        assert_eq!(
            build_summary(&results, 1),
            "Momentum: BUY AAPLx (72%) OK; Grok: HOLD - (0%) FAIL | 1 error(s)"
        );
        assert_eq!(build_summary(&results[..1], 0), "Momentum: BUY AAPLx (72%) OK");
    }
}
