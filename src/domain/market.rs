use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A tradeable tokenized stock in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockInfo {
    /// Ticker used by agents (e.g. "AAPLx")
    pub symbol: &'static str,
    /// Display name
    pub name: &'static str,
    /// SPL token mint address
    pub mint: &'static str,
    /// Reference price used to seed synthetic quotes
    pub base_price: Decimal,
}

/// USDC mint, the quote currency for every trade
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// xStocks catalog, in the order agents see it
pub const STOCK_CATALOG: &[StockInfo] = &[
    StockInfo {
        symbol: "AAPLx",
        name: "Apple",
        mint: "XsbEhLAtcf6HdfpFZ5xEMdqW8nfAvcsP5bdudRLJzJp",
        base_price: dec!(230),
    },
    StockInfo {
        symbol: "TSLAx",
        name: "Tesla",
        mint: "XsDoVfqeBukxuZHWhdvWHBhgEHjGNst4MLodqsJHzoB",
        base_price: dec!(250),
    },
    StockInfo {
        symbol: "NVDAx",
        name: "NVIDIA",
        mint: "Xsc9qvGR1efVDFGLrVsmkzv3qi45LTBjeUKSPmx9qEh",
        base_price: dec!(130),
    },
    StockInfo {
        symbol: "GOOGLx",
        name: "Alphabet",
        mint: "XsCPL9dNWBMvFtTmwcCA5v3xWPSMEBCszbQdiLLq6aN",
        base_price: dec!(170),
    },
    StockInfo {
        symbol: "AMZNx",
        name: "Amazon",
        mint: "Xs3eBt7uRfJX8QUs4suhyU8p2M6DoUDrJyWBa8LLZsg",
        base_price: dec!(190),
    },
    StockInfo {
        symbol: "MSFTx",
        name: "Microsoft",
        mint: "XspzcW1PRtgf6Wj92HCiZdjzKCyFekVD8P5Ueh3dRMX",
        base_price: dec!(420),
    },
    StockInfo {
        symbol: "METAx",
        name: "Meta",
        mint: "Xsa62P5mvPszXL1krVUnU5ar38bBSVcWAB6fmPCo5Zu",
        base_price: dec!(560),
    },
    StockInfo {
        symbol: "SPYx",
        name: "S&P 500 ETF",
        mint: "XsoCS1TfEyfFhfvj8EtZ528L3CaKBDBRqRapnBbDF2W",
        base_price: dec!(570),
    },
    StockInfo {
        symbol: "COINx",
        name: "Coinbase",
        mint: "Xs7ZdzSHLU9ftNJsii5fCeJhoRWSC32SQGzGQtePxNu",
        base_price: dec!(220),
    },
    StockInfo {
        symbol: "GMEx",
        name: "GameStop",
        mint: "Xsf9mBktVB9BSU5kf4nHxPq5hCBJ2j2ui3ecFGxPRGc",
        base_price: dec!(25),
    },
];

/// Look up a catalog entry by symbol (case-insensitive)
pub fn find_stock(symbol: &str) -> Option<&'static StockInfo> {
    let needle = symbol.trim();
    STOCK_CATALOG
        .iter()
        .find(|s| s.symbol.eq_ignore_ascii_case(needle))
}

/// Where a quote came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSourceKind {
    Live,
    Synthetic,
}

/// Per-symbol market record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: String,
    pub name: String,
    pub mint: String,
    pub price: Decimal,
    /// 24h change in percent
    pub change_24h: Option<Decimal>,
    /// 24h volume in USD
    pub volume_24h: Option<Decimal>,
    pub source: PriceSourceKind,
    /// Context notes attached by enrichment (headlines, etc.)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl MarketData {
    pub fn is_synthetic(&self) -> bool {
        self.source == PriceSourceKind::Synthetic
    }
}

/// Shared, read-only market view for one round.
///
/// Built once and handed out behind an `Arc`; never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub items: Vec<MarketData>,
    pub fetched_at: DateTime<Utc>,
    /// Cache version this snapshot was published under
    pub version: u64,
    /// Symbols hidden from agents by the liquidity filter
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filtered_out: Vec<String>,
}

impl MarketSnapshot {
    pub fn new(items: Vec<MarketData>) -> Self {
        Self {
            items,
            fetched_at: Utc::now(),
            version: 0,
            filtered_out: Vec::new(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&MarketData> {
        let needle = symbol.trim();
        self.items
            .iter()
            .find(|m| m.symbol.eq_ignore_ascii_case(needle))
    }

    pub fn price_of(&self, symbol: &str) -> Option<Decimal> {
        self.get(symbol).map(|m| m.price)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn synthetic_count(&self) -> usize {
        self.items.iter().filter(|m| m.is_synthetic()).count()
    }

    /// Copy of this snapshot with extra notes attached per symbol
    pub fn with_notes(&self, notes: &[(String, String)]) -> Self {
        let mut next = self.clone();
        for (symbol, note) in notes {
            if let Some(item) = next
                .items
                .iter_mut()
                .find(|m| m.symbol.eq_ignore_ascii_case(symbol))
            {
                item.notes.push(note.clone());
            }
        }
        next
    }
}
