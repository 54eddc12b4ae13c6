//! Sector membership tables
//!
//! Maps each sector to an optional tracking instrument (usually an ETF) and a
//! fixed list of constituents. Loaded once and passed to every component.

use market_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One configured sector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorDefinition {
    pub name: String,
    /// Instrument whose price tracks the whole sector
    #[serde(default)]
    pub tracking_symbol: Option<String>,
    /// Constituent stocks, in priority order
    #[serde(default)]
    pub constituents: Vec<String>,
}

impl SectorDefinition {
    pub fn new(name: &str, tracking_symbol: Option<&str>, constituents: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            tracking_symbol: tracking_symbol.map(|s| s.to_string()),
            constituents: constituents.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Immutable sector configuration for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorUniverse {
    pub market: String,
    pub sectors: Vec<SectorDefinition>,
}

impl SectorUniverse {
    pub fn new(market: &str, sectors: Vec<SectorDefinition>) -> Result<Self, ConfigError> {
        let universe = Self {
            market: market.to_string(),
            sectors,
        };
        universe.validate()?;
        Ok(universe)
    }

    /// Preset for a market code ("US" or "BIST")
    pub fn for_market(market: &str) -> Result<Self, ConfigError> {
        match market.to_uppercase().as_str() {
            "US" => Ok(Self::us_default()),
            "BIST" | "TR" => Ok(Self::bist_default()),
            other => Err(ConfigError::InvalidUniverse(format!("no preset for market {}", other))),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let universe: SectorUniverse =
            toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        universe.validate()?;
        Ok(universe)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for sector in &self.sectors {
            if sector.name.trim().is_empty() {
                return Err(ConfigError::InvalidUniverse("sector with empty name".to_string()));
            }
            if !names.insert(sector.name.as_str()) {
                return Err(ConfigError::InvalidUniverse(format!(
                    "duplicate sector {}",
                    sector.name
                )));
            }
            if sector.tracking_symbol.is_none() && sector.constituents.is_empty() {
                return Err(ConfigError::InvalidUniverse(format!(
                    "sector {} has neither a tracking symbol nor constituents",
                    sector.name
                )));
            }
        }
        Ok(())
    }

    pub fn sectors(&self) -> &[SectorDefinition] {
        &self.sectors
    }

    pub fn sector(&self, name: &str) -> Option<&SectorDefinition> {
        self.sectors.iter().find(|s| s.name == name)
    }

    /// SPDR sector ETFs plus thematic ETFs. Themes overlap the GICS sectors,
    /// so some symbols are cross-listed.
    pub fn us_default() -> Self {
        let sectors = vec![
            SectorDefinition::new(
                "Technology",
                Some("XLK"),
                &["AAPL", "MSFT", "NVDA", "AVGO", "ORCL", "CRM", "AMD", "ADBE"],
            ),
            SectorDefinition::new(
                "Financials",
                Some("XLF"),
                &["JPM", "BAC", "GS", "V", "MA", "MS", "AXP", "SCHW"],
            ),
            SectorDefinition::new(
                "Healthcare",
                Some("XLV"),
                &["LLY", "UNH", "JNJ", "ABBV", "MRK", "TMO", "ISRG", "GEHC"],
            ),
            SectorDefinition::new(
                "Energy",
                Some("XLE"),
                &["XOM", "CVX", "COP", "SLB", "EOG", "MPC", "PSX", "OXY"],
            ),
            SectorDefinition::new(
                "Consumer Discretionary",
                Some("XLY"),
                &["AMZN", "TSLA", "HD", "MCD", "NKE", "LOW", "BKNG", "TJX"],
            ),
            SectorDefinition::new(
                "Consumer Staples",
                Some("XLP"),
                &["PG", "KO", "PEP", "COST", "WMT", "PM", "MO", "CL"],
            ),
            SectorDefinition::new(
                "Industrials",
                Some("XLI"),
                &["CAT", "GE", "HON", "UPS", "RTX", "DE", "LMT", "ETN"],
            ),
            SectorDefinition::new(
                "Materials",
                Some("XLB"),
                &["LIN", "APD", "ECL", "SHW", "NEM", "FCX", "DOW", "NUE"],
            ),
            SectorDefinition::new(
                "Utilities",
                Some("XLU"),
                &["NEE", "DUK", "SO", "AEP", "D", "SRE", "EXC", "XEL"],
            ),
            SectorDefinition::new(
                "Real Estate",
                Some("XLRE"),
                &["AMT", "PLD", "CCI", "EQIX", "SPG", "PSA", "O", "DLR"],
            ),
            SectorDefinition::new(
                "Communication Services",
                Some("XLC"),
                &["GOOGL", "META", "NFLX", "DIS", "CMCSA", "T", "VZ", "TMUS"],
            ),
            SectorDefinition::new(
                "Artificial Intelligence",
                Some("BOTZ"),
                &["NVDA", "MSFT", "GOOGL", "AMD", "PLTR", "VRT", "SMCI", "ANET"],
            ),
            SectorDefinition::new(
                "Cybersecurity",
                Some("CIBR"),
                &["CRWD", "PANW", "ZS", "FTNT", "NET", "OKTA", "CYBR", "S"],
            ),
            SectorDefinition::new(
                "Clean Energy",
                Some("ICLN"),
                &["FSLR", "ENPH", "NEE", "SEDG", "PLUG", "RUN", "BE", "ORA"],
            ),
            SectorDefinition::new(
                "Fintech",
                Some("FINX"),
                &["PYPL", "SOFI", "COIN", "AFRM", "FI", "HOOD", "TOST", "UPST"],
            ),
            SectorDefinition::new(
                "Biotechnology",
                Some("XBI"),
                &["VRTX", "REGN", "AMGN", "GILD", "MRNA", "BIIB", "ALNY", "INCY"],
            ),
            SectorDefinition::new(
                "Aerospace & Defense",
                Some("ITA"),
                &["LMT", "RTX", "NOC", "GD", "AVAV", "RKLB", "HWM", "TDG"],
            ),
        ];

        Self {
            market: "US".to_string(),
            sectors,
        }
    }

    /// Borsa Istanbul groups. No single tracking instrument per group, so
    /// sectors are ranked by the average of their leading members.
    pub fn bist_default() -> Self {
        let sectors = vec![
            SectorDefinition::new(
                "Banking",
                None,
                &["AKBNK.IS", "GARAN.IS", "ISCTR.IS", "YKBNK.IS", "HALKB.IS", "VAKBN.IS"],
            ),
            SectorDefinition::new(
                "Holdings",
                None,
                &["KCHOL.IS", "SAHOL.IS", "DOHOL.IS", "AGHOL.IS", "ALARK.IS"],
            ),
            SectorDefinition::new(
                "Aviation",
                None,
                &["THYAO.IS", "PGSUS.IS", "TAVHL.IS", "CLEBI.IS"],
            ),
            SectorDefinition::new(
                "Iron & Steel",
                None,
                &["EREGL.IS", "KRDMD.IS", "ISDMR.IS", "KCAER.IS"],
            ),
            SectorDefinition::new(
                "Energy",
                None,
                &["TUPRS.IS", "AKSEN.IS", "ENJSA.IS", "ODAS.IS", "ZOREN.IS"],
            ),
            SectorDefinition::new("Telecom", None, &["TCELL.IS", "TTKOM.IS"]),
            SectorDefinition::new("Retail", None, &["BIMAS.IS", "MGROS.IS", "SOKM.IS", "MAVI.IS"]),
            SectorDefinition::new(
                "Automotive",
                None,
                &["FROTO.IS", "TOASO.IS", "DOAS.IS", "OTKAR.IS", "TTRAK.IS"],
            ),
            SectorDefinition::new("Defense", None, &["ASELS.IS", "SDTTR.IS", "OTKAR.IS"]),
            SectorDefinition::new(
                "Glass & Chemicals",
                None,
                &["SISE.IS", "PETKM.IS", "SASA.IS", "HEKTS.IS", "GUBRF.IS"],
            ),
        ];

        Self {
            market: "BIST".to_string(),
            sectors,
        }
    }
}
