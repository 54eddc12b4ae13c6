//! Quota Allocator
//!
//! Builds the cross-sector pick list. Only the top-ranked sectors take part,
//! each may contribute up to its quota, and a symbol listed in several
//! sectors is picked at most once.

use market_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::risk::{stop_loss_pct, RiskTier};
use crate::scorer::ScoredCandidate;

/// Picks allowed per sector, by sector rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    quotas: Vec<usize>,
}

impl Default for QuotaPolicy {
    /// Top six sectors: two picks each for ranks 1-4, one each for ranks 5-6
    fn default() -> Self {
        Self {
            quotas: vec![2, 2, 2, 2, 1, 1],
        }
    }
}

impl QuotaPolicy {
    pub fn new(quotas: Vec<usize>) -> Self {
        Self { quotas }
    }

    /// Build from user-supplied values, rejecting negatives.
    pub fn from_signed(values: &[i64]) -> Result<Self, ConfigError> {
        let quotas = values
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                usize::try_from(value).map_err(|_| ConfigError::NegativeQuota {
                    rank: i + 1,
                    value,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { quotas })
    }

    pub fn quotas(&self) -> &[usize] {
        &self.quotas
    }

    /// Number of top-ranked sectors that take part
    pub fn participating(&self) -> usize {
        self.quotas.len()
    }

    /// Quota for a 0-based rank; 0 beyond the policy
    pub fn quota_for_rank(&self, rank: usize) -> usize {
        self.quotas.get(rank).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.quotas.iter().sum()
    }
}

impl FromStr for QuotaPolicy {
    type Err = ConfigError;

    /// Comma-separated quotas, e.g. "2,2,2,2,1,1"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<i64>()
                    .map_err(|e| ConfigError::Parse(format!("quota {:?}: {}", part.trim(), e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_signed(&values)
    }
}

/// Which sector a cross-listed symbol counts against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeSectorRule {
    /// Sector where the symbol scores highest; exact ties go to the higher-ranked sector
    #[default]
    HighestScore,
    /// Highest-ranked sector listing the symbol
    HighestRankedSector,
}

impl fmt::Display for HomeSectorRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HomeSectorRule::HighestScore => write!(f, "highest_score"),
            HomeSectorRule::HighestRankedSector => write!(f, "highest_ranked_sector"),
        }
    }
}

impl FromStr for HomeSectorRule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "score" | "highest_score" => Ok(HomeSectorRule::HighestScore),
            "rank" | "highest_ranked_sector" => Ok(HomeSectorRule::HighestRankedSector),
            other => Err(ConfigError::Parse(format!("unknown home sector rule: {}", other))),
        }
    }
}

/// One entry of the final pick list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub symbol: String,
    pub sector: String,
    /// 1-based rank of the sector
    pub sector_rank: usize,
    pub composite_score: f64,
    pub price: Option<f64>,
    pub daily_change_pct: Option<f64>,
    /// Revenue growth in percent, 0 when unknown
    pub growth_pct: f64,
    pub risk: RiskTier,
    /// Suggested stop-loss below the entry price, negative percent
    pub stop_loss_pct: f64,
}

impl Pick {
    fn from_candidate(candidate: &ScoredCandidate, sector: &str, sector_rank: usize) -> Self {
        let metrics = &candidate.metrics;
        Self {
            symbol: candidate.symbol.clone(),
            sector: sector.to_string(),
            sector_rank,
            composite_score: candidate.composite_score,
            price: metrics.last_close,
            daily_change_pct: metrics.daily_change_pct,
            growth_pct: metrics.growth_raw,
            risk: RiskTier::from_volatility(metrics.volatility_pct),
            stop_loss_pct: stop_loss_pct(metrics.volatility_pct),
        }
    }

    /// Composite score rounded to two decimals
    pub fn display_score(&self) -> f64 {
        (self.composite_score * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuotaAllocator {
    policy: QuotaPolicy,
    home_rule: HomeSectorRule,
}

impl QuotaAllocator {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self {
            policy,
            home_rule: HomeSectorRule::default(),
        }
    }

    pub fn with_home_rule(mut self, home_rule: HomeSectorRule) -> Self {
        self.home_rule = home_rule;
        self
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Build the pick list.
    ///
    /// `ranked` is the sector order, best first. Candidates per sector must be
    /// sorted best first, as returned by the stock scorer. Sectors without
    /// candidates simply contribute nothing.
    pub fn allocate<S: AsRef<str>>(
        &self,
        ranked: &[S],
        candidates: &HashMap<String, Vec<ScoredCandidate>>,
    ) -> Vec<Pick> {
        let homes = self.home_sectors(ranked, candidates);
        let mut used: HashSet<&str> = HashSet::new();
        let mut picks = Vec::with_capacity(self.policy.total());

        for (rank, sector) in self.participating(ranked).enumerate() {
            let quota = self.policy.quota_for_rank(rank);
            let Some(sector_candidates) = candidates.get(sector) else {
                tracing::debug!("No candidates for {}", sector);
                continue;
            };

            let mut filled = 0;

            // Pass 1: symbols that call this sector home
            for candidate in sector_candidates {
                if filled == quota {
                    break;
                }
                let is_home = homes
                    .get(candidate.symbol.as_str())
                    .is_some_and(|home| *home == sector);
                if is_home && used.insert(candidate.symbol.as_str()) {
                    picks.push(Pick::from_candidate(candidate, sector, rank + 1));
                    filled += 1;
                }
            }

            // Pass 2: anything left in this sector
            for candidate in sector_candidates {
                if filled == quota {
                    break;
                }
                if used.insert(candidate.symbol.as_str()) {
                    picks.push(Pick::from_candidate(candidate, sector, rank + 1));
                    filled += 1;
                }
            }

            if filled < quota {
                tracing::debug!("{} filled {} of {} slots", sector, filled, quota);
            }
        }

        picks
    }

    /// Home sector per symbol across the participating sectors.
    pub fn home_sectors<'a, S: AsRef<str>>(
        &self,
        ranked: &'a [S],
        candidates: &'a HashMap<String, Vec<ScoredCandidate>>,
    ) -> HashMap<&'a str, &'a str> {
        // symbol -> (sector, score)
        let mut best: HashMap<&'a str, (&'a str, f64)> = HashMap::new();

        for sector in self.participating(ranked) {
            let Some(sector_candidates) = candidates.get(sector) else {
                continue;
            };
            for candidate in sector_candidates {
                let symbol = candidate.symbol.as_str();
                let replace = match best.get(symbol) {
                    None => true,
                    Some(&(_, score)) => {
                        self.home_rule == HomeSectorRule::HighestScore
                            && candidate.composite_score > score
                    }
                };
                if replace {
                    best.insert(symbol, (sector, candidate.composite_score));
                }
            }
        }

        best.into_iter().map(|(symbol, (sector, _))| (symbol, sector)).collect()
    }

    fn participating<'a, S: AsRef<str>>(&self, ranked: &'a [S]) -> impl Iterator<Item = &'a str> {
        ranked.iter().take(self.policy.participating()).map(|s| s.as_ref())
    }
}
