use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type TeamId = String;
pub type AssetId = String;
pub type PeriodId = String;

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    Coal,
    Gas,
    GasPeaker,
    Nuclear,
    Hydro,
    Wind,
    Solar,
    Battery,
}

impl AssetKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Coal => "coal",
            Self::Gas => "gas",
            Self::GasPeaker => "gas-peaker",
            Self::Nuclear => "nuclear",
            Self::Hydro => "hydro",
            Self::Wind => "wind",
            Self::Solar => "solar",
            Self::Battery => "battery",
        }
    }

    /// Storage can act as a load (charge) as well as a supplier (discharge).
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Battery)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "coal" => Ok(Self::Coal),
            "gas" | "ccgt" => Ok(Self::Gas),
            "gas-peaker" | "gas_peaker" | "peaker" | "ocgt" => Ok(Self::GasPeaker),
            "nuclear" => Ok(Self::Nuclear),
            "hydro" => Ok(Self::Hydro),
            "wind" => Ok(Self::Wind),
            "solar" => Ok(Self::Solar),
            "battery" | "storage" => Ok(Self::Battery),
            _ => Err(format!("unknown asset kind: {value}")),
        }
    }
}

/// A team-owned generating or storage unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetInstance {
    pub team_id: TeamId,
    pub asset_id: AssetId,
    #[serde(default)]
    pub name: String,
    pub kind: AssetKind,
    pub nameplate_mw: f64,
    /// Short-run marginal cost in $/MWh.
    pub srmc: f64,
    /// Per-period capacity factor; periods not listed run at 1.0.
    #[serde(default)]
    pub capacity_factors: BTreeMap<PeriodId, f64>,
    #[serde(default)]
    pub forced_outage: bool,
}

impl AssetInstance {
    pub fn capacity_factor(&self, period: &str) -> f64 {
        match self.capacity_factors.get(period) {
            Some(factor) if factor.is_finite() => factor.clamp(0.0, 1.0),
            Some(_) => 0.0,
            None => 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Bids
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    Generate,
    Charge,
    Discharge,
    Idle,
}

impl OperatingMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Charge => "charge",
            Self::Discharge => "discharge",
            Self::Idle => "idle",
        }
    }

    pub const fn is_supply(&self) -> bool {
        matches!(self, Self::Generate | Self::Discharge)
    }

    /// Whether an asset of `kind` may bid in this mode.
    pub const fn allowed_for(&self, kind: AssetKind) -> bool {
        match self {
            Self::Generate => !kind.is_storage(),
            Self::Charge | Self::Discharge => kind.is_storage(),
            Self::Idle => true,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BidBand {
    /// $/MWh. For charge bids this is the stated willingness to pay.
    pub price: f64,
    pub quantity: f64,
}

impl BidBand {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }

    pub fn is_well_formed(&self) -> bool {
        self.price.is_finite() && self.quantity.is_finite() && self.price >= 0.0 && self.quantity >= 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetBid {
    pub team_id: TeamId,
    pub asset_id: AssetId,
    pub period: PeriodId,
    pub mode: OperatingMode,
    #[serde(default)]
    pub bands: Vec<BidBand>,
}

impl AssetBid {
    pub fn total_offered(&self) -> f64 {
        self.bands
            .iter()
            .filter(|band| band.is_well_formed())
            .map(|band| band.quantity)
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamBidSubmission {
    pub team_id: TeamId,
    #[serde(default)]
    pub bids: Vec<AssetBid>,
}

// ---------------------------------------------------------------------------
// Perturbations
// ---------------------------------------------------------------------------

/// Which assets and periods an effect applies to. `None` means "all".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<PeriodId>,
}

impl EffectTarget {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kind(kind: AssetKind) -> Self {
        Self {
            asset_kind: Some(kind.as_str().to_string()),
            period: None,
        }
    }

    pub fn period(period: impl Into<PeriodId>) -> Self {
        Self {
            asset_kind: None,
            period: Some(period.into()),
        }
    }

    pub fn matches_period(&self, period: &str) -> bool {
        self.period.as_deref().map_or(true, |target| target == period)
    }

    /// Unparseable kinds never match.
    pub fn matches_kind(&self, kind: AssetKind) -> bool {
        match self.asset_kind.as_deref() {
            None => true,
            Some(raw) => raw.parse::<AssetKind>().map_or(false, |parsed| parsed == kind),
        }
    }

    pub fn matches(&self, kind: AssetKind, period: &str) -> bool {
        self.matches_period(period) && self.matches_kind(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ScenarioEffect {
    DemandMultiplier {
        #[serde(default)]
        target: EffectTarget,
        factor: f64,
    },
    AvailabilityMultiplier {
        #[serde(default)]
        target: EffectTarget,
        factor: f64,
    },
    SrmcMultiplier {
        #[serde(default)]
        target: EffectTarget,
        factor: f64,
    },
    SrmcAdditive {
        #[serde(default)]
        target: EffectTarget,
        amount: f64,
    },
    ForcedOutage {
        #[serde(default)]
        target: EffectTarget,
    },
}

impl ScenarioEffect {
    pub fn target(&self) -> &EffectTarget {
        match self {
            Self::DemandMultiplier { target, .. }
            | Self::AvailabilityMultiplier { target, .. }
            | Self::SrmcMultiplier { target, .. }
            | Self::SrmcAdditive { target, .. }
            | Self::ForcedOutage { target } => target,
        }
    }

    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::DemandMultiplier { .. } => "demand-multiplier",
            Self::AvailabilityMultiplier { .. } => "availability-multiplier",
            Self::SrmcMultiplier { .. } => "srmc-multiplier",
            Self::SrmcAdditive { .. } => "srmc-additive",
            Self::ForcedOutage { .. } => "forced-outage",
        }
    }
}

/// Catch-up derate drawn against a profit leader's committed asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancingEvent {
    pub team_id: TeamId,
    pub asset_id: AssetId,
    pub derate_fraction: f64,
}

// ---------------------------------------------------------------------------
// Round input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundPeriod {
    pub id: PeriodId,
    pub base_demand_mw: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundInput {
    pub round: u32,
    pub periods: Vec<RoundPeriod>,
    #[serde(default)]
    pub scenario_ids: Vec<String>,
    #[serde(default)]
    pub catch_up_balancing: bool,
    #[serde(default)]
    pub assets: Vec<AssetInstance>,
    #[serde(default)]
    pub submissions: Vec<TeamBidSubmission>,
}

impl RoundInput {
    /// Every team that owns an asset or submitted bids, ascending.
    pub fn team_ids(&self) -> Vec<TeamId> {
        let mut teams: Vec<TeamId> = self
            .assets
            .iter()
            .map(|asset| asset.team_id.clone())
            .chain(self.submissions.iter().map(|s| s.team_id.clone()))
            .collect();
        teams.sort();
        teams.dedup();
        teams
    }

    pub fn period_ids(&self) -> Vec<PeriodId> {
        self.periods.iter().map(|p| p.id.clone()).collect()
    }

    pub fn bids_for_period<'a>(&'a self, period: &'a str) -> impl Iterator<Item = &'a AssetBid> + 'a {
        self.submissions
            .iter()
            .flat_map(|submission| submission.bids.iter())
            .filter(move |bid| bid.period == period)
    }
}

// ---------------------------------------------------------------------------
// Clearing output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeritOrderEntry {
    /// 1-based position in the merit order.
    pub rank: usize,
    pub team_id: TeamId,
    pub asset_id: AssetId,
    pub band_index: usize,
    pub price: f64,
    pub offered_mw: f64,
    pub cumulative_before_mw: f64,
    pub dispatched_mw: f64,
    pub is_marginal: bool,
}

impl MeritOrderEntry {
    pub fn is_dispatched(&self) -> bool {
        self.dispatched_mw > 0.0
    }
}

/// A storage charge request served at the clearing price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadEntry {
    pub team_id: TeamId,
    pub asset_id: AssetId,
    pub requested_mw: f64,
    pub served_mw: f64,
    pub willingness_to_pay: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceFormation {
    /// Effective demand was zero; nothing dispatched.
    NoDemand,
    /// Set by the marginal band's bid price.
    Marginal,
    /// Supply fell short of demand; administrative cap applies.
    PriceCap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearingResult {
    pub period: PeriodId,
    pub clearing_price: f64,
    pub price_formation: PriceFormation,
    /// Base demand after scenario multipliers.
    pub base_demand_mw: f64,
    pub charge_load_mw: f64,
    pub effective_demand_mw: f64,
    pub total_offered_mw: f64,
    pub total_dispatched_mw: f64,
    pub shortfall_mw: f64,
    pub reserve_margin_percent: f64,
    pub entries: Vec<MeritOrderEntry>,
    pub loads: Vec<LoadEntry>,
}

impl ClearingResult {
    pub fn marginal_entry(&self) -> Option<&MeritOrderEntry> {
        self.entries.iter().find(|entry| entry.is_marginal)
    }

    pub fn dispatched_entries(&self) -> impl Iterator<Item = &MeritOrderEntry> {
        self.entries.iter().filter(|entry| entry.is_dispatched())
    }

    pub fn has_shortfall(&self) -> bool {
        self.shortfall_mw > 0.0
    }
}

// ---------------------------------------------------------------------------
// Settlement output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetFinancials {
    pub asset_id: AssetId,
    pub mode: OperatingMode,
    /// Dispatched MW for supply, charged MW for loads.
    pub volume_mw: f64,
    pub srmc: f64,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPeriodFinancials {
    pub team_id: TeamId,
    pub period: PeriodId,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub assets: Vec<AssetFinancials>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundDispatchResult {
    pub round: u32,
    pub clearing_results: Vec<ClearingResult>,
    pub financials: Vec<TeamPeriodFinancials>,
    pub team_profits: BTreeMap<TeamId, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balancing: Option<BalancingEvent>,
    /// SHA-256 over the clearing results and financials, for replay checks.
    pub digest: String,
}

impl RoundDispatchResult {
    pub fn clearing_for(&self, period: &str) -> Option<&ClearingResult> {
        self.clearing_results.iter().find(|result| result.period == period)
    }

    pub fn financials_for<'a>(
        &'a self,
        team_id: &'a str,
    ) -> impl Iterator<Item = &'a TeamPeriodFinancials> + 'a {
        self.financials.iter().filter(move |f| f.team_id == team_id)
    }
}
