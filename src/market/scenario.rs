//! Scenario events: named bundles of declarative effects that the
//! orchestration activates for a round by identifier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::market::types::{AssetKind, EffectTarget, PeriodId, ScenarioEffect};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEvent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub effects: Vec<ScenarioEffect>,
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    events: BTreeMap<String, ScenarioEvent>,
}

impl ScenarioCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for event in builtin_events() {
            catalog.insert(event);
        }
        catalog
    }

    /// Built-in events overlaid with `extra` (same id replaces).
    pub fn with_overrides(extra: &[ScenarioEvent]) -> Self {
        let mut catalog = Self::builtin();
        for event in extra {
            catalog.insert(event.clone());
        }
        catalog
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let events: Vec<ScenarioEvent> = serde_json::from_str(raw)?;
        let mut catalog = Self::empty();
        for event in events {
            catalog.insert(event);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, event: ScenarioEvent) {
        self.events.insert(event.id.clone(), event);
    }

    pub fn get(&self, id: &str) -> Option<&ScenarioEvent> {
        self.events.get(id)
    }

    /// Flatten the effects of the active scenario ids, in activation order.
    /// Unknown ids are logged and skipped.
    pub fn resolve(&self, ids: &[String]) -> Vec<ScenarioEffect> {
        let mut effects = Vec::new();
        for id in ids {
            match self.events.get(id) {
                Some(event) => effects.extend(event.effects.iter().cloned()),
                None => tracing::warn!("unknown scenario event '{id}', ignoring"),
            }
        }
        effects
    }
}

/// Drop effects that reference an unknown asset kind or period, or carry a
/// non-finite / negative factor. Dropped effects are logged; the round
/// continues with the rest.
pub fn validate_effects(effects: Vec<ScenarioEffect>, periods: &[PeriodId]) -> Vec<ScenarioEffect> {
    effects
        .into_iter()
        .filter(|effect| {
            let target = effect.target();
            if let Some(kind) = target.asset_kind.as_deref() {
                if kind.parse::<AssetKind>().is_err() {
                    tracing::warn!(
                        "{} effect targets unknown asset kind '{kind}', ignoring",
                        effect.kind_name()
                    );
                    return false;
                }
            }
            if let Some(period) = target.period.as_deref() {
                if !periods.iter().any(|known| known == period) {
                    tracing::warn!(
                        "{} effect targets unknown period '{period}', ignoring",
                        effect.kind_name()
                    );
                    return false;
                }
            }
            let magnitude_ok = match effect {
                ScenarioEffect::DemandMultiplier { factor, .. }
                | ScenarioEffect::AvailabilityMultiplier { factor, .. }
                | ScenarioEffect::SrmcMultiplier { factor, .. } => factor.is_finite() && *factor >= 0.0,
                ScenarioEffect::SrmcAdditive { amount, .. } => amount.is_finite(),
                ScenarioEffect::ForcedOutage { .. } => true,
            };
            if !magnitude_ok {
                tracing::warn!("{} effect has an invalid magnitude, ignoring", effect.kind_name());
            }
            magnitude_ok
        })
        .collect()
}

fn builtin_events() -> Vec<ScenarioEvent> {
    vec![
        ScenarioEvent {
            id: "heatwave".to_string(),
            name: "Heatwave".to_string(),
            description: "Air-conditioning load surges and panels lose efficiency.".to_string(),
            effects: vec![
                ScenarioEffect::DemandMultiplier {
                    target: EffectTarget::all(),
                    factor: 1.2,
                },
                ScenarioEffect::AvailabilityMultiplier {
                    target: EffectTarget::kind(AssetKind::Solar),
                    factor: 0.9,
                },
            ],
        },
        ScenarioEvent {
            id: "mild-weather".to_string(),
            name: "Mild weather".to_string(),
            description: "Heating and cooling load fall away.".to_string(),
            effects: vec![ScenarioEffect::DemandMultiplier {
                target: EffectTarget::all(),
                factor: 0.85,
            }],
        },
        ScenarioEvent {
            id: "gas-price-spike".to_string(),
            name: "Gas price spike".to_string(),
            description: "International gas prices jump by half.".to_string(),
            effects: vec![
                ScenarioEffect::SrmcMultiplier {
                    target: EffectTarget::kind(AssetKind::Gas),
                    factor: 1.5,
                },
                ScenarioEffect::SrmcMultiplier {
                    target: EffectTarget::kind(AssetKind::GasPeaker),
                    factor: 1.5,
                },
            ],
        },
        ScenarioEvent {
            id: "carbon-price".to_string(),
            name: "Carbon price".to_string(),
            description: "A per-MWh carbon charge is added to fossil generation.".to_string(),
            effects: vec![
                ScenarioEffect::SrmcAdditive {
                    target: EffectTarget::kind(AssetKind::Coal),
                    amount: 25.0,
                },
                ScenarioEffect::SrmcAdditive {
                    target: EffectTarget::kind(AssetKind::Gas),
                    amount: 12.0,
                },
                ScenarioEffect::SrmcAdditive {
                    target: EffectTarget::kind(AssetKind::GasPeaker),
                    amount: 15.0,
                },
            ],
        },
        ScenarioEvent {
            id: "wind-drought".to_string(),
            name: "Wind drought".to_string(),
            description: "A high-pressure system stalls and wind output collapses.".to_string(),
            effects: vec![ScenarioEffect::AvailabilityMultiplier {
                target: EffectTarget::kind(AssetKind::Wind),
                factor: 0.3,
            }],
        },
        ScenarioEvent {
            id: "dry-season".to_string(),
            name: "Dry season".to_string(),
            description: "Low reservoir levels halve hydro output.".to_string(),
            effects: vec![ScenarioEffect::AvailabilityMultiplier {
                target: EffectTarget::kind(AssetKind::Hydro),
                factor: 0.5,
            }],
        },
        ScenarioEvent {
            id: "coal-fleet-outage".to_string(),
            name: "Coal fleet outage".to_string(),
            description: "A coal supply disruption forces every coal unit offline.".to_string(),
            effects: vec![ScenarioEffect::ForcedOutage {
                target: EffectTarget::kind(AssetKind::Coal),
            }],
        },
    ]
}
