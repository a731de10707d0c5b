//! User preferences: favorites, groups, and view settings
//!
//! An explicit state container. Every change goes through
//! `Preferences::apply`, a pure transition, and `PreferencesStore` is the one
//! place that loads (once) and saves (after every dispatch).

use crate::{
    cache::Storage,
    constants::PREFERENCES_KEY,
    error::CacheError,
    types::{CoinInfo, MarketSnapshot},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Group that lists every pair; cannot be removed
pub const GROUP_ALL: &str = "全部";

/// Group backed by the favorites list; cannot be removed
pub const GROUP_FAVORITES: &str = "自选";

/// Default custom group of major coins
pub const GROUP_MAJORS: &str = "主流币";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Grid,
}

/// Which direction is drawn red
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorScheme {
    #[default]
    #[serde(rename = "red-up")]
    RedUp,
    #[serde(rename = "green-up")]
    GreenUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveTab {
    #[default]
    Market,
    Settings,
}

/// Persisted user preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Favorite pair identifiers, in display order
    pub favorites: Vec<String>,
    /// Group names, in tab order
    pub groups: Vec<String>,
    /// Members of custom groups, in display order
    pub coin_groups: BTreeMap<String, Vec<String>>,
    pub active_group: String,
    pub view_mode: ViewMode,
    pub color_scheme: ColorScheme,
    pub active_tab: ActiveTab,
}

impl Default for Preferences {
    fn default() -> Self {
        let majors = ["btc_usdt", "eth_usdt", "sol_usdt", "bnb_usdt"];
        Self {
            favorites: vec![
                "btc_usdt".to_string(),
                "eth_usdt".to_string(),
                "sol_usdt".to_string(),
            ],
            groups: [GROUP_ALL, GROUP_FAVORITES, GROUP_MAJORS]
                .iter()
                .map(|g| g.to_string())
                .collect(),
            coin_groups: BTreeMap::from([(
                GROUP_MAJORS.to_string(),
                majors.iter().map(|s| s.to_string()).collect(),
            )]),
            active_group: GROUP_FAVORITES.to_string(),
            view_mode: ViewMode::List,
            color_scheme: ColorScheme::RedUp,
            active_tab: ActiveTab::Market,
        }
    }
}

/// Every preference change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefsAction {
    ToggleFavorite(String),
    SetActiveGroup(String),
    ToggleViewMode,
    AddGroup(String),
    RemoveGroup(String),
    AddToGroup { group: String, symbol: String },
    RemoveFromGroup { group: String, symbol: String },
    ReorderFavorites(Vec<String>),
    ReorderGroupCoins { group: String, order: Vec<String> },
    SetColorScheme(ColorScheme),
    SetActiveTab(ActiveTab),
}

impl Preferences {
    /// Pure transition: returns the state after `action`
    pub fn apply(&self, action: PrefsAction) -> Preferences {
        let mut next = self.clone();
        match action {
            PrefsAction::ToggleFavorite(symbol) => {
                if let Some(pos) = next.favorites.iter().position(|s| *s == symbol) {
                    next.favorites.remove(pos);
                } else {
                    next.favorites.push(symbol);
                }
            }
            PrefsAction::SetActiveGroup(group) => next.active_group = group,
            PrefsAction::ToggleViewMode => {
                next.view_mode = match next.view_mode {
                    ViewMode::List => ViewMode::Grid,
                    ViewMode::Grid => ViewMode::List,
                };
            }
            PrefsAction::AddGroup(name) => {
                if !next.groups.contains(&name) {
                    next.groups.push(name.clone());
                    next.coin_groups.insert(name, Vec::new());
                }
            }
            PrefsAction::RemoveGroup(name) => {
                if !is_protected_group(&name) {
                    next.groups.retain(|g| *g != name);
                    next.coin_groups.remove(&name);
                    if next.active_group == name {
                        next.active_group = GROUP_ALL.to_string();
                    }
                }
            }
            PrefsAction::AddToGroup { group, symbol } => {
                let members = next.coin_groups.entry(group).or_default();
                if !members.contains(&symbol) {
                    members.push(symbol);
                }
            }
            PrefsAction::RemoveFromGroup { group, symbol } => {
                next.coin_groups
                    .entry(group)
                    .or_default()
                    .retain(|s| *s != symbol);
            }
            PrefsAction::ReorderFavorites(order) => next.favorites = order,
            PrefsAction::ReorderGroupCoins { group, order } => {
                next.coin_groups.insert(group, order);
            }
            PrefsAction::SetColorScheme(scheme) => next.color_scheme = scheme,
            PrefsAction::SetActiveTab(tab) => next.active_tab = tab,
        }
        next
    }

    pub fn is_favorite(&self, symbol: &str) -> bool {
        self.favorites.iter().any(|s| s == symbol)
    }

    /// Pair identifiers shown for the active group, in display order
    ///
    /// `全部` lists every pair in the snapshot; `自选` lists favorites.
    pub fn active_symbols(&self, snapshot: &MarketSnapshot) -> Vec<String> {
        match self.active_group.as_str() {
            GROUP_ALL => snapshot.symbols().map(str::to_string).collect(),
            GROUP_FAVORITES => self.favorites.clone(),
            group => self.coin_groups.get(group).cloned().unwrap_or_default(),
        }
    }
}

fn is_protected_group(name: &str) -> bool {
    name == GROUP_ALL || name == GROUP_FAVORITES
}

/// Coins for `symbols` in that order, skipping pairs the snapshot lacks
pub fn ordered_view<'a>(snapshot: &'a MarketSnapshot, symbols: &[String]) -> Vec<&'a CoinInfo> {
    symbols.iter().filter_map(|s| snapshot.get(s)).collect()
}

/// Preferences with a single persistence boundary
pub struct PreferencesStore {
    storage: Arc<dyn Storage>,
    key: String,
    current: RwLock<Preferences>,
}

impl PreferencesStore {
    /// Loads preferences once; missing or corrupt storage yields defaults
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        Self::load_with_key(storage, PREFERENCES_KEY)
    }

    pub fn load_with_key(storage: Arc<dyn Storage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let current = match storage.read(&key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(key = %key, error = %e, "Discarding corrupt preferences");
                Preferences::default()
            }),
            Ok(None) => Preferences::default(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read preferences");
                Preferences::default()
            }
        };

        Self {
            storage,
            key,
            current: RwLock::new(current),
        }
    }

    /// Current preferences
    pub fn get(&self) -> Preferences {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Applies `action` and saves the result
    ///
    /// The in-memory state is updated even when saving fails; the error is
    /// returned so the caller can tell the user their change is not durable.
    pub fn dispatch(&self, action: PrefsAction) -> Result<Preferences, CacheError> {
        let next = {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            *current = current.apply(action);
            current.clone()
        };
        let raw = serde_json::to_string(&next)?;
        self.storage.write(&self.key, &raw)?;
        Ok(next)
    }
}
