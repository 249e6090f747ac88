//! Dashboard view-model
//!
//! Turns a `QueryState` plus the user's search text into what a renderer
//! needs: filtered rows, the error banner, spinner and refresh-button state.
//! Layout and styling are left to the renderer.

use crate::{
    controller::PollController,
    filter::filter_coins,
    types::{CoinRecord, QueryState},
};
use serde::Serialize;

/// Message shown when no row survives the search
pub const NO_RESULTS_MESSAGE: &str = "No results found.";

/// Direction of the 1h price change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn from_change(change: Option<f64>) -> Self {
        match change {
            Some(pct) if pct >= 0.0 => Trend::Up,
            Some(_) => Trend::Down,
            None => Trend::Flat,
        }
    }
}

/// One formatted dashboard row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinRow {
    pub id: String,
    /// "Name (SYMBOL)"
    pub label: String,
    pub image: String,
    /// "$1234.57"
    pub price: String,
    pub trend: Trend,
}

impl From<&CoinRecord> for CoinRow {
    fn from(coin: &CoinRecord) -> Self {
        Self {
            id: coin.id.clone(),
            label: format!("{} ({})", coin.name, coin.symbol.to_uppercase()),
            image: coin.image.clone(),
            price: format!("${:.2}", coin.current_price),
            trend: Trend::from_change(coin.price_change_percentage_1h),
        }
    }
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub rows: Vec<CoinRow>,
    pub error_message: Option<String>,
    /// First load or refetch in progress
    pub show_spinner: bool,
    /// The refresh control is disabled while a fetch is in flight
    pub refresh_enabled: bool,
}

impl DashboardView {
    pub fn from_state(state: &QueryState, search: &str) -> Self {
        let rows = state
            .data
            .as_deref()
            .map(|coins| {
                filter_coins(coins, search)
                    .into_iter()
                    .map(CoinRow::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            rows,
            error_message: state.error_message(),
            show_spinner: state.is_loading() || state.is_fetching,
            refresh_enabled: !state.is_fetching,
        }
    }

    /// True when the "no results" message should be shown
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A poll controller bound to the user's search text
pub struct CryptoDashboard {
    controller: PollController,
    search: String,
}

impl CryptoDashboard {
    pub fn new(controller: PollController) -> Self {
        Self {
            controller,
            search: String::new(),
        }
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
    }

    pub fn controller(&self) -> &PollController {
        &self.controller
    }

    /// Builds the view from the controller's current state
    pub fn view(&self) -> DashboardView {
        DashboardView::from_state(&self.controller.state(), &self.search)
    }

    /// Refresh button handler; ignored while a fetch is in flight
    pub async fn refresh(&self) -> DashboardView {
        if self.controller.is_fetching() {
            tracing::debug!("Refresh ignored, fetch in flight");
        } else {
            self.controller.refetch().await;
        }
        self.view()
    }
}
