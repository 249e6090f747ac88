//! Local search over fetched coins

use crate::types::CoinRecord;

/// Keeps coins whose name or symbol contains `query`, ignoring case
///
/// A blank query keeps everything. Otherwise the query is matched as typed,
/// surrounding whitespace included. Order is preserved.
pub fn filter_coins<'a>(coins: &'a [CoinRecord], query: &str) -> Vec<&'a CoinRecord> {
    if query.trim().is_empty() {
        return coins.iter().collect();
    }

    let needle = query.to_lowercase();

    coins.iter().filter(|coin| coin.matches(&needle)).collect()
}
