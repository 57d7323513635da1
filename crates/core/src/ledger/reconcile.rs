use crate::domain::portfolio::{Holdings, PortfolioChange, PortfolioSnapshot};

/// Picks `(past, current)` for change detection: the newest snapshot and the
/// oldest among the newest `window_days + 1` stored snapshots. Stored dates are
/// counted, not calendar days. `None` with fewer than two snapshots.
pub fn comparison_pair(
    snapshots: &[PortfolioSnapshot],
    window_days: u32,
) -> Option<(&PortfolioSnapshot, &PortfolioSnapshot)> {
    let mut newest_first: Vec<&PortfolioSnapshot> = snapshots.iter().collect();
    newest_first.sort_by(|a, b| b.date.cmp(&a.date));
    newest_first.truncate(window_days as usize + 1);

    if newest_first.len() < 2 {
        return None;
    }
    let current = newest_first[0];
    let past = newest_first[newest_first.len() - 1];
    Some((past, current))
}

/// Infers what the user did between two holdings maps. Zero-share entries count
/// as not held, so going from 0 to 10 shares is a new position.
pub fn diff_holdings(past: &Holdings, current: &Holdings) -> Vec<PortfolioChange> {
    let held = |h: &Holdings, ticker: &str| h.get(ticker).copied().filter(|s| *s > 0.0);
    let mut changes = Vec::new();

    for (ticker, &shares) in current.iter().filter(|(_, s)| **s > 0.0) {
        match held(past, ticker) {
            None => changes.push(PortfolioChange::NewPosition {
                ticker: ticker.clone(),
                shares,
            }),
            Some(before) if shares > before => changes.push(PortfolioChange::AddedTo {
                ticker: ticker.clone(),
                added_shares: shares - before,
                total_shares: shares,
            }),
            Some(_) => {}
        }
    }

    for (ticker, &before) in past.iter().filter(|(_, s)| **s > 0.0) {
        match held(current, ticker) {
            None => changes.push(PortfolioChange::Sold {
                ticker: ticker.clone(),
                shares: before,
            }),
            Some(now) if before > now => changes.push(PortfolioChange::Reduced {
                ticker: ticker.clone(),
                reduced_shares: before - now,
                remaining_shares: now,
            }),
            Some(_) => {}
        }
    }

    changes
}
