use crate::domain::outcome::{MemorySummary, Outcome};
use crate::domain::portfolio::PortfolioChange;
use crate::domain::recommendation::RecommendationRecord;
use crate::ledger::SUMMARY_WINDOW_DAYS;
use std::fmt::Write as _;

const MAX_CALLS_SHOWN: usize = 3;

pub const NO_MEMORY_CONTEXT: &str =
    "AGENT MEMORY: no memory context available for this run. Treat every pick as fresh.";

/// Renders the ledger's view of past calls into the prompt section the model
/// reads. `None` means the ledger could not be consulted at all.
pub fn format_memory_context(
    summary: Option<&MemorySummary>,
    changes: &[PortfolioChange],
) -> String {
    let Some(summary) = summary else {
        return NO_MEMORY_CONTEXT.to_string();
    };

    let perf = &summary.performance;
    let mut out = String::new();
    out.push_str("AGENT MEMORY & CONTEXT:\n\n");
    out.push_str("YOUR RECOMMENDATION PERFORMANCE:\n");
    let _ = writeln!(out, "  Total Recommendations: {}", perf.total_calls);
    let _ = writeln!(out, "  Win Rate: {:.1}%", perf.win_rate * 100.0);
    let _ = writeln!(out, "  Average Gain: {:+.2}%", perf.avg_gain);
    let _ = writeln!(
        out,
        "  Recommendations in last {SUMMARY_WINDOW_DAYS} days: {}",
        summary.recent_recommendations_count
    );

    out.push_str("\nBest Calls (gains > 5%):\n");
    out.push_str(&format_outcomes(&perf.winning_trades));
    out.push_str("\n\nWorst Calls (losses > 5%):\n");
    out.push_str(&format_outcomes(&perf.losing_trades));

    out.push_str("\n\nREPEATED RECOMMENDATIONS (you keep suggesting these):\n");
    out.push_str(&format_repeated(summary));

    out.push_str("\n\nIGNORED RECOMMENDATIONS (user did not buy):\n");
    out.push_str(&format_ignored(&summary.ignored));

    out.push_str("\n\nPORTFOLIO CHANGES SINCE LAST WEEK:\n");
    out.push_str(&format_portfolio_changes(changes));

    out.push_str(
        "\n\nINSTRUCTIONS FOR MEMORY:\n\
1. Do not repeat a ticker from the repeated list unless major news changed the picture, \
the price dropped more than 5% since the last call, or you can say exactly what is different now.\n\
2. Reference past performance: name calls that worked and admit the ones that did not.\n\
3. Learn from ignored picks: if the user keeps passing on a style or sector, adjust.\n\
4. Acknowledge portfolio changes the user made since the last digest.\n\
5. If you do repeat a recommendation, explain what changed.\n",
    );
    out
}

fn format_outcomes(outcomes: &[Outcome]) -> String {
    if outcomes.is_empty() {
        return "  None yet".to_string();
    }
    outcomes
        .iter()
        .take(MAX_CALLS_SHOWN)
        .map(|o| {
            format!(
                "  {}: Recommended @ ${:.2} ({} days ago) -> Now ${:.2} ({:+.1}%)",
                o.ticker, o.recommended_price, o.days_elapsed, o.current_price, o.gain_pct
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_repeated(summary: &MemorySummary) -> String {
    if summary.repeated.is_empty() {
        return "  None - all fresh recommendations".to_string();
    }
    let mut repeated: Vec<(&String, &usize)> = summary.repeated.iter().collect();
    repeated.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    repeated
        .into_iter()
        .map(|(ticker, count)| {
            format!("  {ticker}: Recommended {count} times in last {SUMMARY_WINDOW_DAYS} days")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_ignored(ignored: &[RecommendationRecord]) -> String {
    if ignored.is_empty() {
        return "  User acted on all recommendations".to_string();
    }
    ignored
        .iter()
        .take(MAX_CALLS_SHOWN)
        .map(|r| {
            format!(
                "  {}: {} @ ${:.2} on {} - user passed",
                r.ticker, r.action, r.price, r.date
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_portfolio_changes(changes: &[PortfolioChange]) -> String {
    if changes.is_empty() {
        return "  No changes detected (or first run)".to_string();
    }
    changes
        .iter()
        .map(|c| match c {
            PortfolioChange::NewPosition { ticker, shares } => {
                format!("  NEW: {ticker} - {shares} shares")
            }
            PortfolioChange::AddedTo {
                ticker,
                added_shares,
                total_shares,
            } => format!("  ADDED: {ticker} - {added_shares} more shares (total: {total_shares})"),
            PortfolioChange::Sold { ticker, shares } => {
                format!("  SOLD: {ticker} - {shares} shares")
            }
            PortfolioChange::Reduced {
                ticker,
                reduced_shares,
                remaining_shares,
            } => format!(
                "  REDUCED: {ticker} - {reduced_shares} shares (remaining: {remaining_shares})"
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
