use crate::domain::contract::SessionInput;
use crate::domain::recommendation::Session;
use chrono::NaiveDate;
use std::fmt::Write as _;

fn session_focus(session: Session) -> &'static str {
    match session {
        Session::Morning => {
            "Pre-market briefing: what to watch at the open and any entries worth planning today."
        }
        Session::Afternoon => {
            "Post-close review: how today's moves affect the portfolio and whether anything needs action tomorrow."
        }
        Session::Emergency => {
            "Unscheduled alert: a large move triggered this run. Say what happened and whether the user should act."
        }
    }
}

/// Assembles the user prompt for one session: the portfolio as it stands,
/// quotes, market backdrop, then the memory section.
pub fn build_digest_prompt(
    session: Session,
    as_of_date: NaiveDate,
    input: &SessionInput,
    memory_text: &str,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} DIGEST for {as_of_date}",
        session.as_str().to_uppercase()
    );
    let _ = writeln!(out, "{}\n", session_focus(session));

    out.push_str("CURRENT PORTFOLIO:\n");
    let held: Vec<_> = input
        .positions
        .iter()
        .filter(|(_, p)| p.shares > 0.0)
        .collect();
    if held.is_empty() {
        out.push_str("  No open positions\n");
    }
    for (ticker, position) in held {
        let price = input.current_prices.get(ticker).copied();
        let _ = write!(out, "  {ticker}: {} shares", position.shares);
        match price {
            Some(price) => {
                let _ = write!(out, " @ ${price:.2}");
                if let Some(gain) = position.gain(price) {
                    let _ = write!(
                        out,
                        " (avg ${:.2}, {:+.1}%)",
                        gain.avg_buy_price, gain.gain_pct
                    );
                }
            }
            None => out.push_str(" (no quote)"),
        }
        out.push('\n');
    }
    let _ = writeln!(out, "  Cash: ${:.2}", input.cash);
    let _ = writeln!(out, "  Total value: ${:.2}", input.total_value());

    if !input.watchlist.is_empty() {
        out.push_str("\nWATCHLIST:\n");
        for ticker in &input.watchlist {
            match input.current_prices.get(ticker) {
                Some(price) => {
                    let _ = writeln!(out, "  {ticker}: ${price:.2}");
                }
                None => {
                    let _ = writeln!(out, "  {ticker}: no quote");
                }
            }
        }
    }

    if let Some(market) = &input.market {
        out.push_str("\nMARKET BACKDROP:\n");
        let _ = writeln!(out, "  TSX: {:.2}", market.tsx_level);
        let _ = writeln!(out, "  Oil: ${:.2}", market.oil_price);
        let _ = writeln!(out, "  USD/CAD: {:.4}", market.usd_cad_rate);
        for event in &market.events {
            let _ = writeln!(out, "  - {event}");
        }
    }

    out.push('\n');
    out.push_str(memory_text.trim_end());
    out.push_str(
        "\n\nRespond with: a short market summary, portfolio notes, and at most three \
recommendations (ticker, action, price or \"at market\", one-line reason).\n",
    );
    out
}

/// Digest body used when the model call fails, so the run still delivers something.
pub fn error_digest(session: Session, as_of_date: NaiveDate, err: &anyhow::Error) -> String {
    format!(
        "{} DIGEST for {as_of_date} could not be generated.\n\nError: {err:#}\n\n\
Portfolio data was still recorded. Check the logs and re-run with --session {}.",
        session.as_str().to_uppercase(),
        session.as_str()
    )
}
