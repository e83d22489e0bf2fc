use crate::reconcile::{CardPatch, SignClass, ValueFormat};
use crate::rule_form::RuleForm;
use crate::rules::Rule;
use crate::types::{MonitorState, Position, Side};
use crate::util::{signed_pct, signed_usd, thousands};

// The whole module is write-only presentation: it renders cards and applies
// patches, it never mutates position state.

pub fn render_positions(positions: &[Position], btc_price: f64) {
    render_header(positions, btc_price);
    for position in positions {
        render_card(position);
    }
    println!();
}

pub fn render_header(positions: &[Position], btc_price: f64) {
    let total_pnl: f64 = positions.iter().map(|p| p.unrealized_pnl).sum();
    let btc = if btc_price > 0.0 {
        format!("${}", thousands(btc_price, 0))
    } else {
        "-".to_string()
    };
    println!(
        "\n── Positions: {} | Total PnL: {} | BTC: {} ──",
        positions.len(),
        signed_usd(total_pnl, 2),
        btc
    );
}

fn render_card(position: &Position) {
    let emoji = match position.side {
        Side::Buy => "🟢",
        Side::Sell => "🔴",
        Side::Spot => "🟡",
    };
    println!("{} {} — {}", emoji, position.title(), side_badge(position));
    println!(
        "   Size: {:.2} | Entry: {} | Current: {}",
        position.size,
        currency(position.entry_price, 4),
        currency(position.current_price, 4)
    );
    println!(
        "   Value: {} | PnL: {} ({})",
        currency(position.position_value, 2),
        signed_usd(position.unrealized_pnl, 2),
        signed_pct(position.pnl_percentage)
    );
    if let Some(monitor) = &position.monitor {
        println!(
            "   ₿ BTC rules: {} active | remaining {:.0}%",
            monitor.rules.len(),
            monitor.remaining_percent()
        );
    }
}

/// Apply a field patch to the rendered grid: one line per changed value.
/// Unchanged PnL entries stay silent — the plan carries them for the sign
/// class, the terminal has nothing to flash.
pub fn apply_patch(patches: &[CardPatch]) {
    for patch in patches {
        for delta in patch.deltas.iter().filter(|d| d.changed()) {
            let marker = match delta.sign {
                Some(SignClass::Positive) => " ▲",
                Some(SignClass::Negative) => " ▼",
                None => "",
            };
            println!(
                "  {} {}: {} → {}{}",
                patch.symbol,
                delta.field.as_str(),
                format_value(delta.old, delta.format),
                format_value(delta.new, delta.format),
                marker
            );
        }
    }
}

pub fn format_value(value: f64, format: ValueFormat) -> String {
    match format {
        ValueFormat::Currency { max_decimals } => currency(value, max_decimals),
        ValueFormat::SignedCurrency => signed_usd(value, 2),
        ValueFormat::SignedPercent => signed_pct(value),
    }
}

/// Dollar amount at 2 decimals, widened to `max_decimals` when the value has
/// sub-cent precision (small-cap coin prices).
fn currency(value: f64, max_decimals: usize) -> String {
    let needs_precision = max_decimals > 2 && ((value * 100.0).fract().abs() > 1e-9);
    let decimals = if needs_precision { max_decimals } else { 2 };
    format!("${}", thousands(value, decimals))
}

fn side_badge(position: &Position) -> String {
    if position.side.is_spot() {
        "SPOT".to_string()
    } else {
        format!("{} {}x", position.side.label(), position.leverage)
    }
}

pub fn render_empty_state() {
    println!("\nNo open positions. Polling paused — `refresh` to re-check.\n");
}

pub fn render_error_state(message: &str) {
    println!("\n✕ Connection error: {}", message);
    println!("  Polling stopped. `refresh` to retry.\n");
}

pub fn render_detail(position: &Position, btc_price: f64) {
    println!();
    render_card(position);
    if btc_price > 0.0 {
        println!("   BTC now: ${}", thousands(btc_price, 0));
    }
    if let Some(monitor) = &position.monitor {
        render_monitor(monitor);
    }
    let updated = chrono::NaiveDateTime::parse_from_str(&position.updated_at, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|_| position.updated_at.clone());
    if !updated.is_empty() {
        println!("   Last updated: {}", updated);
    }
    println!();
}

fn render_monitor(monitor: &MonitorState) {
    println!("   ₿ Active BTC rules:");
    for (index, rule) in monitor.rules.iter().enumerate() {
        if monitor.is_triggered(rule) {
            println!("     [{}] ✓ {} (triggered)", index, rule_line(rule));
        } else {
            println!("     [{}] {}", index, rule_line(rule));
        }
    }
    if let Some(tp) = &monitor.active_tp {
        println!(
            "   Active TP: ${} ({}%)",
            thousands(tp.price, 0),
            tp.close_percent
        );
    }
    if let Some(sl) = &monitor.active_sl {
        println!(
            "   Active SL: ${} ({}%)",
            thousands(sl.price, 0),
            sl.close_percent
        );
    }
    println!(
        "   Tracking: closed {:.0}% | remaining {:.0}%",
        monitor.closed_percent(),
        monitor.remaining_percent()
    );
}

/// Fixed rule numbering by kind, matching the form slots.
fn rule_line(rule: &Rule) -> String {
    match rule {
        Rule::FullClose { btc_price } => format!(
            "Rule 1: Full close when BTC reaches ${}",
            thousands(*btc_price, 0)
        ),
        Rule::PartialClose {
            btc_price,
            close_percent,
        } => format!(
            "Rule 2: Close {}% when BTC reaches ${}",
            close_percent,
            thousands(*btc_price, 0)
        ),
        Rule::SetTp {
            btc_price,
            tp_price,
            close_percent,
        } => format!(
            "Rule 3: Set TP at ${} (close {}%) when BTC reaches ${}",
            tp_price,
            close_percent,
            thousands(*btc_price, 0)
        ),
        Rule::SetSl {
            btc_price, sl_price, ..
        } => format!(
            "Rule 4: Set SL at ${} (Full Close) when BTC reaches ${}",
            sl_price,
            thousands(*btc_price, 0)
        ),
    }
}

pub fn render_form(form: &RuleForm, btc_price: f64) {
    let btc = if btc_price > 0.0 {
        format!("${}", thousands(btc_price, 0))
    } else {
        "-".to_string()
    };
    println!(
        "\n── BTC rules for {} ({}, size {:.2}) | BTC: {} ──",
        form.symbol,
        form.side.label(),
        form.position_size,
        btc
    );

    if form.full_close.enabled {
        println!("  1. Full close     [on]  BTC {}", form.full_close.btc_price);
    } else {
        println!("  1. Full close     [off]");
    }

    if form.partial_closes.is_empty() {
        println!("  2. Partial closes (none)");
    } else {
        println!(
            "  2. Partial closes ({}) — total to close: {}% of original position",
            form.partial_closes.len(),
            form.partial_closes.total_close_percent()
        );
        for (index, entry) in form.partial_closes.entries().iter().enumerate() {
            println!(
                "       [{}] BTC {} → close {}%",
                index,
                display_field(&entry.btc_price),
                display_field(&entry.close_percent)
            );
        }
    }

    if form.set_tp.enabled {
        let full = if form.set_tp.full_close { " (full close)" } else { "" };
        println!(
            "  3. Set TP         [on]  BTC {} → TP {} close {}%{}",
            display_field(&form.set_tp.btc_price),
            display_field(&form.set_tp.tp_price),
            display_field(&form.set_tp.close_percent),
            full
        );
    } else {
        println!("  3. Set TP         [off]");
    }

    if form.set_sl.enabled {
        println!(
            "  4. Set SL         [on]  BTC {} → SL {} (full close)",
            display_field(&form.set_sl.btc_price),
            display_field(&form.set_sl.sl_price)
        );
    } else {
        println!("  4. Set SL         [off]");
    }
    println!("  save | cancel | help\n");
}

fn display_field(raw: &str) -> &str {
    if raw.trim().is_empty() {
        "—"
    } else {
        raw
    }
}

pub fn print_grid_help() {
    println!(
        "\ncommands:\n  \
         list                  render all positions\n  \
         show <symbol>         position detail with active rules\n  \
         rules <symbol>        open the BTC rule form\n  \
         rm <symbol> <index>   remove one rule (confirms first)\n  \
         unrule <symbol>       remove all rules (confirms first)\n  \
         close <symbol>        market-close the position (confirms first)\n  \
         category all|linear|spot\n  \
         refresh               refetch and resume polling\n  \
         quit\n"
    );
}

pub fn print_form_help() {
    println!(
        "\nform commands:\n  \
         full <btc_price> | full off\n  \
         partial add [<btc_price> <percent>]\n  \
         partial set <index> btc|pct <value>\n  \
         partial rm <index>\n  \
         tp <btc_price> <tp_price> [<percent>] | tp full on|off | tp off\n  \
         sl <btc_price> <sl_price> | sl off\n  \
         show | save | cancel\n"
    );
}
