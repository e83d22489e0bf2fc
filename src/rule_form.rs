use crate::rules::Rule;
use crate::types::{Position, Side};

/// Parse a form field the way the rule builder accepts it: trimmed, numeric,
/// finite and non-zero. Anything else means "not filled in yet".
pub fn parse_field(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v != 0.0)
}

/// One partial-close row under edit. Fields are kept as raw strings so the
/// user can leave them empty or half-typed; validation happens at build time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartialCloseDraft {
    pub btc_price: String,
    pub close_percent: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DraftField {
    BtcPrice,
    ClosePercent,
}

/// Ordered, index-addressable list of partial-close drafts. Indices are
/// positional: removing a row shifts everything after it down by one.
#[derive(Clone, Debug, Default)]
pub struct PartialCloseList {
    entries: Vec<PartialCloseDraft>,
}

impl PartialCloseList {
    /// Append an empty row at the end.
    pub fn add(&mut self) {
        self.entries.push(PartialCloseDraft::default());
    }

    /// Append a pre-filled row (loading an existing monitor into the form).
    pub fn push_entry(&mut self, btc_price: String, close_percent: String) {
        self.entries.push(PartialCloseDraft {
            btc_price,
            close_percent,
        });
    }

    /// In-place field edit. Out-of-bounds indices are a silent no-op.
    pub fn update(&mut self, index: usize, field: DraftField, value: &str) {
        if let Some(entry) = self.entries.get_mut(index) {
            match field {
                DraftField::BtcPrice => entry.btc_price = value.to_string(),
                DraftField::ClosePercent => entry.close_percent = value.to_string(),
            }
        }
    }

    /// Remove the row at `index`; later indices shift down. Out-of-bounds is
    /// a silent no-op.
    pub fn remove(&mut self, index: usize) {
        if index < self.entries.len() {
            self.entries.remove(index);
        }
    }

    /// Informational total of all parseable close percents. Garbage counts as
    /// zero and totals over 100% are allowed; this never gates validation.
    pub fn total_close_percent(&self) -> f64 {
        self.entries
            .iter()
            .map(|entry| {
                entry
                    .close_percent
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .unwrap_or(0.0)
            })
            .sum()
    }

    pub fn entries(&self) -> &[PartialCloseDraft] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FullCloseSlot {
    pub enabled: bool,
    pub btc_price: String,
}

#[derive(Clone, Debug, Default)]
pub struct SetTpSlot {
    pub enabled: bool,
    pub btc_price: String,
    pub tp_price: String,
    pub close_percent: String,
    /// When armed, close_percent is pinned to "100" and not editable.
    pub full_close: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SetSlSlot {
    pub enabled: bool,
    pub btc_price: String,
    pub sl_price: String,
}

/// Transient rule-editing state for one position. Created when the form
/// opens, discarded on cancel, consumed on successful submit.
#[derive(Clone, Debug)]
pub struct RuleForm {
    pub symbol: String,
    pub category: String,
    pub side: Side,
    pub position_size: f64,
    pub full_close: FullCloseSlot,
    pub partial_closes: PartialCloseList,
    pub set_tp: SetTpSlot,
    pub set_sl: SetSlSlot,
    /// Set while a submission is outstanding; blocks duplicate saves.
    pub submitting: bool,
}

impl RuleForm {
    /// Open a form for a position, pre-loading any existing monitor rules
    /// into their slots (partial closes keep their stored order).
    pub fn for_position(position: &Position) -> Self {
        let mut form = RuleForm {
            symbol: position.symbol.clone(),
            category: position.category().to_string(),
            side: position.side,
            position_size: position.size,
            full_close: FullCloseSlot::default(),
            partial_closes: PartialCloseList::default(),
            set_tp: SetTpSlot::default(),
            set_sl: SetSlSlot::default(),
            submitting: false,
        };
        if let Some(monitor) = &position.monitor {
            form.load_rules(&monitor.rules);
        }
        form
    }

    fn load_rules(&mut self, rules: &[Rule]) {
        for rule in rules {
            match rule {
                Rule::FullClose { btc_price } => {
                    self.full_close.enabled = true;
                    self.full_close.btc_price = btc_price.to_string();
                }
                Rule::PartialClose {
                    btc_price,
                    close_percent,
                } => {
                    self.partial_closes
                        .push_entry(btc_price.to_string(), close_percent.to_string());
                }
                Rule::SetTp {
                    btc_price,
                    tp_price,
                    close_percent,
                } => {
                    self.set_tp.enabled = true;
                    self.set_tp.btc_price = btc_price.to_string();
                    self.set_tp.tp_price = tp_price.to_string();
                    self.set_tp.close_percent = close_percent.to_string();
                    if *close_percent == 100.0 {
                        self.set_tp_full_close(true);
                    }
                }
                Rule::SetSl {
                    btc_price, sl_price, ..
                } => {
                    self.set_sl.enabled = true;
                    self.set_sl.btc_price = btc_price.to_string();
                    self.set_sl.sl_price = sl_price.to_string();
                }
            }
        }
    }

    /// The TP full-close sub-toggle: on pins close_percent to 100, off clears
    /// the field for re-entry.
    pub fn set_tp_full_close(&mut self, on: bool) {
        self.set_tp.full_close = on;
        if on {
            self.set_tp.close_percent = "100".to_string();
        } else {
            self.set_tp.close_percent.clear();
        }
    }

    /// Edit the TP close percent; ignored while the full-close sub-toggle
    /// holds the field at 100.
    pub fn set_tp_close_percent(&mut self, value: &str) {
        if !self.set_tp.full_close {
            self.set_tp.close_percent = value.to_string();
        }
    }

    /// Assemble the rule set for submission. A slot contributes only when it
    /// is enabled AND every required field validates; an enabled-but-
    /// incomplete slot drops out silently. Order is fixed: full close,
    /// partial closes in draft order, set TP, set SL.
    pub fn build_rule_set(&self) -> Vec<Rule> {
        let mut rules = Vec::new();

        if self.full_close.enabled {
            if let Some(btc_price) = parse_field(&self.full_close.btc_price) {
                rules.push(Rule::FullClose { btc_price });
            }
        }

        for entry in self.partial_closes.entries() {
            if let (Some(btc_price), Some(close_percent)) = (
                parse_field(&entry.btc_price),
                parse_field(&entry.close_percent),
            ) {
                rules.push(Rule::PartialClose {
                    btc_price,
                    close_percent,
                });
            }
        }

        if self.set_tp.enabled {
            if let (Some(btc_price), Some(tp_price), Some(close_percent)) = (
                parse_field(&self.set_tp.btc_price),
                parse_field(&self.set_tp.tp_price),
                parse_field(&self.set_tp.close_percent),
            ) {
                rules.push(Rule::SetTp {
                    btc_price,
                    tp_price,
                    close_percent,
                });
            }
        }

        if self.set_sl.enabled {
            if let (Some(btc_price), Some(sl_price)) = (
                parse_field(&self.set_sl.btc_price),
                parse_field(&self.set_sl.sl_price),
            ) {
                rules.push(Rule::set_sl(btc_price, sl_price));
            }
        }

        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MonitorState, Position};

    fn linear_position(monitor: Option<MonitorState>) -> Position {
        Position {
            symbol: "SOLUSDT".to_string(),
            coin: None,
            side: Side::Buy,
            size: 10.0,
            entry_price: 140.0,
            current_price: 150.0,
            leverage: 10.0,
            position_value: 1500.0,
            unrealized_pnl: 100.0,
            pnl_percentage: 71.4,
            take_profit: None,
            stop_loss: None,
            liquidation_price: None,
            monitor,
            updated_at: String::new(),
        }
    }

    fn monitor_with(rules: Vec<Rule>) -> MonitorState {
        MonitorState {
            symbol: "SOLUSDT".to_string(),
            category: "linear".to_string(),
            side: Side::Buy,
            original_size: 10.0,
            remaining_size: 10.0,
            rules,
            triggered_rules: Vec::new(),
            active_tp: None,
            active_sl: None,
        }
    }

    #[test]
    fn enabled_but_incomplete_slots_drop_out() {
        let mut form = RuleForm::for_position(&linear_position(None));
        form.full_close.enabled = true;
        form.full_close.btc_price = "".to_string();
        form.set_sl.enabled = true;
        form.set_sl.btc_price = "abc".to_string();
        form.set_sl.sl_price = "1.5".to_string();
        assert!(form.build_rule_set().is_empty());
    }

    #[test]
    fn zero_and_nan_fields_never_validate() {
        assert_eq!(parse_field("0"), None);
        assert_eq!(parse_field("0.0"), None);
        assert_eq!(parse_field("NaN"), None);
        assert_eq!(parse_field("inf"), None);
        assert_eq!(parse_field(""), None);
        assert_eq!(parse_field("95000"), Some(95000.0));
        assert_eq!(parse_field(" 1.5 "), Some(1.5));
    }

    #[test]
    fn sl_slot_always_submits_full_close() {
        let mut form = RuleForm::for_position(&linear_position(None));
        form.set_sl.enabled = true;
        form.set_sl.btc_price = "90000".to_string();
        form.set_sl.sl_price = "1.5".to_string();
        let rules = form.build_rule_set();
        assert_eq!(rules, vec![Rule::set_sl(90000.0, 1.5)]);
        match &rules[0] {
            Rule::SetSl { close_percent, .. } => assert_eq!(*close_percent, 100.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn tp_full_close_toggle_pins_percent() {
        let mut form = RuleForm::for_position(&linear_position(None));
        form.set_tp.enabled = true;
        form.set_tp.btc_price = "98000".to_string();
        form.set_tp.tp_price = "2.5".to_string();
        form.set_tp_close_percent("37");
        form.set_tp_full_close(true);
        // edits are ignored while the toggle holds the field
        form.set_tp_close_percent("55");
        assert_eq!(form.set_tp.close_percent, "100");
        assert_eq!(
            form.build_rule_set(),
            vec![Rule::SetTp {
                btc_price: 98000.0,
                tp_price: 2.5,
                close_percent: 100.0
            }]
        );
        form.set_tp_full_close(false);
        assert_eq!(form.set_tp.close_percent, "");
    }

    #[test]
    fn build_order_is_fixed() {
        let mut form = RuleForm::for_position(&linear_position(None));
        form.set_sl.enabled = true;
        form.set_sl.btc_price = "90000".to_string();
        form.set_sl.sl_price = "1.5".to_string();
        form.set_tp.enabled = true;
        form.set_tp.btc_price = "98000".to_string();
        form.set_tp.tp_price = "2.5".to_string();
        form.set_tp_close_percent("30");
        form.partial_closes.push_entry("95000".to_string(), "50".to_string());
        form.partial_closes.push_entry("96000".to_string(), "25".to_string());
        form.full_close.enabled = true;
        form.full_close.btc_price = "100000".to_string();

        let kinds: Vec<&str> = form
            .build_rule_set()
            .iter()
            .map(|rule| match rule {
                Rule::FullClose { .. } => "full_close",
                Rule::PartialClose { .. } => "partial_close",
                Rule::SetTp { .. } => "set_tp",
                Rule::SetSl { .. } => "set_sl",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "full_close",
                "partial_close",
                "partial_close",
                "set_tp",
                "set_sl"
            ]
        );
    }

    #[test]
    fn total_close_percent_treats_garbage_as_zero() {
        let mut list = PartialCloseList::default();
        assert_eq!(list.total_close_percent(), 0.0);
        list.push_entry("95000".to_string(), "50".to_string());
        list.push_entry("96000".to_string(), "30".to_string());
        assert_eq!(list.total_close_percent(), 80.0);
        list.update(1, DraftField::ClosePercent, "abc");
        assert_eq!(list.total_close_percent(), 50.0);
        // over 100% is allowed, display-only
        list.update(1, DraftField::ClosePercent, "80");
        assert_eq!(list.total_close_percent(), 130.0);
    }

    #[test]
    fn update_out_of_bounds_is_a_no_op() {
        let mut list = PartialCloseList::default();
        list.add();
        list.update(5, DraftField::BtcPrice, "95000");
        assert_eq!(list.entries()[0], PartialCloseDraft::default());
        list.remove(5);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_shifts_later_indices() {
        let mut list = PartialCloseList::default();
        list.push_entry("1".to_string(), "10".to_string());
        list.push_entry("2".to_string(), "20".to_string());
        list.push_entry("3".to_string(), "30".to_string());
        list.remove(0);
        assert_eq!(list.entries()[0].btc_price, "2");
        assert_eq!(list.entries()[1].btc_price, "3");
    }

    #[test]
    fn existing_monitor_loads_into_slots() {
        let monitor = monitor_with(vec![
            Rule::PartialClose {
                btc_price: 95000.0,
                close_percent: 50.0,
            },
            Rule::FullClose {
                btc_price: 100000.0,
            },
            Rule::SetTp {
                btc_price: 98000.0,
                tp_price: 2.5,
                close_percent: 100.0,
            },
            Rule::PartialClose {
                btc_price: 96000.0,
                close_percent: 25.0,
            },
        ]);
        let form = RuleForm::for_position(&linear_position(Some(monitor)));

        assert!(form.full_close.enabled);
        assert_eq!(form.full_close.btc_price, "100000");
        // partial closes keep stored order
        assert_eq!(form.partial_closes.entries()[0].btc_price, "95000");
        assert_eq!(form.partial_closes.entries()[1].btc_price, "96000");
        // close_percent == 100 arms the full-close sub-toggle
        assert!(form.set_tp.enabled);
        assert!(form.set_tp.full_close);
        assert_eq!(form.set_tp.close_percent, "100");
        assert!(!form.set_sl.enabled);
    }
}
