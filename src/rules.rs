use serde::{Deserialize, Serialize};

use crate::util::thousands;

/// A BTC-triggered rule. The store evaluates these server-side; we only
/// model, identify and submit them.
///
/// Serialized with an external `type` tag matching the store's wire format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    FullClose {
        btc_price: f64,
    },
    PartialClose {
        btc_price: f64,
        close_percent: f64,
    },
    SetTp {
        btc_price: f64,
        tp_price: f64,
        close_percent: f64,
    },
    SetSl {
        btc_price: f64,
        sl_price: f64,
        close_percent: f64,
    },
}

impl Rule {
    /// A set_sl rule is a full close by construction.
    pub fn set_sl(btc_price: f64, sl_price: f64) -> Self {
        Rule::SetSl {
            btc_price,
            sl_price,
            close_percent: 100.0,
        }
    }

    /// Stable identity, a pure function of the field tuple. The store derives
    /// the same ids to track which rules have fired, so the formatting here
    /// (f64 `Display`, no trailing `.0`) must not change.
    pub fn id(&self) -> String {
        match self {
            Rule::FullClose { btc_price } => format!("full_close_{}", btc_price),
            Rule::PartialClose {
                btc_price,
                close_percent,
            } => format!("partial_close_{}_{}", btc_price, close_percent),
            Rule::SetTp {
                btc_price,
                tp_price,
                close_percent,
            } => format!("set_tp_{}_{}_{}", btc_price, tp_price, close_percent),
            Rule::SetSl {
                btc_price, sl_price, ..
            } => format!("set_sl_{}_{}", btc_price, sl_price),
        }
    }

    /// Human-readable description for confirmation prompts.
    pub fn describe(&self) -> String {
        match self {
            Rule::FullClose { btc_price } => {
                format!("Full close when BTC hits ${}", thousands(*btc_price, 0))
            }
            Rule::PartialClose {
                btc_price,
                close_percent,
            } => format!(
                "Close {}% when BTC hits ${}",
                close_percent,
                thousands(*btc_price, 0)
            ),
            Rule::SetTp {
                btc_price, tp_price, ..
            } => format!(
                "Set TP at ${} when BTC hits ${}",
                tp_price,
                thousands(*btc_price, 0)
            ),
            Rule::SetSl {
                btc_price, sl_price, ..
            } => format!(
                "Set SL at ${} when BTC hits ${}",
                sl_price,
                thousands(*btc_price, 0)
            ),
        }
    }
}

/// What the store should receive after a single rule is removed locally.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitAction {
    /// Re-apply the filtered remainder.
    Resubmit(Vec<Rule>),
    /// The last rule went away: remove the whole monitor, never submit an
    /// empty set.
    RemoveAll,
}

/// Drop the rule at `index` and decide the follow-up call.
/// Returns None when the index no longer resolves (the set changed under us).
pub fn remaining_after_removal(rules: &[Rule], index: usize) -> Option<SubmitAction> {
    if index >= rules.len() {
        return None;
    }
    let remaining: Vec<Rule> = rules
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, rule)| rule.clone())
        .collect();
    Some(if remaining.is_empty() {
        SubmitAction::RemoveAll
    } else {
        SubmitAction::Resubmit(remaining)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_follows_identity_table() {
        assert_eq!(
            Rule::FullClose { btc_price: 95000.0 }.id(),
            "full_close_95000"
        );
        assert_eq!(
            Rule::PartialClose {
                btc_price: 95000.0,
                close_percent: 50.0
            }
            .id(),
            "partial_close_95000_50"
        );
        assert_eq!(
            Rule::SetTp {
                btc_price: 98000.0,
                tp_price: 2.5,
                close_percent: 30.0
            }
            .id(),
            "set_tp_98000_2.5_30"
        );
        // close_percent is not part of the set_sl identity
        assert_eq!(Rule::set_sl(90000.0, 1.5).id(), "set_sl_90000_1.5");
    }

    #[test]
    fn id_is_pure_over_field_tuples() {
        let a = Rule::PartialClose {
            btc_price: 97500.0,
            close_percent: 25.0,
        };
        let b = Rule::PartialClose {
            btc_price: 97500.0,
            close_percent: 25.0,
        };
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), a.id());
    }

    #[test]
    fn set_sl_constructor_forces_full_close() {
        match Rule::set_sl(90000.0, 1.5) {
            Rule::SetSl { close_percent, .. } => assert_eq!(close_percent, 100.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn rule_roundtrips_wire_format() {
        let json = r#"{"type":"set_tp","btc_price":98000,"tp_price":2.5,"close_percent":30}"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(
            rule,
            Rule::SetTp {
                btc_price: 98000.0,
                tp_price: 2.5,
                close_percent: 30.0
            }
        );
        let out = serde_json::to_value(&rule).unwrap();
        assert_eq!(out["type"], "set_tp");
    }

    #[test]
    fn describe_formats_btc_price() {
        assert_eq!(
            Rule::FullClose { btc_price: 95000.0 }.describe(),
            "Full close when BTC hits $95,000"
        );
        assert_eq!(
            Rule::PartialClose {
                btc_price: 95000.0,
                close_percent: 50.0
            }
            .describe(),
            "Close 50% when BTC hits $95,000"
        );
    }

    #[test]
    fn removing_the_only_rule_maps_to_remove_all() {
        let rules = vec![Rule::FullClose { btc_price: 95000.0 }];
        assert_eq!(
            remaining_after_removal(&rules, 0),
            Some(SubmitAction::RemoveAll)
        );
    }

    #[test]
    fn removing_one_of_many_resubmits_the_remainder() {
        let rules = vec![
            Rule::FullClose { btc_price: 95000.0 },
            Rule::set_sl(90000.0, 1.5),
        ];
        match remaining_after_removal(&rules, 0) {
            Some(SubmitAction::Resubmit(rest)) => assert_eq!(rest, vec![rules[1].clone()]),
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn removal_out_of_bounds_is_rejected() {
        let rules = vec![Rule::FullClose { btc_price: 95000.0 }];
        assert_eq!(remaining_after_removal(&rules, 3), None);
    }
}
